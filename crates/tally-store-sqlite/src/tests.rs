//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use tally_core::{
  company::NewCompany,
  concept::ConceptKind,
  fact::{FiscalSpan, NewFact, ReportedPeriod},
  filing::{FilingMeta, FiscalPeriod, FormType},
  metric::{GroupKey, QuarterlyMetric, YearlyMetric},
  store::{MetricStore, resolve_winners},
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn acme() -> NewCompany {
  NewCompany {
    ticker:        "ACME".into(),
    exchange:      "NYSE".into(),
    registrant_id: "0000320193".into(),
  }
}

fn q_meta(
  company_id: Uuid,
  period: FiscalPeriod,
  filed: NaiveDate,
  accession: &str,
) -> FilingMeta {
  FilingMeta {
    company_id,
    form_type: FormType::Quarterly,
    fiscal_year: 2023,
    fiscal_period: period,
    fiscal_year_end: d(2023, 12, 31),
    filed_date: filed,
    accession_number: accession.into(),
  }
}

fn revenue_fact(value: Decimal, quarter: u8) -> NewFact {
  NewFact {
    raw_tag:   "us-gaap:Revenues".into(),
    concept:   Some("revenue".into()),
    kind:      ConceptKind::Flow,
    value,
    unit:      Some("USD".into()),
    statement: Some("Income Statement".into()),
    period:    ReportedPeriod::Duration {
      start: d(2023, 1, 1),
      end:   d(2023, 3, 31),
    },
    span:      Some(FiscalSpan::Quarter { n: quarter }),
  }
}

// ─── Companies ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_company() {
  let s = store().await;

  let company = s.add_company(acme()).await.unwrap();
  assert_eq!(company.ticker, "ACME");

  let fetched = s.get_company(company.company_id).await.unwrap();
  assert!(fetched.is_some());
  assert_eq!(fetched.unwrap(), company);
}

#[tokio::test]
async fn get_company_missing_returns_none() {
  let s = store().await;
  assert!(s.get_company(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn company_lookup_by_ticker() {
  let s = store().await;
  let company = s.add_company(acme()).await.unwrap();

  let found = s.company_by_ticker("ACME").await.unwrap();
  assert_eq!(found.map(|c| c.company_id), Some(company.company_id));
  assert!(s.company_by_ticker("NOPE").await.unwrap().is_none());
}

#[tokio::test]
async fn list_companies_ordered_by_ticker() {
  let s = store().await;
  s.add_company(NewCompany {
    ticker:        "ZETA".into(),
    exchange:      "NYSE".into(),
    registrant_id: "0000000002".into(),
  })
  .await
  .unwrap();
  s.add_company(acme()).await.unwrap();

  let all = s.list_companies().await.unwrap();
  assert_eq!(all.len(), 2);
  assert_eq!(all[0].ticker, "ACME");
  assert_eq!(all[1].ticker, "ZETA");
}

// ─── Filing recording ────────────────────────────────────────────────────────

#[tokio::test]
async fn record_filing_roundtrips_facts() {
  let s = store().await;
  let company = s.add_company(acme()).await.unwrap();

  let (filing, keys) = s
    .record_filing(
      q_meta(company.company_id, FiscalPeriod::Q1, d(2023, 5, 1), "A-1"),
      vec![revenue_fact(dec!(200), 1)],
    )
    .await
    .unwrap();

  assert_eq!(
    keys,
    vec![GroupKey {
      company_id:  company.company_id,
      fiscal_year: 2023,
      concept:     "revenue".into(),
    }]
  );

  let facts = s.facts_for_filing(filing.filing_id).await.unwrap();
  assert_eq!(facts.len(), 1);
  assert_eq!(facts[0].value, dec!(200));
  assert_eq!(facts[0].concept.as_deref(), Some("revenue"));
  assert_eq!(facts[0].span, Some(FiscalSpan::Quarter { n: 1 }));

  let fetched = s.get_filing(filing.filing_id).await.unwrap().unwrap();
  assert_eq!(fetched, filing);
}

#[tokio::test]
async fn unmapped_facts_produce_no_group_keys() {
  let s = store().await;
  let company = s.add_company(acme()).await.unwrap();

  let mut unmapped = revenue_fact(dec!(1), 1);
  unmapped.concept = None;
  unmapped.kind = ConceptKind::Unknown;
  let mut unclassified = revenue_fact(dec!(2), 1);
  unclassified.span = None;

  let (filing, keys) = s
    .record_filing(
      q_meta(company.company_id, FiscalPeriod::Q1, d(2023, 5, 1), "A-1"),
      vec![unmapped, unclassified],
    )
    .await
    .unwrap();

  assert!(keys.is_empty());
  // Both facts are still in the audit ledger.
  assert_eq!(s.facts_for_filing(filing.filing_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn duplicate_accession_errors_without_side_effects() {
  let s = store().await;
  let company = s.add_company(acme()).await.unwrap();

  s.record_filing(
    q_meta(company.company_id, FiscalPeriod::Q1, d(2023, 5, 1), "A-1"),
    vec![revenue_fact(dec!(200), 1)],
  )
  .await
  .unwrap();

  let err = s
    .record_filing(
      q_meta(company.company_id, FiscalPeriod::Q1, d(2023, 6, 1), "A-1"),
      vec![revenue_fact(dec!(999), 1)],
    )
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::DuplicateAccession { .. }));

  // The rejected batch left nothing behind.
  let facts = s.facts_for_year(company.company_id, 2023).await.unwrap();
  assert_eq!(facts.len(), 1);
  assert_eq!(facts[0].fact.value, dec!(200));
}

#[tokio::test]
async fn record_filing_for_unknown_company_errors() {
  let s = store().await;
  let err = s
    .record_filing(
      q_meta(Uuid::new_v4(), FiscalPeriod::Q1, d(2023, 5, 1), "A-1"),
      vec![],
    )
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::CompanyNotFound(_)));
}

// ─── Supersession ────────────────────────────────────────────────────────────

#[tokio::test]
async fn restatement_supersedes_but_loser_stays_auditable() {
  let s = store().await;
  let company = s.add_company(acme()).await.unwrap();

  let (original, _) = s
    .record_filing(
      q_meta(company.company_id, FiscalPeriod::Q1, d(2023, 5, 1), "A-1"),
      vec![revenue_fact(dec!(200), 1)],
    )
    .await
    .unwrap();

  // A restatement for the same quarter, filed later.
  let (_restated, _) = s
    .record_filing(
      q_meta(company.company_id, FiscalPeriod::Q1, d(2023, 9, 1), "A-2"),
      vec![revenue_fact(dec!(210), 1)],
    )
    .await
    .unwrap();

  // The snapshot carries both facts; resolution picks the later filing.
  let facts = s.facts_for_year(company.company_id, 2023).await.unwrap();
  assert_eq!(facts.len(), 2);

  let winners = resolve_winners(facts);
  assert_eq!(winners.len(), 1);
  assert_eq!(winners[0].fact.value, dec!(210));
  assert_eq!(winners[0].filing.accession_number, "A-2");

  // The superseded fact remains retrievable via provenance.
  let audit = s.facts_for_filing(original.filing_id).await.unwrap();
  assert_eq!(audit.len(), 1);
  assert_eq!(audit[0].value, dec!(200));
}

#[tokio::test]
async fn ledger_tags_span_years_and_concepts() {
  let s = store().await;
  let company = s.add_company(acme()).await.unwrap();

  let mut cogs = revenue_fact(dec!(80), 1);
  cogs.raw_tag = "us-gaap:CostOfRevenue".into();
  cogs.concept = Some("cost_of_revenue".into());

  s.record_filing(
    q_meta(company.company_id, FiscalPeriod::Q1, d(2023, 5, 1), "A-1"),
    vec![revenue_fact(dec!(200), 1), cogs],
  )
  .await
  .unwrap();

  let mut fy2022 =
    q_meta(company.company_id, FiscalPeriod::Q1, d(2022, 5, 1), "B-1");
  fy2022.fiscal_year = 2022;
  fy2022.fiscal_year_end = d(2022, 12, 31);
  s.record_filing(
    fy2022,
    vec![NewFact {
      period: ReportedPeriod::Duration {
        start: d(2022, 1, 1),
        end:   d(2022, 3, 31),
      },
      ..revenue_fact(dec!(150), 1)
    }],
  )
  .await
  .unwrap();

  let tags = s
    .ledger_tags_for_company(company.company_id)
    .await
    .unwrap();
  assert_eq!(tags.len(), 3);
  assert!(tags.iter().any(|t| t.fiscal_year == 2022));
  assert!(tags.iter().any(|t| {
    t.fiscal_year == 2023
      && t.raw_tag == "us-gaap:CostOfRevenue"
      && t.recorded_concept.as_deref() == Some("cost_of_revenue")
  }));
}

// ─── Materialized tables ─────────────────────────────────────────────────────

fn quarterly_row(
  company_id: Uuid,
  quarter: u8,
  value: Decimal,
  derived: bool,
) -> QuarterlyMetric {
  QuarterlyMetric {
    company_id,
    fiscal_year: 2023,
    quarter,
    concept: "revenue".into(),
    value,
    unit: Some("USD".into()),
    derived,
    source_filings: vec![],
  }
}

fn revenue_key(company_id: Uuid) -> GroupKey {
  GroupKey {
    company_id,
    fiscal_year: 2023,
    concept: "revenue".into(),
  }
}

#[tokio::test]
async fn replace_quarterly_overwrites_not_merges() {
  let s = store().await;
  let company = s.add_company(acme()).await.unwrap();
  let key = revenue_key(company.company_id);

  s.replace_quarterly(&key, vec![
    quarterly_row(company.company_id, 1, dec!(200), false),
    quarterly_row(company.company_id, 2, dec!(250), false),
  ])
  .await
  .unwrap();

  // Second refresh produces fewer rows; the stale Q2 row must vanish.
  s.replace_quarterly(&key, vec![quarterly_row(
    company.company_id,
    1,
    dec!(205),
    false,
  )])
  .await
  .unwrap();

  let rows = s
    .quarterly_by_company_and_year(company.company_id, 2023)
    .await
    .unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].quarter, 1);
  assert_eq!(rows[0].value, dec!(205));
}

#[tokio::test]
async fn replace_quarterly_preserves_provenance_and_flags() {
  let s = store().await;
  let company = s.add_company(acme()).await.unwrap();
  let key = revenue_key(company.company_id);

  let sources = {
    let mut ids = vec![Uuid::new_v4(), Uuid::new_v4()];
    ids.sort();
    ids
  };
  let mut row = quarterly_row(company.company_id, 4, dec!(290), true);
  row.source_filings = sources.clone();

  s.replace_quarterly(&key, vec![row]).await.unwrap();

  let rows = s
    .quarterly_by_company_and_year(company.company_id, 2023)
    .await
    .unwrap();
  assert_eq!(rows.len(), 1);
  assert!(rows[0].derived);
  assert_eq!(rows[0].source_filings, sources);
}

#[tokio::test]
async fn replace_yearly_set_and_clear() {
  let s = store().await;
  let company = s.add_company(acme()).await.unwrap();
  let key = revenue_key(company.company_id);

  let (filing, _) = s
    .record_filing(
      FilingMeta {
        company_id:       company.company_id,
        form_type:        FormType::Annual,
        fiscal_year:      2023,
        fiscal_period:    FiscalPeriod::FullYear,
        fiscal_year_end:  d(2023, 12, 31),
        filed_date:       d(2024, 2, 15),
        accession_number: "K-1".into(),
      },
      vec![],
    )
    .await
    .unwrap();

  s.replace_yearly(&key, Some(YearlyMetric {
    company_id:  company.company_id,
    fiscal_year: 2023,
    concept:     "revenue".into(),
    value:       dec!(1000),
    unit:        Some("USD".into()),
    filing_id:   filing.filing_id,
  }))
  .await
  .unwrap();

  let rows = s
    .yearly_by_company_and_year(company.company_id, 2023)
    .await
    .unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].value, dec!(1000));

  s.replace_yearly(&key, None).await.unwrap();
  assert!(
    s.yearly_by_company_and_year(company.company_id, 2023)
      .await
      .unwrap()
      .is_empty()
  );
}

// ─── Read accessors ──────────────────────────────────────────────────────────

#[tokio::test]
async fn quarterly_by_concept_and_latest() {
  let s = store().await;
  let company = s.add_company(acme()).await.unwrap();

  let key_2022 = GroupKey { fiscal_year: 2022, ..revenue_key(company.company_id) };
  let mut rows_2022 = vec![
    quarterly_row(company.company_id, 3, dec!(140), false),
    quarterly_row(company.company_id, 4, dec!(160), false),
  ];
  for r in &mut rows_2022 {
    r.fiscal_year = 2022;
  }
  s.replace_quarterly(&key_2022, rows_2022).await.unwrap();

  s.replace_quarterly(&revenue_key(company.company_id), vec![
    quarterly_row(company.company_id, 1, dec!(200), false),
    quarterly_row(company.company_id, 2, dec!(250), false),
  ])
  .await
  .unwrap();

  let by_concept = s
    .quarterly_by_company_and_concept(company.company_id, "revenue")
    .await
    .unwrap();
  assert_eq!(by_concept.len(), 4);
  // Newest fiscal year first.
  assert_eq!(by_concept[0].fiscal_year, 2023);

  let latest = s.latest_quarterly(company.company_id).await.unwrap();
  assert_eq!(latest.len(), 1);
  assert_eq!(latest[0].fiscal_year, 2023);
  assert_eq!(latest[0].quarter, 2);
  assert_eq!(latest[0].value, dec!(250));
}
