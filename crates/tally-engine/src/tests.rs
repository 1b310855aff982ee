//! End-to-end tests: ingestion → derivation → materialized metrics, against
//! an in-memory SQLite store.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;
use uuid::Uuid;

use tally_core::{
  company::{Company, NewCompany},
  concept::{AliasTable, ConceptAlias, ConceptKind},
  fact::{RawFact, ReportedPeriod},
  filing::{FilingMeta, FiscalPeriod, FormType},
  metric::GroupKey,
  store::MetricStore,
};
use tally_store_sqlite::SqliteStore;

use crate::{Ingestor, RefreshQueue, materialize};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn seed_aliases() -> AliasTable {
  let mut table = AliasTable::new();
  table
    .insert(ConceptAlias {
      raw_tag:        "us-gaap:Revenues".into(),
      statement_hint: None,
      canonical:      "revenue".into(),
      kind:           ConceptKind::Flow,
    })
    .unwrap();
  table
    .insert(ConceptAlias {
      raw_tag:        "us-gaap:CashAndCashEquivalents".into(),
      statement_hint: None,
      canonical:      "cash".into(),
      kind:           ConceptKind::Stock,
    })
    .unwrap();
  table
}

async fn setup() -> (Arc<SqliteStore>, Ingestor<SqliteStore>, Company) {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let aliases = Arc::new(RwLock::new(seed_aliases()));
  let queue = RefreshQueue::spawn(Arc::clone(&store), Arc::clone(&aliases), 2);
  let ingestor = Ingestor::new(Arc::clone(&store), aliases, queue);
  let company = store
    .add_company(NewCompany {
      ticker:        "ACME".into(),
      exchange:      "NYSE".into(),
      registrant_id: "0000000042".into(),
    })
    .await
    .unwrap();
  (store, ingestor, company)
}

fn annual_meta(company_id: Uuid, accession: &str, filed: NaiveDate) -> FilingMeta {
  FilingMeta {
    company_id,
    form_type: FormType::Annual,
    fiscal_year: 2023,
    fiscal_period: FiscalPeriod::FullYear,
    fiscal_year_end: d(2023, 12, 31),
    filed_date: filed,
    accession_number: accession.into(),
  }
}

fn q_meta(
  company_id: Uuid,
  period: FiscalPeriod,
  accession: &str,
  filed: NaiveDate,
) -> FilingMeta {
  FilingMeta {
    fiscal_period: period,
    form_type: FormType::Quarterly,
    ..annual_meta(company_id, accession, filed)
  }
}

fn revenue(start: NaiveDate, end: NaiveDate, value: Decimal) -> RawFact {
  RawFact {
    raw_tag:   "us-gaap:Revenues".into(),
    value,
    unit:      Some("USD".into()),
    statement: Some("Income Statement".into()),
    period:    ReportedPeriod::Duration { start, end },
  }
}

fn cash(date: NaiveDate, value: Decimal) -> RawFact {
  RawFact {
    raw_tag:   "us-gaap:CashAndCashEquivalents".into(),
    value,
    unit:      Some("USD".into()),
    statement: Some("Balance Sheet".into()),
    period:    ReportedPeriod::Instant { date },
  }
}

fn revenue_key(company_id: Uuid) -> GroupKey {
  GroupKey {
    company_id,
    fiscal_year: 2023,
    concept: "revenue".into(),
  }
}

/// Annual revenue 1000 plus discrete Q1–Q3; the missing Q4 must be derived.
async fn ingest_three_quarters_and_annual(
  ingestor: &Ingestor<SqliteStore>,
  company_id: Uuid,
) -> [Uuid; 4] {
  let (q1, _) = ingestor
    .ingest(
      q_meta(company_id, FiscalPeriod::Q1, "Q-1", d(2023, 5, 1)),
      vec![revenue(d(2023, 1, 1), d(2023, 3, 31), dec!(200))],
    )
    .await
    .unwrap();
  let (q2, _) = ingestor
    .ingest(
      q_meta(company_id, FiscalPeriod::Q2, "Q-2", d(2023, 8, 1)),
      vec![revenue(d(2023, 4, 1), d(2023, 6, 30), dec!(250))],
    )
    .await
    .unwrap();
  let (q3, _) = ingestor
    .ingest(
      q_meta(company_id, FiscalPeriod::Q3, "Q-3", d(2023, 11, 1)),
      vec![revenue(d(2023, 7, 1), d(2023, 9, 30), dec!(260))],
    )
    .await
    .unwrap();
  let (annual, _) = ingestor
    .ingest(
      annual_meta(company_id, "K-1", d(2024, 2, 15)),
      vec![revenue(d(2023, 1, 1), d(2023, 12, 31), dec!(1000))],
    )
    .await
    .unwrap();
  [q1.filing_id, q2.filing_id, q3.filing_id, annual.filing_id]
}

// ─── Derivation scenarios ────────────────────────────────────────────────────

#[tokio::test]
async fn missing_q4_is_derived_from_annual() {
  let (store, ingestor, company) = setup().await;

  let filings =
    ingest_three_quarters_and_annual(&ingestor, company.company_id).await;
  ingestor.queue().drain().await;

  let rows = store
    .quarterly_by_company_and_year(company.company_id, 2023)
    .await
    .unwrap();
  assert_eq!(rows.len(), 4);

  let q4 = rows.iter().find(|r| r.quarter == 4).unwrap();
  assert_eq!(q4.value, dec!(290));
  assert!(q4.derived);

  let mut expected = filings.to_vec();
  expected.sort();
  assert_eq!(q4.source_filings, expected);

  // The reported quarters are untouched and not flagged.
  let q1 = rows.iter().find(|r| r.quarter == 1).unwrap();
  assert_eq!(q1.value, dec!(200));
  assert!(!q1.derived);

  // Quarters sum to the annual total exactly.
  let sum: Decimal = rows.iter().map(|r| r.value).sum();
  assert_eq!(sum, dec!(1000));

  let yearly = store
    .yearly_by_company_and_year(company.company_id, 2023)
    .await
    .unwrap();
  assert_eq!(yearly.len(), 1);
  assert_eq!(yearly[0].value, dec!(1000));
}

#[tokio::test]
async fn cumulative_ytd_converts_to_discrete_quarter() {
  let (store, ingestor, company) = setup().await;

  ingestor
    .ingest(
      q_meta(company.company_id, FiscalPeriod::Q1, "Q-1", d(2023, 5, 1)),
      vec![revenue(d(2023, 1, 1), d(2023, 3, 31), dec!(200))],
    )
    .await
    .unwrap();
  // The Q2 10-Q reports cumulative revenue through Q2, not Q2 alone.
  ingestor
    .ingest(
      q_meta(company.company_id, FiscalPeriod::Q2, "Q-2", d(2023, 8, 1)),
      vec![revenue(d(2023, 1, 1), d(2023, 6, 30), dec!(450))],
    )
    .await
    .unwrap();
  ingestor.queue().drain().await;

  let rows = store
    .quarterly_by_company_and_year(company.company_id, 2023)
    .await
    .unwrap();
  assert_eq!(rows.len(), 2);

  let q2 = rows.iter().find(|r| r.quarter == 2).unwrap();
  assert_eq!(q2.value, dec!(250));
  assert!(!q2.derived);
}

#[tokio::test]
async fn two_missing_quarters_leave_group_partial() {
  let (store, ingestor, company) = setup().await;

  ingestor
    .ingest(
      q_meta(company.company_id, FiscalPeriod::Q1, "Q-1", d(2023, 5, 1)),
      vec![revenue(d(2023, 1, 1), d(2023, 3, 31), dec!(200))],
    )
    .await
    .unwrap();
  ingestor
    .ingest(
      annual_meta(company.company_id, "K-1", d(2024, 2, 15)),
      vec![revenue(d(2023, 1, 1), d(2023, 12, 31), dec!(1000))],
    )
    .await
    .unwrap();
  ingestor.queue().drain().await;

  let rows = store
    .quarterly_by_company_and_year(company.company_id, 2023)
    .await
    .unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].quarter, 1);
  assert!(!rows[0].derived);
}

// ─── Supersession and restatement ────────────────────────────────────────────

#[tokio::test]
async fn restated_annual_wins_and_retriggers_derivation() {
  let (store, ingestor, company) = setup().await;

  ingest_three_quarters_and_annual(&ingestor, company.company_id).await;
  ingestor.queue().drain().await;

  // Restated 10-K, filed later, moves revenue 1000 → 1050.
  let (restated, _) = ingestor
    .ingest(
      annual_meta(company.company_id, "K-2", d(2024, 6, 1)),
      vec![revenue(d(2023, 1, 1), d(2023, 12, 31), dec!(1050))],
    )
    .await
    .unwrap();
  ingestor.queue().drain().await;

  let yearly = store
    .yearly_by_company_and_year(company.company_id, 2023)
    .await
    .unwrap();
  assert_eq!(yearly.len(), 1);
  assert_eq!(yearly[0].value, dec!(1050));
  assert_eq!(yearly[0].filing_id, restated.filing_id);

  // Q4 was automatically recomputed against the restated total.
  let rows = store
    .quarterly_by_company_and_year(company.company_id, 2023)
    .await
    .unwrap();
  let q4 = rows.iter().find(|r| r.quarter == 4).unwrap();
  assert_eq!(q4.value, dec!(340));
  assert!(q4.derived);
  assert!(q4.source_filings.contains(&restated.filing_id));
}

#[tokio::test]
async fn concurrent_ingestion_of_conflicting_filings_converges() {
  let (store, ingestor, company) = setup().await;
  let ingestor = Arc::new(ingestor);

  // Two annual filings for the same group, ingested concurrently. The one
  // with the later filed date must win regardless of arrival order.
  let a = {
    let ingestor = Arc::clone(&ingestor);
    let company_id = company.company_id;
    async move {
      ingestor
        .ingest(
          annual_meta(company_id, "K-1", d(2024, 2, 15)),
          vec![revenue(d(2023, 1, 1), d(2023, 12, 31), dec!(1000))],
        )
        .await
    }
  };
  let b = {
    let ingestor = Arc::clone(&ingestor);
    let company_id = company.company_id;
    async move {
      ingestor
        .ingest(
          annual_meta(company_id, "K-2", d(2024, 6, 1)),
          vec![revenue(d(2023, 1, 1), d(2023, 12, 31), dec!(1050))],
        )
        .await
    }
  };

  let (ra, rb) = tokio::join!(a, b);
  ra.unwrap();
  let (winner, _) = rb.unwrap();
  ingestor.queue().drain().await;

  // The materialized row reflects exactly the newer filing — never a torn
  // mix and never the older value.
  let yearly = store
    .yearly_by_company_and_year(company.company_id, 2023)
    .await
    .unwrap();
  assert_eq!(yearly.len(), 1);
  assert_eq!(yearly[0].value, dec!(1050));
  assert_eq!(yearly[0].filing_id, winner.filing_id);
}

// ─── Idempotence ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn rematerialization_of_unchanged_ledger_is_identical() {
  let (store, ingestor, company) = setup().await;

  ingest_three_quarters_and_annual(&ingestor, company.company_id).await;
  ingestor.queue().drain().await;

  let before_q = store
    .quarterly_by_company_and_year(company.company_id, 2023)
    .await
    .unwrap();
  let before_y = store
    .yearly_by_company_and_year(company.company_id, 2023)
    .await
    .unwrap();

  // Force a second refresh with no ledger changes.
  materialize::refresh_group(
    store.as_ref(),
    &seed_aliases(),
    &revenue_key(company.company_id),
  )
  .await
  .unwrap();

  let after_q = store
    .quarterly_by_company_and_year(company.company_id, 2023)
    .await
    .unwrap();
  let after_y = store
    .yearly_by_company_and_year(company.company_id, 2023)
    .await
    .unwrap();

  assert_eq!(before_q, after_q);
  assert_eq!(before_y, after_y);
}

// ─── Normalization lifecycle ─────────────────────────────────────────────────

#[tokio::test]
async fn unmapped_facts_surface_after_alias_and_refresh() {
  let (store, ingestor, company) = setup().await;

  let (filing, report) = ingestor
    .ingest(
      q_meta(company.company_id, FiscalPeriod::Q1, "Q-1", d(2023, 5, 1)),
      vec![RawFact {
        raw_tag: "acme:TurnoverTotal".into(),
        ..revenue(d(2023, 1, 1), d(2023, 3, 31), dec!(200))
      }],
    )
    .await
    .unwrap();
  ingestor.queue().drain().await;

  assert_eq!(report.unmapped, 1);
  assert_eq!(report.groups_queued, 0);
  assert!(
    store
      .quarterly_by_company_and_year(company.company_id, 2023)
      .await
      .unwrap()
      .is_empty()
  );
  // The unmapped fact is in the ledger with its raw tag.
  let audit = store.facts_for_filing(filing.filing_id).await.unwrap();
  assert_eq!(audit.len(), 1);
  assert_eq!(audit[0].concept, None);
  assert_eq!(audit[0].kind, ConceptKind::Unknown);

  // Adding the alias and asking for a refresh picks the group up lazily —
  // the months-old fact becomes derivable without rewriting the ledger.
  ingestor
    .add_alias(ConceptAlias {
      raw_tag:        "acme:TurnoverTotal".into(),
      statement_hint: None,
      canonical:      "revenue".into(),
      kind:           ConceptKind::Flow,
    })
    .await
    .unwrap();

  let queued = ingestor
    .refresh_company(company.company_id, Some(2023))
    .await
    .unwrap();
  ingestor.queue().drain().await;
  assert_eq!(queued, 1);

  let rows = store
    .quarterly_by_company_and_year(company.company_id, 2023)
    .await
    .unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].concept, "revenue");
  assert_eq!(rows[0].value, dec!(200));
  assert_eq!(rows[0].quarter, 1);
}

#[tokio::test]
async fn ambiguous_periods_are_stored_but_never_derived() {
  let (store, ingestor, company) = setup().await;

  let (filing, report) = ingestor
    .ingest(
      q_meta(company.company_id, FiscalPeriod::Q1, "Q-1", d(2023, 5, 1)),
      vec![
        // 46 days: outside every tolerance band.
        revenue(d(2023, 1, 1), d(2023, 2, 15), dec!(77)),
        revenue(d(2023, 1, 1), d(2023, 3, 31), dec!(200)),
      ],
    )
    .await
    .unwrap();
  ingestor.queue().drain().await;

  assert_eq!(report.ambiguous, 1);

  let rows = store
    .quarterly_by_company_and_year(company.company_id, 2023)
    .await
    .unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].value, dec!(200));

  let audit = store.facts_for_filing(filing.filing_id).await.unwrap();
  assert!(audit.iter().any(|f| f.span.is_none()));
}

// ─── Stocks ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stock_balances_materialize_without_arithmetic() {
  let (store, ingestor, company) = setup().await;

  ingestor
    .ingest(
      q_meta(company.company_id, FiscalPeriod::Q2, "Q-2", d(2023, 8, 1)),
      vec![cash(d(2023, 6, 30), dec!(5000))],
    )
    .await
    .unwrap();
  ingestor
    .ingest(
      annual_meta(company.company_id, "K-1", d(2024, 2, 15)),
      vec![cash(d(2023, 12, 31), dec!(7500))],
    )
    .await
    .unwrap();
  ingestor.queue().drain().await;

  let rows = store
    .quarterly_by_company_and_year(company.company_id, 2023)
    .await
    .unwrap();
  assert_eq!(rows.len(), 2);
  let q2 = rows.iter().find(|r| r.quarter == 2).unwrap();
  let q4 = rows.iter().find(|r| r.quarter == 4).unwrap();
  assert_eq!(q2.value, dec!(5000));
  assert_eq!(q4.value, dec!(7500));
  assert!(rows.iter().all(|r| !r.derived));

  // The year-end balance also lands in the yearly table, sourced from the
  // annual filing.
  let yearly = store
    .yearly_by_company_and_year(company.company_id, 2023)
    .await
    .unwrap();
  assert_eq!(yearly.len(), 1);
  assert_eq!(yearly[0].concept, "cash");
  assert_eq!(yearly[0].value, dec!(7500));
}

// ─── Inconsistent restatement ────────────────────────────────────────────────

#[tokio::test]
async fn divergent_annual_total_still_materializes() {
  let (store, ingestor, company) = setup().await;

  // All four quarters reported, annual total off by 60: a warning, not a
  // failure — every row still lands.
  for (period, accession, filed, start, end, value) in [
    (FiscalPeriod::Q1, "Q-1", d(2023, 5, 1), d(2023, 1, 1), d(2023, 3, 31), dec!(200)),
    (FiscalPeriod::Q2, "Q-2", d(2023, 8, 1), d(2023, 4, 1), d(2023, 6, 30), dec!(250)),
    (FiscalPeriod::Q3, "Q-3", d(2023, 11, 1), d(2023, 7, 1), d(2023, 9, 30), dec!(260)),
    (FiscalPeriod::Q4, "Q-4", d(2024, 1, 20), d(2023, 10, 1), d(2023, 12, 31), dec!(350)),
  ] {
    ingestor
      .ingest(
        q_meta(company.company_id, period, accession, filed),
        vec![revenue(start, end, value)],
      )
      .await
      .unwrap();
  }
  ingestor
    .ingest(
      annual_meta(company.company_id, "K-1", d(2024, 2, 15)),
      vec![revenue(d(2023, 1, 1), d(2023, 12, 31), dec!(1000))],
    )
    .await
    .unwrap();
  ingestor.queue().drain().await;

  let outcome = materialize::refresh_group(
    store.as_ref(),
    &seed_aliases(),
    &revenue_key(company.company_id),
  )
  .await
  .unwrap();
  assert!(!outcome.consistent);

  let rows = store
    .quarterly_by_company_and_year(company.company_id, 2023)
    .await
    .unwrap();
  assert_eq!(rows.len(), 4);
  let yearly = store
    .yearly_by_company_and_year(company.company_id, 2023)
    .await
    .unwrap();
  assert_eq!(yearly[0].value, dec!(1000));
}

// ─── Queue behaviour ─────────────────────────────────────────────────────────

#[tokio::test]
async fn repeated_invalidations_coalesce_and_drain() {
  let (store, ingestor, company) = setup().await;

  ingest_three_quarters_and_annual(&ingestor, company.company_id).await;

  let key = revenue_key(company.company_id);
  for _ in 0..32 {
    ingestor.queue().enqueue(key.clone()).await;
  }
  ingestor.queue().drain().await;
  assert_eq!(ingestor.queue().pending().await, 0);

  let rows = store
    .quarterly_by_company_and_year(company.company_id, 2023)
    .await
    .unwrap();
  assert_eq!(rows.len(), 4);
}
