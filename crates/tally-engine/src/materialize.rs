//! Materializer — turns the fact ledger into queryable metric rows.
//!
//! `refresh_group` is the unit of work: read a committed snapshot,
//! re-normalize it against the current alias table, resolve supersession,
//! derive, and transactionally replace the affected rows. Running it twice
//! over an unchanged ledger and alias table writes identical rows, so
//! refreshes may be repeated, re-ordered, or re-run after losing a race
//! without harm.

use tracing::{debug, warn};

use tally_core::{
  concept::{AliasTable, ConceptKind},
  filing::FormType,
  metric::{GroupKey, QuarterlyMetric, YearlyMetric},
  store::{LedgerTag, MetricStore, SourcedFact, apply_aliases, resolve_winners},
};

use crate::{
  Result,
  derive::{
    FlowDerivation, StockDerivation, consistency_gap, derive_flow,
    derive_stock,
  },
  error::Error,
};

/// What a single group refresh produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
  pub key:            GroupKey,
  pub quarterly_rows: usize,
  pub yearly_written: bool,
  /// `false` when the four quarters and the annual total diverge beyond
  /// tolerance — surfaced as a warning, never as a failure.
  pub consistent:     bool,
}

/// Recompute and replace the materialized rows for exactly one group.
pub async fn refresh_group<S: MetricStore>(
  store: &S,
  aliases: &AliasTable,
  key: &GroupKey,
) -> Result<RefreshOutcome> {
  let snapshot = store
    .facts_for_year(key.company_id, key.fiscal_year)
    .await
    .map_err(Error::store)?;

  let group: Vec<SourcedFact> =
    resolve_winners(apply_aliases(snapshot, aliases))
      .into_iter()
      .filter(|sf| sf.fact.concept.as_deref() == Some(key.concept.as_str()))
      .collect();

  let (rows, yearly, consistent) = match group.first().map(|sf| sf.fact.kind)
  {
    Some(ConceptKind::Flow) => {
      let derivation = derive_flow(&group);
      let consistent = match consistency_gap(&derivation) {
        Some(gap) => {
          warn!(
            key = %key,
            %gap,
            "quarters diverge from annual total beyond tolerance; \
             newest filing wins"
          );
          false
        }
        None => true,
      };
      let (rows, yearly) = flow_rows(key, derivation);
      (rows, yearly, consistent)
    }
    Some(ConceptKind::Stock) => {
      let (rows, yearly) = stock_rows(key, derive_stock(&group));
      (rows, yearly, true)
    }
    // Aliases always classify flow or stock, so `Unknown` cannot survive
    // re-normalization; an empty group just clears any stale rows.
    Some(ConceptKind::Unknown) | None => (Vec::new(), None, true),
  };

  let outcome = RefreshOutcome {
    key:            key.clone(),
    quarterly_rows: rows.len(),
    yearly_written: yearly.is_some(),
    consistent,
  };

  store
    .replace_quarterly(key, rows)
    .await
    .map_err(Error::store)?;
  store
    .replace_yearly(key, yearly)
    .await
    .map_err(Error::store)?;

  debug!(
    key = %key,
    rows = outcome.quarterly_rows,
    yearly = outcome.yearly_written,
    "group refreshed"
  );
  Ok(outcome)
}

/// The group keys a company's ledger can populate under the current alias
/// table: one key per `(fiscal year, canonical concept)`, plus keys for
/// concepts the facts were *recorded* under so revised aliases still get
/// their stale rows cleared.
pub fn keys_for_tags(
  company_id: uuid::Uuid,
  tags: &[LedgerTag],
  aliases: &AliasTable,
) -> Vec<GroupKey> {
  let mut keys: Vec<GroupKey> = Vec::new();
  let mut push = |fiscal_year: i32, concept: String| {
    let key = GroupKey { company_id, fiscal_year, concept };
    if !keys.contains(&key) {
      keys.push(key);
    }
  };

  for tag in tags {
    if let Some((canonical, _)) =
      aliases.normalize(&tag.raw_tag, tag.statement.as_deref())
    {
      push(tag.fiscal_year, canonical.to_owned());
    }
    if let Some(recorded) = &tag.recorded_concept {
      push(tag.fiscal_year, recorded.clone());
    }
  }

  keys
}

/// Refresh every group of one company and fiscal year.
pub async fn refresh_year<S: MetricStore>(
  store: &S,
  aliases: &AliasTable,
  company_id: uuid::Uuid,
  fiscal_year: i32,
) -> Result<Vec<RefreshOutcome>> {
  let tags = store
    .ledger_tags_for_company(company_id)
    .await
    .map_err(Error::store)?;
  let keys = keys_for_tags(company_id, &tags, aliases);

  let mut outcomes = Vec::new();
  for key in keys.iter().filter(|k| k.fiscal_year == fiscal_year) {
    outcomes.push(refresh_group(store, aliases, key).await?);
  }
  Ok(outcomes)
}

/// Refresh every group of one company — used after bulk backfill or alias
/// changes.
pub async fn refresh_company<S: MetricStore>(
  store: &S,
  aliases: &AliasTable,
  company_id: uuid::Uuid,
) -> Result<Vec<RefreshOutcome>> {
  let tags = store
    .ledger_tags_for_company(company_id)
    .await
    .map_err(Error::store)?;
  let keys = keys_for_tags(company_id, &tags, aliases);

  let mut outcomes = Vec::new();
  for key in &keys {
    outcomes.push(refresh_group(store, aliases, key).await?);
  }
  Ok(outcomes)
}

// ─── Row assembly ────────────────────────────────────────────────────────────

fn flow_rows(
  key: &GroupKey,
  derivation: FlowDerivation,
) -> (Vec<QuarterlyMetric>, Option<YearlyMetric>) {
  let rows = derivation
    .quarters
    .into_iter()
    .map(|(quarter, cell)| QuarterlyMetric {
      company_id: key.company_id,
      fiscal_year: key.fiscal_year,
      quarter,
      concept: key.concept.clone(),
      value: cell.value,
      unit: cell.unit,
      derived: cell.derived,
      source_filings: cell.sources,
    })
    .collect();

  // Yearly metrics come exclusively from annual filings; a full-year total
  // reported on a quarterly filing still drives derivation but never
  // materializes as a yearly row.
  let yearly = derivation
    .annual
    .filter(|a| a.form_type == FormType::Annual)
    .map(|a| YearlyMetric {
      company_id:  key.company_id,
      fiscal_year: key.fiscal_year,
      concept:     key.concept.clone(),
      value:       a.value,
      unit:        a.unit,
      filing_id:   a.filing_id,
    });

  (rows, yearly)
}

fn stock_rows(
  key: &GroupKey,
  derivation: StockDerivation,
) -> (Vec<QuarterlyMetric>, Option<YearlyMetric>) {
  let rows = derivation
    .quarters
    .into_iter()
    .map(|(quarter, cell)| QuarterlyMetric {
      company_id: key.company_id,
      fiscal_year: key.fiscal_year,
      quarter,
      concept: key.concept.clone(),
      value: cell.value,
      unit: cell.unit,
      derived: cell.derived,
      source_filings: cell.sources,
    })
    .collect();

  let yearly = derivation
    .year_end
    .filter(|a| a.form_type == FormType::Annual)
    .map(|a| YearlyMetric {
      company_id:  key.company_id,
      fiscal_year: key.fiscal_year,
      concept:     key.concept.clone(),
      value:       a.value,
      unit:        a.unit,
      filing_id:   a.filing_id,
    });

  (rows, yearly)
}
