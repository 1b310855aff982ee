//! The `MetricStore` trait, the supersession resolution rule, and supporting
//! types.
//!
//! The trait is implemented by storage backends (e.g. `tally-store-sqlite`).
//! Higher layers (`tally-engine`, `tally-api`) depend on this abstraction,
//! not on any concrete backend.

use std::collections::HashMap;
use std::future::Future;

use uuid::Uuid;

use crate::{
  company::{Company, NewCompany},
  concept::{AliasTable, ConceptKind},
  fact::{FinancialFact, FiscalSpan, NewFact},
  filing::{Filing, FilingMeta},
  metric::{GroupKey, QuarterlyMetric, YearlyMetric},
};

// ─── SourcedFact ─────────────────────────────────────────────────────────────

/// A fact bundled with its owning filing — everything derivation needs for
/// precedence decisions and provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcedFact {
  pub fact:   FinancialFact,
  pub filing: Filing,
}

// ─── Re-normalization ────────────────────────────────────────────────────────

/// Re-apply the current alias table to a fact snapshot.
///
/// Facts store the normalization that was current at ingestion time as
/// audit information, but derivation always works from the live table —
/// that is what lets an alias added today pick up facts recorded months
/// ago, without rewriting the ledger. Tags the table no longer maps revert
/// to unmapped.
pub fn apply_aliases(
  facts: Vec<SourcedFact>,
  table: &AliasTable,
) -> Vec<SourcedFact> {
  facts
    .into_iter()
    .map(|mut sf| {
      match table
        .normalize(&sf.fact.raw_tag, sf.fact.statement.as_deref())
      {
        Some((canonical, kind)) => {
          sf.fact.concept = Some(canonical.to_owned());
          sf.fact.kind = kind;
        }
        None => {
          sf.fact.concept = None;
          sf.fact.kind = ConceptKind::Unknown;
        }
      }
      sf
    })
    .collect()
}

// ─── Ledger tags ─────────────────────────────────────────────────────────────

/// One distinct `(fiscal year, raw tag, statement)` tuple present in a
/// company's ledger, with the normalization snapshot it was recorded under.
/// The fan-out source for whole-company refreshes: mapping each tag through
/// the *current* alias table yields the group keys to recompute, and the
/// recorded concept keeps groups whose alias was since revised eligible for
/// clearing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTag {
  pub fiscal_year:      i32,
  pub raw_tag:          String,
  pub statement:        Option<String>,
  pub recorded_concept: Option<String>,
}

// ─── Supersession resolution ─────────────────────────────────────────────────

/// Resolve the "winning" fact per `(concept, fiscal span)` slot.
///
/// For each slot the fact from the filing with the latest filed date wins;
/// ties break to the lexicographically greater accession number (accession
/// numbers are issued monotonically), then to the fact id so repeated runs
/// over an unchanged fact set are bit-identical. Facts without a canonical
/// concept or a fiscal span never compete — they are audit-only.
///
/// Losing facts are not discarded by the store; they remain retrievable via
/// [`MetricStore::facts_for_filing`].
pub fn resolve_winners(facts: Vec<SourcedFact>) -> Vec<SourcedFact> {
  let mut winners: HashMap<(String, FiscalSpan), SourcedFact> =
    HashMap::new();

  for candidate in facts {
    let (Some(concept), Some(span)) =
      (candidate.fact.concept.clone(), candidate.fact.span)
    else {
      continue;
    };

    match winners.entry((concept, span)) {
      std::collections::hash_map::Entry::Vacant(slot) => {
        slot.insert(candidate);
      }
      std::collections::hash_map::Entry::Occupied(mut slot) => {
        if precedence(&candidate) > precedence(slot.get()) {
          slot.insert(candidate);
        }
      }
    }
  }

  let mut resolved: Vec<SourcedFact> = winners.into_values().collect();
  resolved.sort_by(|a, b| {
    (a.fact.concept.as_deref(), a.fact.span.map(|s| s.sort_key()))
      .cmp(&(b.fact.concept.as_deref(), b.fact.span.map(|s| s.sort_key())))
  });
  resolved
}

fn precedence(sf: &SourcedFact) -> (chrono::NaiveDate, &str, Uuid) {
  (
    sf.filing.filed_date,
    sf.filing.accession_number.as_str(),
    sf.fact.fact_id,
  )
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Tally storage backend.
///
/// Writes to the fact ledger are append-only: `record_filing` is the only
/// way facts enter the store, and nothing ever updates or deletes them.
/// The materialized metric tables are overwritten wholesale per group key,
/// each replacement a single transaction.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait MetricStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Companies ─────────────────────────────────────────────────────────

  /// Create and persist a new company.
  fn add_company(
    &self,
    input: NewCompany,
  ) -> impl Future<Output = Result<Company, Self::Error>> + Send + '_;

  /// Retrieve a company by id. Returns `None` if not found.
  fn get_company(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Company>, Self::Error>> + Send + '_;

  /// Retrieve a company by ticker symbol.
  fn company_by_ticker<'a>(
    &'a self,
    ticker: &'a str,
  ) -> impl Future<Output = Result<Option<Company>, Self::Error>> + Send + 'a;

  fn list_companies(
    &self,
  ) -> impl Future<Output = Result<Vec<Company>, Self::Error>> + Send + '_;

  // ── Fact ledger — append-only writes ──────────────────────────────────

  /// Insert a filing and its facts as one atomic batch and return the
  /// persisted filing together with the affected group keys (the
  /// invalidation events for the refresh queue).
  ///
  /// Fails without side effects if `(company_id, accession_number)` is
  /// already recorded or the company does not exist.
  fn record_filing(
    &self,
    meta: FilingMeta,
    facts: Vec<NewFact>,
  ) -> impl Future<Output = Result<(Filing, Vec<GroupKey>), Self::Error>>
  + Send
  + '_;

  /// Retrieve a filing by id. Returns `None` if not found.
  fn get_filing(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Filing>, Self::Error>> + Send + '_;

  /// The full raw ledger for one filing, including facts that later
  /// filings superseded — the audit trail.
  fn facts_for_filing(
    &self,
    filing_id: Uuid,
  ) -> impl Future<Output = Result<Vec<FinancialFact>, Self::Error>> + Send + '_;

  /// A committed snapshot of every fact for one company and fiscal year,
  /// each bundled with its filing. Unresolved: callers re-normalize with
  /// the current alias table ([`apply_aliases`]) and then resolve
  /// precedence ([`resolve_winners`]).
  fn facts_for_year(
    &self,
    company_id: Uuid,
    fiscal_year: i32,
  ) -> impl Future<Output = Result<Vec<SourcedFact>, Self::Error>> + Send + '_;

  /// The distinct ledger tags of a company — the fan-out set for a
  /// whole-company refresh (see [`LedgerTag`]).
  fn ledger_tags_for_company(
    &self,
    company_id: Uuid,
  ) -> impl Future<Output = Result<Vec<LedgerTag>, Self::Error>> + Send + '_;

  // ── Materialized tables — transactional overwrites ────────────────────

  /// Replace every quarterly row for `key` with `rows` in one transaction.
  /// Old rows are overwritten, never merged.
  fn replace_quarterly<'a>(
    &'a self,
    key: &'a GroupKey,
    rows: Vec<QuarterlyMetric>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Replace the yearly row for `key` (or clear it) in one transaction.
  fn replace_yearly<'a>(
    &'a self,
    key: &'a GroupKey,
    row: Option<YearlyMetric>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Read accessors — materialized rows only ───────────────────────────

  fn quarterly_by_company_and_year(
    &self,
    company_id: Uuid,
    fiscal_year: i32,
  ) -> impl Future<Output = Result<Vec<QuarterlyMetric>, Self::Error>>
  + Send
  + '_;

  fn quarterly_by_company_and_concept<'a>(
    &'a self,
    company_id: Uuid,
    concept: &'a str,
  ) -> impl Future<Output = Result<Vec<QuarterlyMetric>, Self::Error>>
  + Send
  + 'a;

  fn yearly_by_company_and_year(
    &self,
    company_id: Uuid,
    fiscal_year: i32,
  ) -> impl Future<Output = Result<Vec<YearlyMetric>, Self::Error>> + Send + '_;

  /// The newest materialized quarter's rows for a company.
  fn latest_quarterly(
    &self,
    company_id: Uuid,
  ) -> impl Future<Output = Result<Vec<QuarterlyMetric>, Self::Error>>
  + Send
  + '_;
}
