//! Materialized metric rows — the queryable output of the engine.
//!
//! These rows are fully owned by the materializer: created or overwritten
//! whenever their dependent facts change, never hand-edited. Downstream
//! query APIs read nothing else.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── GroupKey ────────────────────────────────────────────────────────────────

/// The invalidation and refresh unit: one company, fiscal year, and
/// canonical concept. Ingestion emits these; the refresh queue consumes
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey {
  pub company_id:  Uuid,
  pub fiscal_year: i32,
  pub concept:     String,
}

impl std::fmt::Display for GroupKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{}/{}/{}",
      self.company_id, self.fiscal_year, self.concept
    )
  }
}

// ─── Quarterly ───────────────────────────────────────────────────────────────

/// One materialized quarterly value.
///
/// Invariant: for a flow concept with all four quarters and the annual
/// total known, the quarters sum to the annual total within the derivation
/// tolerance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarterlyMetric {
  pub company_id:     Uuid,
  pub fiscal_year:    i32,
  /// Fiscal quarter, 1–4.
  pub quarter:        u8,
  pub concept:        String,
  pub value:          Decimal,
  pub unit:           Option<String>,
  /// `true` when the value was computed by the engine (the single missing
  /// quarter of an otherwise complete year) rather than directly sourced.
  pub derived:        bool,
  /// The filings that contributed to this value, sorted, so
  /// rematerialization is byte-identical.
  pub source_filings: Vec<Uuid>,
}

// ─── Yearly ──────────────────────────────────────────────────────────────────

/// One materialized full-year value. Sourced only from annual filings,
/// never derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearlyMetric {
  pub company_id:  Uuid,
  pub fiscal_year: i32,
  pub concept:     String,
  pub value:       Decimal,
  pub unit:        Option<String>,
  pub filing_id:   Uuid,
}
