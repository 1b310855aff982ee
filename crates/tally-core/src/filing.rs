//! Filing — one regulatory submission and its fiscal calendar context.
//!
//! Filings are created by the ingestion pipeline and never mutated.
//! Corrections and restatements arrive as new filings; precedence between
//! overlapping filings is decided at read time (see
//! [`crate::store::resolve_winners`]), never by editing history.

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Form type ───────────────────────────────────────────────────────────────

/// The kind of submission. Annual reports carry full-year totals and are the
/// only admissible source for yearly metrics; quarterly reports carry
/// discrete-quarter or year-to-date figures.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FormType {
  Annual,
  Quarterly,
}

// ─── Fiscal period ───────────────────────────────────────────────────────────

/// The fiscal period a filing declares itself to cover.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
  strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FiscalPeriod {
  Q1,
  Q2,
  Q3,
  Q4,
  FullYear,
}

// ─── Filing ──────────────────────────────────────────────────────────────────

/// One regulatory submission. `(company_id, accession_number)` is unique;
/// two filings may cover the same fiscal year/period only as an explicit
/// restatement (the later filed date wins downstream).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filing {
  pub filing_id:        Uuid,
  pub company_id:       Uuid,
  pub form_type:        FormType,
  pub fiscal_year:      i32,
  pub fiscal_period:    FiscalPeriod,
  /// The declared end of the fiscal year this filing reports against.
  /// Fiscal years need not align with calendar years.
  pub fiscal_year_end:  NaiveDate,
  pub filed_date:       NaiveDate,
  /// Globally unique submission identifier, issued monotonically by the
  /// regulator. Used as the supersession tie-break.
  pub accession_number: String,
}

impl Filing {
  /// The first day of the declared fiscal year.
  pub fn fiscal_year_start(&self) -> NaiveDate {
    fiscal_year_start(self.fiscal_year_end)
  }
}

/// The day after the same calendar date one year before `fiscal_year_end`.
pub fn fiscal_year_start(fiscal_year_end: NaiveDate) -> NaiveDate {
  let prior = fiscal_year_end - Months::new(12);
  prior.succ_opt().unwrap_or(prior)
}

// ─── FilingMeta ──────────────────────────────────────────────────────────────

/// Filing metadata as handed over by the acquisition collaborator.
/// Input to [`crate::store::MetricStore::record_filing`]; `filing_id` is
/// always assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingMeta {
  pub company_id:       Uuid,
  pub form_type:        FormType,
  pub fiscal_year:      i32,
  pub fiscal_period:    FiscalPeriod,
  pub fiscal_year_end:  NaiveDate,
  pub filed_date:       NaiveDate,
  pub accession_number: String,
}
