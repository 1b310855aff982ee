//! Fact types — the fundamental unit of the Tally ledger.
//!
//! A fact is an immutable reported value owned by exactly one filing. Facts
//! are never updated; corrections arrive as new facts on a new filing, and
//! precedence is computed at read time.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::concept::ConceptKind;

// ─── Reported period ─────────────────────────────────────────────────────────

/// The accounting period a value was reported for: a balance date for
/// point-in-time figures, a span for flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportedPeriod {
  /// A point-in-time balance (e.g. cash on the balance-sheet date).
  Instant { date: NaiveDate },
  /// A duration flow (e.g. revenue for a quarter).
  Duration { start: NaiveDate, end: NaiveDate },
}

impl ReportedPeriod {
  /// The last day the value speaks for.
  pub fn end(&self) -> NaiveDate {
    match *self {
      Self::Instant { date } => date,
      Self::Duration { end, .. } => end,
    }
  }
}

// ─── Fiscal span ─────────────────────────────────────────────────────────────

/// Where a reported period lands inside the filing's declared fiscal year —
/// the output of [`crate::period::classify`].
///
/// Classification failure is represented as `None` on the stored fact, which
/// excludes it from derivation but keeps it in the audit ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "span", rename_all = "snake_case")]
pub enum FiscalSpan {
  /// A discrete quarter figure, confined to fiscal quarter `n` (1–4).
  Quarter { n: u8 },
  /// A cumulative year-to-date figure running from the fiscal-year start
  /// through the end of quarter `through` (2–4; a YTD figure through Q1 is
  /// classified as a discrete Q1).
  YearToDate { through: u8 },
  /// A full fiscal-year flow.
  FullYear,
  /// A balance dated inside fiscal quarter `quarter`.
  Instant { quarter: u8 },
  /// A balance dated exactly on the fiscal-year end: both the Q4 value and
  /// the year-end value.
  InstantYearEnd,
}

impl FiscalSpan {
  /// The single quarter this span speaks for, if any.
  pub fn quarter(&self) -> Option<u8> {
    match *self {
      Self::Quarter { n } => Some(n),
      Self::Instant { quarter } => Some(quarter),
      Self::InstantYearEnd => Some(4),
      Self::YearToDate { .. } | Self::FullYear => None,
    }
  }

  /// Stable ordering key so resolved fact sets sort deterministically.
  pub fn sort_key(&self) -> (u8, u8) {
    match *self {
      Self::Quarter { n } => (0, n),
      Self::YearToDate { through } => (1, through),
      Self::FullYear => (2, 0),
      Self::Instant { quarter } => (3, quarter),
      Self::InstantYearEnd => (4, 0),
    }
  }
}

// ─── RawFact ─────────────────────────────────────────────────────────────────

/// One raw `(concept, value, period)` tuple as handed over by the
/// acquisition collaborator, before normalization and classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFact {
  /// The concept tag exactly as reported by the filer.
  pub raw_tag:   String,
  pub value:     Decimal,
  pub unit:      Option<String>,
  /// Structural hint: which statement the figure appeared on
  /// (e.g. `"Income Statement"`). Used to disambiguate alias lookups.
  pub statement: Option<String>,
  pub period:    ReportedPeriod,
}

// ─── FinancialFact ───────────────────────────────────────────────────────────

/// A stored reported value. Once written, no field is ever updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialFact {
  pub fact_id:     Uuid,
  pub filing_id:   Uuid,
  pub raw_tag:     String,
  /// Canonical concept name after normalization; `None` if no alias exists
  /// for `raw_tag` (the fact is then excluded from derivation).
  pub concept:     Option<String>,
  pub kind:        ConceptKind,
  pub value:       Decimal,
  pub unit:        Option<String>,
  pub statement:   Option<String>,
  pub period:      ReportedPeriod,
  /// Fiscal classification; `None` when the period classifier could not
  /// confidently place the period (stored for audit, excluded from
  /// derivation).
  pub span:        Option<FiscalSpan>,
  /// Server-assigned timestamp; never changes after creation.
  pub recorded_at: DateTime<Utc>,
}

// ─── NewFact ─────────────────────────────────────────────────────────────────

/// Input to [`crate::store::MetricStore::record_filing`] — a normalized,
/// classified fact awaiting its store-assigned identity.
#[derive(Debug, Clone)]
pub struct NewFact {
  pub raw_tag:   String,
  pub concept:   Option<String>,
  pub kind:      ConceptKind,
  pub value:     Decimal,
  pub unit:      Option<String>,
  pub statement: Option<String>,
  pub period:    ReportedPeriod,
  pub span:      Option<FiscalSpan>,
}
