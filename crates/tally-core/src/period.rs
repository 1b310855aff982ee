//! Period classifier — places a reported period inside a filing's declared
//! fiscal year.
//!
//! Quarter assignment works off the *fiscal* calendar (fiscal years need not
//! align with calendar years): the fiscal year is split into four equal
//! spans and a period is assigned by where its end date lands. Durations are
//! then disambiguated by length — one quarter's worth of days is a discrete
//! quarter figure, `n` quarters' worth starting at the fiscal-year start is
//! a cumulative year-to-date figure.
//!
//! Misclassification is the single largest source of wrong derived values,
//! so the tolerance bands are explicit constants and every band edge is
//! tested.

use chrono::NaiveDate;

use crate::{
  fact::{FiscalSpan, ReportedPeriod},
  filing::fiscal_year_start,
};

// ─── Tolerance bands ─────────────────────────────────────────────────────────

/// A duration of this many days (inclusive) counts as one discrete quarter.
/// Filers report 13-week quarters, month-end quarters, and 53rd weeks, so
/// the band is generous but bounded.
pub const QUARTER_MIN_DAYS: i64 = 80;
pub const QUARTER_MAX_DAYS: i64 = 100;

/// A duration of this many days (inclusive) counts as a full fiscal year.
pub const YEAR_MIN_DAYS: i64 = 350;
pub const YEAR_MAX_DAYS: i64 = 380;

/// How far a duration's start may sit from its nominal fiscal boundary, and
/// how far a cumulative duration's length may deviate from a whole number
/// of quarters, before the period is declared ambiguous.
pub const BOUNDARY_TOLERANCE_DAYS: i64 = 14;

// ─── Classification ──────────────────────────────────────────────────────────

/// Assign a reported period to a fiscal span, or `None` when no tolerance
/// band fits (the fact is then stored unclassified and excluded from
/// derivation).
///
/// Periods ending outside the declared fiscal year — comparative figures
/// for prior years re-printed in a later filing — are deliberately not
/// classified: each filing's facts speak only for its own fiscal year.
pub fn classify(
  period: ReportedPeriod,
  fiscal_year_end: NaiveDate,
) -> Option<FiscalSpan> {
  let fy_start = fiscal_year_start(fiscal_year_end);
  let year_len = (fiscal_year_end - fy_start).num_days() + 1;

  match period {
    ReportedPeriod::Instant { date } => {
      if date < fy_start || date > fiscal_year_end {
        return None;
      }
      if date == fiscal_year_end {
        return Some(FiscalSpan::InstantYearEnd);
      }
      Some(FiscalSpan::Instant {
        quarter: quarter_containing(date, fy_start, year_len),
      })
    }

    ReportedPeriod::Duration { start, end } => {
      if end < start || end > fiscal_year_end || end < fy_start {
        return None;
      }

      let len = (end - start).num_days() + 1;
      let starts_at_fy = (start - fy_start).num_days().abs()
        <= BOUNDARY_TOLERANCE_DAYS;

      // Full fiscal year: year-length and ending on (or within tolerance
      // of) the fiscal-year end.
      if (YEAR_MIN_DAYS..=YEAR_MAX_DAYS).contains(&len)
        && (fiscal_year_end - end).num_days() <= BOUNDARY_TOLERANCE_DAYS
      {
        return Some(FiscalSpan::FullYear);
      }

      // One quarter's worth of days: a discrete quarter figure, provided
      // the start sits on the quarter's nominal boundary. A year-to-date
      // figure through Q1 lands here too and *is* Q1.
      if (QUARTER_MIN_DAYS..=QUARTER_MAX_DAYS).contains(&len) {
        let n = quarter_containing(end, fy_start, year_len);
        let nominal_start = i64::from(n - 1) * year_len / 4;
        let misalignment =
          ((start - fy_start).num_days() - nominal_start).abs();
        if misalignment > BOUNDARY_TOLERANCE_DAYS {
          return None;
        }
        return Some(FiscalSpan::Quarter { n });
      }

      // Cumulative year-to-date: starts at the fiscal-year start and runs
      // for a whole number of quarters.
      if starts_at_fy {
        for through in 2..=3u8 {
          let expected = i64::from(through) * year_len / 4;
          if (len - expected).abs() <= BOUNDARY_TOLERANCE_DAYS {
            return Some(FiscalSpan::YearToDate { through });
          }
        }
      }

      None
    }
  }
}

/// Which of the four equal fiscal spans contains `date`.
fn quarter_containing(date: NaiveDate, fy_start: NaiveDate, year_len: i64) -> u8 {
  let offset = (date - fy_start).num_days().clamp(0, year_len - 1);
  let q = offset * 4 / year_len + 1;
  q.clamp(1, 4) as u8
}
