//! Quarterly derivation — the algorithmic core of the engine.
//!
//! Operates on one supersession-resolved `(company, fiscal year, concept)`
//! group at a time. Flow concepts get cumulative-to-discrete conversion and
//! single-missing-quarter completion; stock concepts are never summed or
//! differenced, only selected. All arithmetic is `Decimal` — no binary
//! floats anywhere near reported values.
//!
//! Everything here is pure: identical input produces identical output,
//! including derived flags and provenance ordering, which is what makes
//! rematerialization idempotent.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use uuid::Uuid;

use tally_core::{fact::FiscalSpan, filing::FormType, store::SourcedFact};

// ─── Output types ────────────────────────────────────────────────────────────

/// One resolved quarterly value for a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarterCell {
  pub value:   Decimal,
  /// `true` only for the single missing quarter completed from the annual
  /// total — cumulative-to-discrete conversion does not count as derived.
  pub derived: bool,
  pub unit:    Option<String>,
  /// Contributing filings, sorted and deduplicated.
  pub sources: Vec<Uuid>,
}

/// The group's full-year total, when one was reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnualTotal {
  pub value:     Decimal,
  pub filing_id: Uuid,
  pub form_type: FormType,
  pub unit:      Option<String>,
}

/// Result of deriving a flow group.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlowDerivation {
  /// Quarter number (1–4) → resolved cell. Quarters that cannot be
  /// resolved are simply absent — the group stays partially populated
  /// rather than guessed.
  pub quarters: BTreeMap<u8, QuarterCell>,
  pub annual:   Option<AnnualTotal>,
}

/// Result of deriving a stock group.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StockDerivation {
  pub quarters: BTreeMap<u8, QuarterCell>,
  /// The fiscal-year-end balance, when one was reported.
  pub year_end: Option<AnnualTotal>,
}

// ─── Tolerance ───────────────────────────────────────────────────────────────

/// Allowed gap between `Q1 + Q2 + Q3 + Q4` and the annual total: the
/// smaller of one unit or 0.5% of the annual value, absorbing reported
/// rounding without masking real inconsistencies.
pub fn tolerance(annual: Decimal) -> Decimal {
  let half_percent = annual.abs() * Decimal::new(5, 3);
  half_percent.min(Decimal::ONE)
}

// ─── Flow derivation ─────────────────────────────────────────────────────────

/// Derive quarterly values for one flow group.
///
/// 1. Directly reported discrete quarters are taken as-is.
/// 2. Cumulative year-to-date figures are converted to discrete quarters in
///    increasing order: `q[n] = ytd[n] − ytd[n−1]` with `ytd[0] = 0`, where
///    the prior cumulative may be a reported YTD figure or the sum of
///    already-resolved earlier quarters. A conversion with an unresolved
///    prior cumulative is skipped.
/// 3. If the annual total and exactly three quarters are known, the fourth
///    is `annual − Σ known`, flagged `derived` with provenance spanning the
///    annual filing plus the three source quarters.
/// 4. With two or more quarters missing, nothing is guessed.
pub fn derive_flow(group: &[SourcedFact]) -> FlowDerivation {
  let mut discrete: BTreeMap<u8, &SourcedFact> = BTreeMap::new();
  let mut ytd: BTreeMap<u8, &SourcedFact> = BTreeMap::new();
  let mut annual: Option<AnnualTotal> = None;

  for sf in group {
    match sf.fact.span {
      Some(FiscalSpan::Quarter { n }) => {
        discrete.insert(n, sf);
      }
      Some(FiscalSpan::YearToDate { through }) => {
        ytd.insert(through, sf);
      }
      Some(FiscalSpan::FullYear) => {
        annual = Some(AnnualTotal {
          value:     sf.fact.value,
          filing_id: sf.filing.filing_id,
          form_type: sf.filing.form_type,
          unit:      sf.fact.unit.clone(),
        });
      }
      // Instants on a flow concept cannot be combined; ignore.
      Some(FiscalSpan::Instant { .. })
      | Some(FiscalSpan::InstantYearEnd)
      | None => {}
    }
  }

  let mut quarters: BTreeMap<u8, QuarterCell> = BTreeMap::new();
  for (&n, sf) in &discrete {
    quarters.insert(n, QuarterCell {
      value:   sf.fact.value,
      derived: false,
      unit:    sf.fact.unit.clone(),
      sources: vec![sf.filing.filing_id],
    });
  }

  // Cumulative-to-discrete, in increasing quarter order so each conversion
  // can lean on the ones before it.
  for n in 1..=4u8 {
    if quarters.contains_key(&n) {
      continue;
    }
    let Some(sf) = ytd.get(&n) else { continue };

    let prior = prior_cumulative(n, &ytd, &quarters);
    let Some((prior_value, prior_sources)) = prior else {
      continue;
    };

    let mut sources = prior_sources;
    sources.push(sf.filing.filing_id);
    sources.sort();
    sources.dedup();

    quarters.insert(n, QuarterCell {
      value: sf.fact.value - prior_value,
      derived: false,
      unit: sf.fact.unit.clone(),
      sources,
    });
  }

  // Single-missing-quarter completion from the annual total.
  if let Some(annual) = &annual {
    if quarters.len() == 3 {
      let known_sum: Decimal = quarters.values().map(|c| c.value).sum();
      let mut sources: Vec<Uuid> = quarters
        .values()
        .flat_map(|c| c.sources.iter().copied())
        .chain(std::iter::once(annual.filing_id))
        .collect();
      sources.sort();
      sources.dedup();

      let missing = (1..=4u8)
        .find(|n| !quarters.contains_key(n))
        .unwrap_or(4);
      quarters.insert(missing, QuarterCell {
        value: annual.value - known_sum,
        derived: true,
        unit: annual.unit.clone(),
        sources,
      });
    }
  }

  FlowDerivation { quarters, annual }
}

/// The cumulative value through quarter `n - 1`, if resolvable: zero for
/// `n == 1`, a reported YTD figure, or the sum of all earlier resolved
/// quarters.
fn prior_cumulative(
  n: u8,
  ytd: &BTreeMap<u8, &SourcedFact>,
  quarters: &BTreeMap<u8, QuarterCell>,
) -> Option<(Decimal, Vec<Uuid>)> {
  if n == 1 {
    return Some((Decimal::ZERO, Vec::new()));
  }

  if let Some(prev) = ytd.get(&(n - 1)) {
    return Some((prev.fact.value, vec![prev.filing.filing_id]));
  }

  let earlier: Vec<&QuarterCell> =
    (1..n).filter_map(|q| quarters.get(&q)).collect();
  if earlier.len() != usize::from(n - 1) {
    return None;
  }
  let sum = earlier.iter().map(|c| c.value).sum();
  let sources =
    earlier.iter().flat_map(|c| c.sources.iter().copied()).collect();
  Some((sum, sources))
}

/// The gap between the resolved quarters and the annual total, when all
/// four quarters and the annual are known and the gap exceeds
/// [`tolerance`]. `None` means consistent (or not fully populated).
pub fn consistency_gap(derivation: &FlowDerivation) -> Option<Decimal> {
  let annual = derivation.annual.as_ref()?;
  if derivation.quarters.len() != 4 {
    return None;
  }
  let sum: Decimal = derivation.quarters.values().map(|c| c.value).sum();
  let gap = (sum - annual.value).abs();
  (gap > tolerance(annual.value)).then_some(gap)
}

// ─── Stock derivation ────────────────────────────────────────────────────────

/// Derive quarterly values for one stock group: per quarter, the latest
/// reported instant whose date falls inside that quarter. No arithmetic is
/// ever applied across periods.
pub fn derive_stock(group: &[SourcedFact]) -> StockDerivation {
  let mut per_quarter: BTreeMap<u8, &SourcedFact> = BTreeMap::new();
  let mut year_end: Option<AnnualTotal> = None;

  for sf in group {
    let quarter = match sf.fact.span {
      Some(FiscalSpan::Instant { quarter }) => quarter,
      Some(FiscalSpan::InstantYearEnd) => {
        year_end = Some(AnnualTotal {
          value:     sf.fact.value,
          filing_id: sf.filing.filing_id,
          form_type: sf.filing.form_type,
          unit:      sf.fact.unit.clone(),
        });
        4
      }
      // Durations on a stock concept carry no balance; ignore.
      _ => continue,
    };

    let later = per_quarter
      .get(&quarter)
      .is_none_or(|held| sf.fact.period.end() > held.fact.period.end());
    if later {
      per_quarter.insert(quarter, sf);
    }
  }

  let quarters = per_quarter
    .into_iter()
    .map(|(q, sf)| {
      (q, QuarterCell {
        value:   sf.fact.value,
        derived: false,
        unit:    sf.fact.unit.clone(),
        sources: vec![sf.filing.filing_id],
      })
    })
    .collect();

  StockDerivation { quarters, year_end }
}
