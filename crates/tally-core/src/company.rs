//! Company — the thin envelope that owns filings.
//!
//! A company holds only identity metadata. All reported figures live in the
//! facts of its filings; all queryable figures live in the materialized
//! metric tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registrant tracked by the engine. Immutable once created apart from
/// administrative metadata corrections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
  pub company_id:    Uuid,
  /// Exchange ticker symbol, e.g. `"ACME"`. Unique per exchange.
  pub ticker:        String,
  pub exchange:      String,
  /// The stable regulator-issued registrant identifier (e.g. a CIK).
  pub registrant_id: String,
  pub created_at:    DateTime<Utc>,
}

/// Input to [`crate::store::MetricStore::add_company`].
/// `company_id` and `created_at` are always assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCompany {
  pub ticker:        String,
  pub exchange:      String,
  pub registrant_id: String,
}
