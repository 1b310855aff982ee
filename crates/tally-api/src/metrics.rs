//! Handlers for `/metrics` endpoints — read-only accessors over the
//! materialized tables.
//!
//! Every row carries its `derived` flag so consumers can distinguish
//! reported from inferred figures. Nothing provisional is ever served:
//! these handlers read the metric tables and only the metric tables.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET` | `/metrics/quarterly` | `?company_id` + `fiscal_year` and/or `concept` |
//! | `GET` | `/metrics/yearly` | `?company_id&fiscal_year` |
//! | `GET` | `/metrics/latest` | `?company_id` — newest quarter's rows |

use axum::{
  Json,
  extract::{Query, State},
};
use serde::Deserialize;
use tally_core::{
  metric::{QuarterlyMetric, YearlyMetric},
  store::MetricStore,
};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

// ─── Quarterly ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct QuarterlyParams {
  pub company_id:  Uuid,
  pub fiscal_year: Option<i32>,
  pub concept:     Option<String>,
}

/// `GET /metrics/quarterly?company_id=<id>&fiscal_year=2023` or
/// `GET /metrics/quarterly?company_id=<id>&concept=revenue`
pub async fn quarterly<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<QuarterlyParams>,
) -> Result<Json<Vec<QuarterlyMetric>>, ApiError>
where
  S: MetricStore,
{
  let mut rows = match (params.fiscal_year, params.concept.as_deref()) {
    (Some(fiscal_year), _) => state
      .store
      .quarterly_by_company_and_year(params.company_id, fiscal_year)
      .await
      .map_err(|e| ApiError::Store(Box::new(e)))?,
    (None, Some(concept)) => state
      .store
      .quarterly_by_company_and_concept(params.company_id, concept)
      .await
      .map_err(|e| ApiError::Store(Box::new(e)))?,
    (None, None) => {
      return Err(ApiError::BadRequest(
        "fiscal_year or concept is required".into(),
      ));
    }
  };

  // Both filters at once: narrow the year's rows by concept.
  if params.fiscal_year.is_some() {
    if let Some(concept) = &params.concept {
      rows.retain(|r| &r.concept == concept);
    }
  }

  Ok(Json(rows))
}

// ─── Yearly ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct YearlyParams {
  pub company_id:  Uuid,
  pub fiscal_year: i32,
}

/// `GET /metrics/yearly?company_id=<id>&fiscal_year=2023`
pub async fn yearly<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<YearlyParams>,
) -> Result<Json<Vec<YearlyMetric>>, ApiError>
where
  S: MetricStore,
{
  let rows = state
    .store
    .yearly_by_company_and_year(params.company_id, params.fiscal_year)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(rows))
}

// ─── Latest ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LatestParams {
  pub company_id: Uuid,
}

/// `GET /metrics/latest?company_id=<id>`
pub async fn latest<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<LatestParams>,
) -> Result<Json<Vec<QuarterlyMetric>>, ApiError>
where
  S: MetricStore,
{
  let rows = state
    .store
    .latest_quarterly(params.company_id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(rows))
}
