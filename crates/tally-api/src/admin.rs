//! Handlers for `/admin` endpoints — alias management and forced
//! recomputation.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/admin/aliases` | Body: [`ConceptAlias`]; 409 on classification conflict |
//! | `POST` | `/admin/refresh` | Body: [`RefreshBody`]; 202 + queued group count |

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tally_core::{concept::ConceptAlias, store::MetricStore};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

// ─── Aliases ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct AliasResponse {
  /// The alias table version after the insert.
  pub version: u64,
}

/// `POST /admin/aliases` — register a raw-tag mapping. Facts already in
/// the ledger pick it up on the next refresh.
pub async fn add_alias<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<ConceptAlias>,
) -> Result<impl IntoResponse, ApiError>
where
  S: MetricStore,
{
  let version = state.ingestor.add_alias(body).await?;
  Ok((StatusCode::CREATED, Json(AliasResponse { version })))
}

// ─── Refresh ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RefreshBody {
  pub company_id:  Uuid,
  /// Narrow the recomputation to one fiscal year; omit for the whole
  /// company (bulk backfill, alias-table changes).
  pub fiscal_year: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
  pub groups_queued: usize,
}

/// `POST /admin/refresh` — enqueue recomputation; returns 202 immediately,
/// the work happens on the refresh workers.
pub async fn refresh<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<RefreshBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: MetricStore,
{
  let groups_queued = state
    .ingestor
    .refresh_company(body.company_id, body.fiscal_year)
    .await?;
  Ok((
    StatusCode::ACCEPTED,
    Json(RefreshResponse { groups_queued }),
  ))
}
