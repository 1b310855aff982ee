//! Handlers for `/filings` endpoints — the inbound edge for the
//! filing-acquisition collaborator.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/filings` | Body: [`IngestBody`]; returns 201 + ingest report |
//! | `GET`  | `/filings/{id}/facts` | Raw audit ledger, superseded facts included |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tally_core::{
  fact::{FinancialFact, RawFact},
  filing::{Filing, FilingMeta},
  store::MetricStore,
};
use tally_engine::IngestReport;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

// ─── Ingest ──────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /filings`: one filing's metadata plus its
/// raw fact tuples. Batches arrive in no guaranteed order — filings for
/// earlier periods may come in after later ones.
#[derive(Debug, Deserialize)]
pub struct IngestBody {
  pub meta:  FilingMeta,
  pub facts: Vec<RawFact>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
  pub filing: Filing,
  pub report: IngestReport,
}

/// `POST /filings` — normalize, classify, record, and enqueue refreshes.
pub async fn ingest<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<IngestBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: MetricStore,
{
  let (filing, report) = state.ingestor.ingest(body.meta, body.facts).await?;
  Ok((StatusCode::CREATED, Json(IngestResponse { filing, report })))
}

// ─── Audit ───────────────────────────────────────────────────────────────────

/// `GET /filings/{id}/facts` — every fact the filing reported, exactly as
/// recorded, whether or not a later filing superseded it.
pub async fn facts<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<FinancialFact>>, ApiError>
where
  S: MetricStore,
{
  state
    .store
    .get_filing(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("filing {id} not found")))?;

  let facts = state
    .store
    .facts_for_filing(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(facts))
}
