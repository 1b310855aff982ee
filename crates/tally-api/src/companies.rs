//! Handlers for `/companies` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/companies` | Optional `?ticker=` filter |
//! | `GET`  | `/companies/{id}` | Single company |
//! | `POST` | `/companies` | Body: [`NewCompany`]; returns 201 + company |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use tally_core::{
  company::{Company, NewCompany},
  store::MetricStore,
};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub ticker: Option<String>,
}

/// `GET /companies[?ticker=ACME]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Company>>, ApiError>
where
  S: MetricStore,
{
  let companies = match params.ticker.as_deref() {
    Some(ticker) => state
      .store
      .company_by_ticker(ticker)
      .await
      .map_err(|e| ApiError::Store(Box::new(e)))?
      .into_iter()
      .collect(),
    None => state
      .store
      .list_companies()
      .await
      .map_err(|e| ApiError::Store(Box::new(e)))?,
  };
  Ok(Json(companies))
}

/// `GET /companies/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Company>, ApiError>
where
  S: MetricStore,
{
  let company = state
    .store
    .get_company(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("company {id} not found")))?;
  Ok(Json(company))
}

/// `POST /companies` — returns 201 + the stored [`Company`].
pub async fn create<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<NewCompany>,
) -> Result<impl IntoResponse, ApiError>
where
  S: MetricStore,
{
  let company = state
    .store
    .add_company(body)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok((StatusCode::CREATED, Json(company)))
}
