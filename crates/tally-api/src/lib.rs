//! JSON REST API for Tally.
//!
//! Exposes an axum [`Router`] backed by any
//! [`tally_core::store::MetricStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility. Metric endpoints serve materialized
//! rows only — nothing provisional ever leaves this API.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", tally_api::api_router(state.clone()))
//! ```

pub mod admin;
pub mod companies;
pub mod error;
pub mod filings;
pub mod metrics;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use tally_core::store::MetricStore;
use tally_engine::Ingestor;

pub use error::ApiError;

// ─── State ───────────────────────────────────────────────────────────────────

/// Shared handler state: the store for reads, the ingestor for writes and
/// administrative operations.
pub struct AppState<S> {
  pub store:    Arc<S>,
  pub ingestor: Arc<Ingestor<S>>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      ingestor: Arc::clone(&self.ingestor),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router
/// regardless of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: MetricStore + 'static,
{
  Router::new()
    // Companies
    .route(
      "/companies",
      get(companies::list::<S>).post(companies::create::<S>),
    )
    .route("/companies/{id}", get(companies::get_one::<S>))
    // Filings
    .route("/filings", post(filings::ingest::<S>))
    .route("/filings/{id}/facts", get(filings::facts::<S>))
    // Metrics
    .route("/metrics/quarterly", get(metrics::quarterly::<S>))
    .route("/metrics/yearly", get(metrics::yearly::<S>))
    .route("/metrics/latest", get(metrics::latest::<S>))
    // Admin
    .route("/admin/aliases", post(admin::add_alias::<S>))
    .route("/admin/refresh", post(admin::refresh::<S>))
    .with_state(state)
}
