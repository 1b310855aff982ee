//! Error type for `tally-store-sqlite`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] tally_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date parse error: {0}")]
  DateParse(String),

  #[error("decimal parse error: {0}")]
  DecimalParse(String),

  #[error("company not found: {0}")]
  CompanyNotFound(Uuid),

  #[error("accession number {accession:?} already recorded for company {company_id}")]
  DuplicateAccession { company_id: Uuid, accession: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
