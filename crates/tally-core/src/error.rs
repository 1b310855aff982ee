//! Error types for `tally-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("company not found: {0}")]
  CompanyNotFound(Uuid),

  #[error("filing not found: {0}")]
  FilingNotFound(Uuid),

  #[error("accession number {accession:?} already recorded for company {company_id}")]
  DuplicateAccession { company_id: Uuid, accession: String },

  #[error(
    "alias for {raw_tag:?} classifies {canonical:?} as {proposed} but it is already {existing}"
  )]
  AliasConflict {
    raw_tag:   String,
    canonical: String,
    existing:  crate::concept::ConceptKind,
    proposed:  crate::concept::ConceptKind,
  },

  #[error("alias for {0:?} must classify its concept as flow or stock")]
  UnclassifiedAlias(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
