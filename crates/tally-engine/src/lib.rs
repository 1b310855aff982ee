//! The Tally derivation and materialization engine.
//!
//! Sits between the fact ledger and the queryable metric tables:
//! ingestion normalizes, classifies, and records incoming filings and emits
//! invalidation events; the refresh queue consumes those events and
//! rematerializes exactly the affected `(company, fiscal year, concept)`
//! groups from a committed snapshot of winning facts.

pub mod derive;
pub mod error;
pub mod ingest;
pub mod materialize;
pub mod queue;

#[cfg(test)]
mod tests;

pub use error::{Error, Result};
pub use ingest::{IngestReport, Ingestor};
pub use queue::RefreshQueue;
