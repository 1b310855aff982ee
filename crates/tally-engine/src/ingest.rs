//! Ingestion pipeline — from raw filing batches to invalidation events.
//!
//! One call to [`Ingestor::ingest`] is the atomic unit the concurrency
//! model relies on: normalize and classify every raw fact, record the
//! filing and its facts in a single store transaction, then enqueue the
//! affected groups. A failure in one filing never affects another; per-fact
//! problems (unmapped tags, ambiguous periods) are recorded, counted, and
//! traced, never fatal.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use tally_core::{
  concept::{AliasTable, ConceptAlias, ConceptKind},
  fact::{NewFact, RawFact},
  filing::{Filing, FilingMeta},
  period,
  store::MetricStore,
};

use crate::{Result, error::Error, materialize, queue::RefreshQueue};

// ─── IngestReport ────────────────────────────────────────────────────────────

/// What one filing's ingestion did — returned to the caller and logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
  pub filing_id:      Uuid,
  pub facts_recorded: usize,
  /// Facts stored under their raw tag because no alias matched.
  pub unmapped:       usize,
  /// Facts stored without a fiscal span because no tolerance band fit.
  pub ambiguous:      usize,
  /// Group refreshes enqueued by this filing.
  pub groups_queued:  usize,
}

// ─── Ingestor ────────────────────────────────────────────────────────────────

/// Front door of the engine: owns the alias table, feeds the store, and
/// emits invalidation events to the refresh queue.
pub struct Ingestor<S> {
  store:   Arc<S>,
  aliases: Arc<RwLock<AliasTable>>,
  queue:   RefreshQueue,
}

impl<S: MetricStore> Ingestor<S> {
  pub fn new(
    store: Arc<S>,
    aliases: Arc<RwLock<AliasTable>>,
    queue: RefreshQueue,
  ) -> Self {
    Self { store, aliases, queue }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn queue(&self) -> &RefreshQueue { &self.queue }

  /// Ingest one filing batch: normalize, classify, record atomically, and
  /// enqueue the affected groups.
  pub async fn ingest(
    &self,
    meta: FilingMeta,
    raw_facts: Vec<RawFact>,
  ) -> Result<(Filing, IngestReport)> {
    let mut unmapped = 0usize;
    let mut ambiguous = 0usize;

    let facts: Vec<NewFact> = {
      let aliases = self.aliases.read().await;
      raw_facts
        .into_iter()
        .map(|raw| {
          let normalized =
            aliases.normalize(&raw.raw_tag, raw.statement.as_deref());
          let (concept, kind) = match normalized {
            Some((canonical, kind)) => (Some(canonical.to_owned()), kind),
            None => {
              unmapped += 1;
              (None, ConceptKind::Unknown)
            }
          };

          let span = period::classify(raw.period, meta.fiscal_year_end);
          if span.is_none() {
            ambiguous += 1;
            debug!(
              raw_tag = %raw.raw_tag,
              period = ?raw.period,
              "period outside every tolerance band; stored unclassified"
            );
          }

          NewFact {
            raw_tag: raw.raw_tag,
            concept,
            kind,
            value: raw.value,
            unit: raw.unit,
            statement: raw.statement,
            period: raw.period,
            span,
          }
        })
        .collect()
    };

    let facts_recorded = facts.len();
    let (filing, keys) = self
      .store
      .record_filing(meta, facts)
      .await
      .map_err(Error::store)?;

    let groups_queued = keys.len();
    self.queue.enqueue_all(keys).await;

    let report = IngestReport {
      filing_id: filing.filing_id,
      facts_recorded,
      unmapped,
      ambiguous,
      groups_queued,
    };
    info!(
      filing_id = %report.filing_id,
      accession = %filing.accession_number,
      facts = report.facts_recorded,
      unmapped = report.unmapped,
      ambiguous = report.ambiguous,
      groups = report.groups_queued,
      "filing ingested"
    );
    Ok((filing, report))
  }

  /// Register an alias and return the new table version.
  ///
  /// Deliberately does not trigger recomputation: groups that gain a
  /// mapping are picked up lazily by the next [`Self::refresh_company`]
  /// (alias changes are batched, refreshes are explicit).
  pub async fn add_alias(&self, alias: ConceptAlias) -> Result<u64> {
    let mut aliases = self.aliases.write().await;
    let version = aliases.insert(alias)?;
    debug!(version, "alias table updated");
    Ok(version)
  }

  /// Enqueue a refresh for every group of a company, optionally narrowed
  /// to one fiscal year. Returns how many groups were queued.
  ///
  /// Groups are computed against the *current* alias table, so facts that
  /// were unmapped at ingestion and have since gained an alias are picked
  /// up here.
  pub async fn refresh_company(
    &self,
    company_id: Uuid,
    fiscal_year: Option<i32>,
  ) -> Result<usize> {
    let tags = self
      .store
      .ledger_tags_for_company(company_id)
      .await
      .map_err(Error::store)?;

    let keys: Vec<_> = {
      let aliases = self.aliases.read().await;
      materialize::keys_for_tags(company_id, &tags, &aliases)
        .into_iter()
        .filter(|k| fiscal_year.is_none_or(|fy| k.fiscal_year == fy))
        .collect()
    };

    let queued = keys.len();
    self.queue.enqueue_all(keys).await;
    Ok(queued)
  }
}
