//! Refresh queue — the explicit invalidation-event abstraction between
//! ingestion and materialization.
//!
//! Ingestion emits [`GroupKey`]s; a pool of workers consumes them. The
//! queue guarantees:
//!
//! - enqueueing never blocks, so ingestion latency is independent of
//!   materialization cost;
//! - at most one refresh runs per key at a time (refreshes for one key are
//!   serialized; disjoint keys proceed fully in parallel);
//! - keys invalidated again while queued are coalesced into the pending
//!   run, and keys invalidated while *running* trigger a re-run from
//!   fresher data once the in-flight refresh finishes — the losing refresh
//!   is simply repeated, never applied as a torn write.

use std::{collections::HashMap, sync::Arc};

use tokio::{
  sync::{Mutex, Notify, RwLock, mpsc},
  task::JoinHandle,
};
use tracing::{debug, warn};

use tally_core::{
  concept::AliasTable, metric::GroupKey, store::MetricStore,
};

use crate::materialize;

// ─── Internal state ──────────────────────────────────────────────────────────

struct Shared {
  /// Key → queued generation. Present while a key is queued or mid-refresh;
  /// the generation is bumped on every enqueue, and a worker that finishes
  /// a refresh and finds a newer generation re-runs before retiring the
  /// key. Exactly one channel message exists per entry lifetime.
  pending: Mutex<HashMap<GroupKey, u64>>,
  /// Signalled whenever the pending map empties — the `drain` wake-up.
  idle:    Notify,
}

// ─── RefreshQueue ────────────────────────────────────────────────────────────

/// Handle to the worker pool. Cloning is cheap; all clones feed the same
/// queue.
#[derive(Clone)]
pub struct RefreshQueue {
  shared:  Arc<Shared>,
  tx:      mpsc::UnboundedSender<GroupKey>,
  workers: Arc<Vec<JoinHandle<()>>>,
}

impl RefreshQueue {
  /// Spawn `workers` refresh workers against `store`, normalizing with
  /// whatever `aliases` holds at the moment each refresh runs.
  pub fn spawn<S>(
    store: Arc<S>,
    aliases: Arc<RwLock<AliasTable>>,
    workers: usize,
  ) -> Self
  where
    S: MetricStore + 'static,
  {
    let shared = Arc::new(Shared {
      pending: Mutex::new(HashMap::new()),
      idle:    Notify::new(),
    });
    let (tx, rx) = mpsc::unbounded_channel::<GroupKey>();
    let rx = Arc::new(Mutex::new(rx));

    let handles = (0..workers.max(1))
      .map(|worker_id| {
        let shared = Arc::clone(&shared);
        let store = Arc::clone(&store);
        let aliases = Arc::clone(&aliases);
        let rx = Arc::clone(&rx);
        tokio::spawn(async move {
          worker_loop(worker_id, shared, store, aliases, rx).await;
        })
      })
      .collect();

    Self { shared, tx, workers: Arc::new(handles) }
  }

  /// Request a refresh for `key`. Never blocks; repeated requests for a
  /// key that is already queued or running are coalesced.
  pub async fn enqueue(&self, key: GroupKey) {
    let mut pending = self.shared.pending.lock().await;
    match pending.get_mut(&key) {
      None => {
        pending.insert(key.clone(), 1);
        drop(pending);
        debug!(key = %key, "refresh queued");
        // Send failure means the workers are gone (shutdown); the key
        // stays pending and is picked up if the pool is respawned.
        let _ = self.tx.send(key);
      }
      Some(generation) => {
        *generation += 1;
        debug!(key = %key, generation = *generation, "refresh coalesced");
      }
    }
  }

  pub async fn enqueue_all(&self, keys: impl IntoIterator<Item = GroupKey>) {
    for key in keys {
      self.enqueue(key).await;
    }
  }

  /// Number of keys queued or mid-refresh.
  pub async fn pending(&self) -> usize {
    self.shared.pending.lock().await.len()
  }

  /// Wait until every queued and in-flight refresh has completed.
  pub async fn drain(&self) {
    loop {
      let notified = self.shared.idle.notified();
      if self.shared.pending.lock().await.is_empty() {
        return;
      }
      notified.await;
    }
  }

  /// Stop accepting work and wait for the workers to finish what is
  /// already queued. A no-op for secondary clones — only the last handle
  /// can actually join the pool.
  pub async fn shutdown(self) {
    let Self { shared: _, tx, workers } = self;
    drop(tx);
    if let Ok(handles) = Arc::try_unwrap(workers) {
      for handle in handles {
        let _ = handle.await;
      }
    }
  }
}

// ─── Worker ──────────────────────────────────────────────────────────────────

async fn worker_loop<S>(
  worker_id: usize,
  shared: Arc<Shared>,
  store: Arc<S>,
  aliases: Arc<RwLock<AliasTable>>,
  rx: Arc<Mutex<mpsc::UnboundedReceiver<GroupKey>>>,
) where
  S: MetricStore + 'static,
{
  loop {
    // Hold the receiver lock only while waiting for the next key so other
    // workers can pull in parallel.
    let key = { rx.lock().await.recv().await };
    let Some(key) = key else { break };

    let mut generation = {
      let pending = shared.pending.lock().await;
      let Some(&generation) = pending.get(&key) else {
        continue;
      };
      generation
    };

    loop {
      // Snapshot the table so the read lock is not held across the whole
      // refresh.
      let table = aliases.read().await.clone();
      match materialize::refresh_group(store.as_ref(), &table, &key).await {
        Ok(outcome) => debug!(
          worker_id,
          key = %key,
          rows = outcome.quarterly_rows,
          "refresh applied"
        ),
        Err(e) => warn!(worker_id, key = %key, error = %e, "refresh failed"),
      }

      let mut pending = shared.pending.lock().await;
      match pending.get(&key) {
        // Invalidated again while we were refreshing: our snapshot may be
        // stale, so run again from fresher data.
        Some(&newer) if newer > generation => {
          generation = newer;
          debug!(key = %key, "refresh superseded mid-flight; re-running");
        }
        _ => {
          pending.remove(&key);
          if pending.is_empty() {
            shared.idle.notify_waiters();
          }
          break;
        }
      }
    }
  }
}
