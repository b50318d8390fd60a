//! Refresh scheduling: decide which collections are due, fan out fetches,
//! and reconcile results.
//!
//! Fetches for independent collections run concurrently with a bounded pool;
//! reconciliation for one collection never interleaves with a concurrent
//! refresh of the same collection (single-flight per collection id).

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::stream::{self, StreamExt};

use crate::config::Config;
use crate::feed::{fetch_feed, FetchError};
use crate::storage::{Collection, Database};

/// A collection is due when it tracks a feed AND its per-collection refresh
/// interval has elapsed since the last successful update (or it never had one).
pub fn is_due(collection: &Collection, now: i64) -> bool {
    if collection.url.is_none() {
        return false;
    }
    match collection.date_updated {
        None => true,
        Some(updated) => updated + collection.refresh_interval * 60 <= now,
    }
}

/// One failed unit within a batch.
#[derive(Debug)]
pub struct RefreshFailure {
    pub collection_id: i64,
    pub error: FetchError,
}

/// Result of a refresh batch.
///
/// Success is per-collection durable, failure reporting is batch-level: a
/// collection that refreshed keeps its new `date_updated` even when
/// [`RefreshOutcome::all_succeeded`] is false because a sibling failed.
#[derive(Debug, Default)]
pub struct RefreshOutcome {
    /// Collections whose fetch and reconciliation completed.
    pub refreshed: Vec<i64>,
    /// Collections whose fetch or reconciliation failed.
    pub failed: Vec<RefreshFailure>,
    /// Collections skipped because a refresh was already in flight.
    pub skipped: Vec<i64>,
    /// Newly inserted items across the batch.
    pub new_items: usize,
}

impl RefreshOutcome {
    /// The whole batch counts as failed if any unit failed.
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

// ============================================================================
// Single-flight
// ============================================================================

/// Process-wide set of collection ids with a refresh in progress. Re-invoking
/// refresh while one is in flight for the same collection skips that unit
/// instead of double-applying reconciliation.
#[derive(Clone, Default)]
pub struct InFlight {
    ids: Arc<Mutex<HashSet<i64>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<i64>> {
        match self.ids.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Claim `id`, or `None` if a refresh for it is already running.
    fn try_begin(&self, id: i64) -> Option<InFlightGuard> {
        if self.lock().insert(id) {
            Some(InFlightGuard {
                ids: Arc::clone(&self.ids),
                id,
            })
        } else {
            None
        }
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: i64) -> bool {
        self.lock().contains(&id)
    }
}

struct InFlightGuard {
    ids: Arc<Mutex<HashSet<i64>>>,
    id: i64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut ids = match self.ids.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        ids.remove(&self.id);
    }
}

// ============================================================================
// Batch refresh
// ============================================================================

enum UnitOutcome {
    Refreshed { id: i64, new_items: usize },
    Failed { id: i64, error: FetchError },
    Skipped { id: i64 },
}

/// Refreshes every target collection that has a url, concurrently.
///
/// Per target: fetch → on success, reconcile items and stamp
/// `date_updated = now`; on failure, the collection keeps its previous
/// `date_updated` and the failure is recorded without aborting siblings.
pub async fn refresh_collections(
    db: &Database,
    client: &reqwest::Client,
    config: &Config,
    in_flight: &InFlight,
    targets: Vec<Collection>,
) -> RefreshOutcome {
    let units: Vec<UnitOutcome> = stream::iter(
        targets
            .into_iter()
            .filter(|c| c.url.is_some())
            .map(|collection| {
                let db = db.clone();
                let client = client.clone();
                let in_flight = in_flight.clone();
                let timeout = config.fetch_timeout();
                let size_limit = config.max_feed_size_bytes;

                async move {
                    let id = collection.id;
                    let Some(guard) = in_flight.try_begin(id) else {
                        tracing::debug!(collection_id = id, "refresh already in flight, skipping");
                        return UnitOutcome::Skipped { id };
                    };
                    let _guard = guard;

                    let url = collection.url.as_deref().unwrap_or_default();
                    match fetch_feed(&client, url, timeout, size_limit).await {
                        Ok(parsed) => {
                            let now = chrono::Utc::now().timestamp();
                            match db.complete_refresh(id, &parsed.items, now).await {
                                Ok(new_items) => {
                                    tracing::debug!(
                                        collection_id = id,
                                        new_items = new_items,
                                        "collection refreshed"
                                    );
                                    UnitOutcome::Refreshed { id, new_items }
                                }
                                Err(e) => {
                                    tracing::warn!(
                                        collection_id = id,
                                        error = %e,
                                        "reconciliation failed"
                                    );
                                    UnitOutcome::Failed {
                                        id,
                                        error: FetchError::Storage(e.to_string()),
                                    }
                                }
                            }
                        }
                        Err(error) => {
                            tracing::warn!(collection_id = id, error = %error, "feed fetch failed");
                            UnitOutcome::Failed { id, error }
                        }
                    }
                }
            }),
    )
    .buffer_unordered(config.max_concurrent_fetches.max(1))
    .collect()
    .await;

    let mut outcome = RefreshOutcome::default();
    for unit in units {
        match unit {
            UnitOutcome::Refreshed { id, new_items } => {
                outcome.refreshed.push(id);
                outcome.new_items += new_items;
            }
            UnitOutcome::Failed { id, error } => {
                outcome.failed.push(RefreshFailure {
                    collection_id: id,
                    error,
                });
            }
            UnitOutcome::Skipped { id } => outcome.skipped.push(id),
        }
    }
    outcome
}
