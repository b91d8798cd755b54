//! Delivery of committed job ids from the outbox to their queues.
//!
//! Submissions push the job id right after commit. Anything that push
//! misses stays in the outbox and is retried by [`run_relay`], so a job row
//! never sits at `pending` without a queue entry.

use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::{Store, StoreError};
use crate::services::queue::{JobQueue, QueueError};

/// Outbox rows relayed per pass.
const RELAY_BATCH: i64 = 100;

/// Push a committed job id onto its queue and clear its outbox entry.
pub async fn deliver(
    store: &dyn Store,
    queue: &dyn JobQueue,
    job_id: Uuid,
    queue_name: &str,
) -> Result<(), DispatchError> {
    queue.push(queue_name, job_id).await?;
    metrics::counter!("jobs_dispatched_total", "queue" => queue_name.to_string()).increment(1);
    store.complete_dispatch(job_id).await?;
    Ok(())
}

/// Deliver right after commit. A failure is logged rather than returned:
/// the outbox entry stays and the relay retries it.
pub async fn deliver_or_defer(state: &AppState, job_id: Uuid, queue_name: &str) {
    if let Err(e) = deliver(state.store.as_ref(), state.queue.as_ref(), job_id, queue_name).await {
        metrics::counter!("job_dispatch_failures_total").increment(1);
        tracing::warn!(job_id = %job_id, error = %e, "Deferred job delivery to outbox relay");
    }
}

/// Deliver outbox entries older than `min_age`. Returns how many were pushed.
///
/// Younger entries are left alone: their submission request is still
/// delivering them.
pub async fn relay_once(
    store: &dyn Store,
    queue: &dyn JobQueue,
    min_age: Duration,
) -> Result<usize, DispatchError> {
    let cutoff = Utc::now()
        - chrono::Duration::from_std(min_age).unwrap_or_else(|_| chrono::Duration::zero());
    let pending = store.pending_dispatches(cutoff, RELAY_BATCH).await?;

    let mut delivered = 0;
    for dispatch in pending {
        match deliver(store, queue, dispatch.job_id, &dispatch.queue).await {
            Ok(()) => {
                delivered += 1;
                tracing::info!(
                    job_id = %dispatch.job_id,
                    queue = %dispatch.queue,
                    "Relayed job from outbox"
                );
            }
            Err(DispatchError::Queue(e)) => {
                // Queue is down; the rest of the batch would fail the same way.
                metrics::counter!("job_dispatch_failures_total").increment(1);
                tracing::warn!(job_id = %dispatch.job_id, error = %e, "Outbox relay push failed");
                break;
            }
            Err(e) => return Err(e),
        }
    }

    if let Ok(depth) = store.outbox_depth().await {
        metrics::gauge!("job_outbox_depth").set(depth as f64);
    }

    Ok(delivered)
}

/// Relay the outbox every `interval` until `shutdown` flips to `true`.
pub async fn run_relay(state: AppState, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    tracing::info!(interval_secs = interval.as_secs(), "Outbox relay started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match relay_once(state.store.as_ref(), state.queue.as_ref(), interval).await {
                    Ok(0) => tracing::trace!("Outbox empty"),
                    Ok(n) => tracing::debug!(delivered = n, "Outbox relay pass complete"),
                    Err(e) => tracing::error!(error = %e, "Outbox relay pass failed"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("Outbox relay stopped");
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
