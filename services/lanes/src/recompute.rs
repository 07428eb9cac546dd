//! Best-effort date-range maintenance.
//!
//! Every event mutation that can change a lane's date range (create, a date
//! update, soft delete) triggers a recompute of the cached bounds. The
//! recompute runs after the triggering write has committed and never blocks
//! or fails it: [`Recomputer::trigger`] spawns a detached task with a small
//! bounded retry policy, and an abandoned recompute only leaves the display
//! range stale until the next trigger.

use crate::config::RecomputeConfig;
use crate::date_range::compute_date_range;
use crate::store::{LaneStore, StoreError};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Recompute a lane's cached date range from its live events.
///
/// Reads the event dates, derives the `[min, max]` bounds (null for an empty
/// set), and persists them onto the lane. Idempotent: repeated calls without
/// intervening event mutations write the same bounds.
pub async fn recompute_date_range(
    store: &LaneStore,
    lane_id: Uuid,
) -> Result<Option<(NaiveDate, NaiveDate)>, StoreError> {
    let dates = store.event_dates(lane_id).await?;
    let range = compute_date_range(&dates);
    store.write_date_range(lane_id, range).await?;
    Ok(range)
}

/// Spawns fire-and-forget recompute tasks for lane date ranges
#[derive(Clone)]
pub struct Recomputer {
    store: Arc<LaneStore>,
    config: RecomputeConfig,
}

impl Recomputer {
    pub fn new(store: Arc<LaneStore>, config: RecomputeConfig) -> Self {
        Self { store, config }
    }

    /// Queue a recompute for the given lane.
    ///
    /// Returns immediately; failures are retried up to the configured
    /// attempt count with linear backoff, then logged and counted. They are
    /// never surfaced to the caller of the triggering mutation.
    pub fn trigger(&self, lane_id: Uuid) {
        let store = self.store.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            let mut attempt = 0u32;
            loop {
                attempt += 1;
                match recompute_date_range(&store, lane_id).await {
                    Ok(range) => {
                        debug!(lane_id = %lane_id, range = ?range, "Date range recomputed");
                        metrics::counter!("lanes.recompute.completed").increment(1);
                        return;
                    }
                    Err(StoreError::NotFound(_)) => {
                        // The lane was deleted between the trigger and the
                        // recompute; there is nothing left to refresh.
                        debug!(lane_id = %lane_id, "Lane gone before recompute");
                        return;
                    }
                    Err(e) if attempt < config.max_attempts => {
                        warn!(
                            lane_id = %lane_id,
                            attempt = attempt,
                            error = %e,
                            "Date range recompute failed, retrying"
                        );
                        tokio::time::sleep(config.retry_backoff() * attempt).await;
                    }
                    Err(e) => {
                        error!(
                            lane_id = %lane_id,
                            attempts = attempt,
                            error = %e,
                            "Date range recompute abandoned"
                        );
                        metrics::counter!("lanes.recompute.failed").increment(1);
                        return;
                    }
                }
            }
        });
    }
}
