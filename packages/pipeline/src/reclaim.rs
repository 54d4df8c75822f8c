//! Stuck-job recovery.
//!
//! A lead left in `started` past its stage's timeout belongs to a crashed
//! or lost worker. Runs before every claim cycle so stale work re-enters
//! the pool before new claims are issued.

use anyhow::Result;
use chrono::Duration;
use tracing::warn;

use crate::config::StageDescriptor;
use crate::store::LeadStore;

/// Recover leads stuck in `started` for this stage.
///
/// Budget-exhausted rows are terminally failed, the rest are requeued
/// with an incremented retry count. The `status = 'started' AND
/// started_at < threshold` predicate on both conditional updates is the
/// race guard against a completion resolving concurrently: losing that
/// race is harmless and surfaces later as a dropped duplicate result.
pub async fn reclaim(store: &dyn LeadStore, descriptor: &StageDescriptor) -> Result<u64> {
    let older_than = Duration::milliseconds(descriptor.stuck_timeout.as_millis() as i64);

    let failed = store
        .fail_stuck(descriptor.stage, older_than, descriptor.max_retries)
        .await?;
    let requeued = store
        .requeue_stuck(descriptor.stage, older_than, descriptor.max_retries)
        .await?;

    if failed > 0 || requeued > 0 {
        warn!(
            stage = %descriptor.stage,
            failed,
            requeued,
            "reclaimed stuck leads"
        );
    }

    Ok(failed + requeued)
}
