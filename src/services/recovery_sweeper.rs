//! `RecoverySweeper` — a conservative startup-only sweep that fails stale
//! `RUNNING` records left behind by a worker that died without a graceful
//! shutdown. Grounded in the teacher's `cleanup_jobs` `SCAN`-cursor idiom;
//! unlike that routine this never re-enqueues, matching §4.9's "a failed
//! report is preferable to a double execution" design note.

use std::time::Duration;

use chrono::Utc;

use crate::error::Result;
use crate::models::task::TaskState;
use crate::services::task_store::TaskStore;

#[cfg(test)]
const DEFAULT_STALE_THRESHOLD_SECS: i64 = 120;

pub struct RecoverySweeper<'a> {
    store: &'a TaskStore,
    stale_threshold: Duration,
}

impl<'a> RecoverySweeper<'a> {
    pub fn new(store: &'a TaskStore, stale_threshold: Duration) -> Self {
        Self { store, stale_threshold }
    }

    /// Scans every task key, fails any `RUNNING` record whose heartbeat (or,
    /// absent that, `started_at`) is older than `stale_threshold`, and logs a
    /// summary.
    pub async fn sweep(&self) -> Result<usize> {
        let now = Utc::now().timestamp();
        let threshold = self.stale_threshold.as_secs() as i64;
        let mut failed = 0usize;

        for record in self.store.scan_all().await? {
            if record.status != TaskState::Running {
                continue;
            }

            let is_stale = match record.last_heartbeat {
                Some(hb) => now - hb > threshold,
                None => record
                    .started_at
                    .map(|started| now - started > threshold)
                    .unwrap_or(false),
            };
            if !is_stale {
                continue;
            }

            let mut record = record;
            if record.transition(TaskState::Failed, Some("worker died unexpectedly")) {
                self.store.save(&record).await?;
                failed += 1;
            }
        }

        crate::metrics::recovery_sweep_failed(failed as u64);
        tracing::info!(failed, "recovery sweep complete");
        Ok(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::{TaskKind, TaskRecord};

    fn stale_running_record() -> TaskRecord {
        let mut rec = TaskRecord::new(TaskKind::UserInitiatedPlaylistTransfer, "user-1", serde_json::json!({}));
        rec.transition(TaskState::Running, None);
        rec.last_heartbeat = Some(Utc::now().timestamp() - 200);
        rec
    }

    #[test]
    fn stale_running_record_is_detected_by_heartbeat_age() {
        let rec = stale_running_record();
        let now = Utc::now().timestamp();
        assert!(rec.last_heartbeat.map(|hb| now - hb > DEFAULT_STALE_THRESHOLD_SECS).unwrap());
    }

    #[test]
    fn fresh_heartbeat_is_not_stale() {
        let mut rec = stale_running_record();
        rec.last_heartbeat = Some(Utc::now().timestamp());
        let now = Utc::now().timestamp();
        assert!(!rec.last_heartbeat.map(|hb| now - hb > DEFAULT_STALE_THRESHOLD_SECS).unwrap());
    }
}
