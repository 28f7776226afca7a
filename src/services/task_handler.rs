//! `TaskHandler` — the per-`TaskKind` dispatch contract `WorkerPool` looks
//! up from its handler registry, mirroring the teacher's
//! `JobQueueService::register_handler`/`JobHandler` pair.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::task::TaskRecord;
use crate::services::task_store::TaskStore;

/// A handler owns the full lifecycle of one task once `WorkerPool` has
/// transitioned it to `RUNNING`: it is responsible for all further
/// transitions, including the terminal one, via `store`.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, store: &TaskStore, record: TaskRecord) -> Result<()>;
}
