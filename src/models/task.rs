//! Task record persisted by the `TaskStore` and driven by the `WorkerPool`
//! state machine. Field names and shapes here are load-bearing: they are the
//! bit-exact JSON layout written to and read from the KV (see
//! `TaskStore`), not just an internal convenience type.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    UserInitiatedPlaylistTransfer,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::UserInitiatedPlaylistTransfer => "USER_INITIATED_PLAYLIST_TRANSFER",
        }
    }
}

/// `QUEUED -> RUNNING -> {FINISHED, FAILED, CANCELED}`, with `ON_HOLD` as a
/// transient state for backoff and graceful shutdown.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Queued,
    Running,
    OnHold,
    Finished,
    Failed,
    Canceled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Failed | TaskState::Canceled)
    }

    /// Whether `self -> next` is a legal state-machine edge (§4.7). Terminal
    /// states never move again; `ON_HOLD` can only resume to `RUNNING`.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (Queued, Running) => true,
            (Running, Finished | Failed | Canceled | OnHold) => true,
            (OnHold, Running | Canceled | Failed) => true,
            (s, n) if *s == n => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskProgress {
    pub track: Option<serde_json::Value>,
    pub handled: usize,
    pub in_queue: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: Uuid,
    pub kind: TaskKind,
    pub user_id: String,
    pub status: TaskState,
    pub status_reason: Option<String>,
    pub arguments: serde_json::Value,
    #[serde(default)]
    pub progress: TaskProgress,
    pub result: Option<serde_json::Value>,
    /// Unix seconds, matching the wire format used throughout §6.
    pub queued_at: Option<i64>,
    pub started_at: Option<i64>,
    pub done_at: Option<i64>,
    pub last_heartbeat: Option<i64>,
    pub worker_id: Option<String>,
}

impl TaskRecord {
    pub fn new(kind: TaskKind, user_id: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            kind,
            user_id: user_id.into(),
            status: TaskState::Queued,
            status_reason: None,
            arguments,
            progress: TaskProgress::default(),
            result: None,
            queued_at: Some(now_unix()),
            started_at: None,
            done_at: None,
            last_heartbeat: None,
            worker_id: None,
        }
    }

    /// Redis key this record lives under: `user_tasks:{kind}:{user_id}:{task_id}`.
    pub fn key(&self) -> String {
        task_key(self.kind, &self.user_id, self.task_id)
    }

    /// Moves to `next`, refusing transitions the state machine forbids.
    /// Returns `false` (and leaves `self` untouched) on an illegal edge.
    pub fn transition(&mut self, next: TaskState, reason: Option<&str>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        let now = now_unix();
        if next == TaskState::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.done_at = Some(now);
        }
        self.status = next;
        self.status_reason = reason.map(|s| s.to_string());
        true
    }
}

pub fn task_key(kind: TaskKind, user_id: &str, task_id: Uuid) -> String {
    format!("user_tasks:{}:{}:{}", kind.as_str(), user_id, task_id)
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Parameters for a playlist-transfer task, the sole `TaskKind` implemented
/// by this runtime. Stored verbatim as `TaskRecord::arguments`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistTransferArguments {
    pub from_provider: String,
    pub to_provider: String,
    pub from_playlist: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaylistTransferResult {
    pub destination_playlist_id: Option<String>,
    pub tracks_total: usize,
    pub tracks_matched: usize,
    pub tracks_unmatched: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_starts_queued_with_queued_at_set() {
        let rec = TaskRecord::new(
            TaskKind::UserInitiatedPlaylistTransfer,
            "user-1",
            serde_json::json!({}),
        );
        assert_eq!(rec.status, TaskState::Queued);
        assert!(rec.queued_at.is_some());
        assert!(rec.started_at.is_none());
    }

    #[test]
    fn key_matches_bit_exact_schema() {
        let rec = TaskRecord::new(
            TaskKind::UserInitiatedPlaylistTransfer,
            "user-1",
            serde_json::json!({}),
        );
        assert_eq!(
            rec.key(),
            format!(
                "user_tasks:USER_INITIATED_PLAYLIST_TRANSFER:user-1:{}",
                rec.task_id
            )
        );
    }

    #[test]
    fn terminal_to_non_terminal_transition_forbidden() {
        let mut rec = TaskRecord::new(
            TaskKind::UserInitiatedPlaylistTransfer,
            "user-1",
            serde_json::json!({}),
        );
        assert!(rec.transition(TaskState::Running, None));
        assert!(rec.transition(TaskState::Finished, None));
        assert!(!rec.transition(TaskState::Running, None));
        assert_eq!(rec.status, TaskState::Finished);
    }

    #[test]
    fn on_hold_resumes_to_running() {
        let mut rec = TaskRecord::new(
            TaskKind::UserInitiatedPlaylistTransfer,
            "user-1",
            serde_json::json!({}),
        );
        rec.transition(TaskState::Running, None);
        assert!(rec.transition(TaskState::OnHold, Some("pausing to avoid a rate limit")));
        assert!(rec.transition(TaskState::Running, None));
        assert_eq!(rec.status, TaskState::Running);
    }
}
