//! `TaskStore` — durable task records plus the work queue, backed by Redis.
//! Grounded in the connection-pool/SCAN-cursor idioms of the job-queue
//! service this crate's teacher ships, but the queue shape here is a plain
//! blocking list (`RPUSH`/`BLPOP`) rather than that service's `ZADD`/`ZRANGE`
//! sorted set — the core's ordering guarantee is FIFO pickup, not priority,
//! so the simpler primitive is the right one and "BLPOP" gives workers a
//! cheap way to observe their own shutdown promptly (see `WorkerPool`).

use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;

use crate::error::{CoreError, Result};
use crate::models::task::{task_key, TaskKind, TaskRecord, TaskState};

const QUEUE_KEY: &str = "user_tasks_queue";
const TTL_QUEUED_SECS: usize = 3600;
const TTL_RUNNING_SECS: usize = 3600;
const TTL_TERMINAL_SECS: usize = 86400;

pub struct TaskStore {
    pool: Pool,
}

impl TaskStore {
    pub fn new(redis_url: &str) -> Result<Self> {
        let config = Config::from_url(redis_url);
        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CoreError::TaskStoreError(e.to_string()))?;
        Ok(Self { pool })
    }

    fn ttl_for(state: TaskState) -> usize {
        match state {
            TaskState::Queued => TTL_QUEUED_SECS,
            TaskState::Running | TaskState::OnHold => TTL_RUNNING_SECS,
            TaskState::Finished | TaskState::Failed | TaskState::Canceled => TTL_TERMINAL_SECS,
        }
    }

    /// `SET key v EX 3600` then `RPUSH queue key`. A worker that pops the
    /// key immediately re-reads the record; if missing, the pop is
    /// discarded — that race is what makes this "atomic enough".
    pub async fn enqueue(&self, record: &TaskRecord) -> Result<()> {
        let mut conn = self.pool.get().await.map_err(|e| CoreError::TaskStoreError(e.to_string()))?;
        let key = record.key();
        let payload = serde_json::to_string(record)?;
        conn.set_ex::<_, _, ()>(&key, payload, TTL_QUEUED_SECS as u64).await?;
        conn.rpush::<_, _, ()>(QUEUE_KEY, &key).await?;
        Ok(())
    }

    /// `BLPOP queue timeout`. Returns the popped record key, or `None` on
    /// timeout so the caller (a `WorkerPool` loop) can re-check cancellation.
    pub async fn pop_next(&self, timeout_secs: u64) -> Result<Option<String>> {
        let mut conn = self.pool.get().await.map_err(|e| CoreError::TaskStoreError(e.to_string()))?;
        let popped: Option<(String, String)> = conn.blpop(QUEUE_KEY, timeout_secs as f64).await?;
        Ok(popped.map(|(_, key)| key))
    }

    pub async fn load(&self, key: &str) -> Result<Option<TaskRecord>> {
        let mut conn = self.pool.get().await.map_err(|e| CoreError::TaskStoreError(e.to_string()))?;
        let raw: Option<String> = conn.get(key).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn save(&self, record: &TaskRecord) -> Result<()> {
        let mut conn = self.pool.get().await.map_err(|e| CoreError::TaskStoreError(e.to_string()))?;
        let ttl = Self::ttl_for(record.status);
        let payload = serde_json::to_string(record)?;
        conn.set_ex::<_, _, ()>(record.key(), payload, ttl as u64).await?;
        Ok(())
    }

    /// `SCAN` over `user_tasks:*:{user_id}:*`.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<TaskRecord>> {
        let mut conn = self.pool.get().await.map_err(|e| CoreError::TaskStoreError(e.to_string()))?;
        let pattern = format!("user_tasks:*:{}:*", user_id);
        let keys = self.scan_pattern(&mut conn, &pattern).await?;
        let mut records = Vec::new();
        for key in keys {
            if let Some(record) = self.load(&key).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Finds the unique key matching `user_tasks:*:{user_id}:{task_id}`,
    /// loads it, sets `status=CANCELED` and `done_at`, saves with the
    /// terminal TTL. The owning worker observes this at its next
    /// cancellation check and aborts cooperatively.
    pub async fn mark_cancelled(&self, user_id: &str, task_id: uuid::Uuid) -> Result<()> {
        let mut conn = self.pool.get().await.map_err(|e| CoreError::TaskStoreError(e.to_string()))?;
        let pattern = format!("user_tasks:*:{}:{}", user_id, task_id);
        let keys = self.scan_pattern(&mut conn, &pattern).await?;
        let key = keys
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::TaskStoreError(format!("no task {} for user {}", task_id, user_id)))?;
        let mut record = self
            .load(&key)
            .await?
            .ok_or_else(|| CoreError::TaskStoreError(format!("task record vanished: {}", key)))?;
        record.transition(TaskState::Canceled, Some("cancelled by user"));
        self.save(&record).await
    }

    /// Finds the unique record matching `user_tasks:*:{user_id}:{task_id}`
    /// without mutating it, used by `GET /tasks/:task_id`.
    pub async fn find(&self, user_id: &str, task_id: uuid::Uuid) -> Result<Option<TaskRecord>> {
        let mut conn = self.pool.get().await.map_err(|e| CoreError::TaskStoreError(e.to_string()))?;
        let pattern = format!("user_tasks:*:{}:{}", user_id, task_id);
        let keys = self.scan_pattern(&mut conn, &pattern).await?;
        match keys.into_iter().next() {
            Some(key) => self.load(&key).await,
            None => Ok(None),
        }
    }

    /// `SCAN` over `user_tasks:*:*:*`, used by `RecoverySweeper`.
    pub async fn scan_all(&self) -> Result<Vec<TaskRecord>> {
        let mut conn = self.pool.get().await.map_err(|e| CoreError::TaskStoreError(e.to_string()))?;
        let keys = self.scan_pattern(&mut conn, "user_tasks:*:*:*").await?;
        let mut records = Vec::new();
        for key in keys {
            if let Some(record) = self.load(&key).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn scan_pattern(
        &self,
        conn: &mut deadpool_redis::Connection,
        pattern: &str,
    ) -> Result<Vec<String>> {
        let mut cursor: u64 = 0;
        let mut found = Vec::new();
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(conn)
                .await?;
            found.extend(keys);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        Ok(found)
    }
}

pub fn build_key(kind: TaskKind, user_id: &str, task_id: uuid::Uuid) -> String {
    task_key(kind, user_id, task_id)
}
