//! `WorkerPool` — a fixed set of N cooperatively scheduled workers draining
//! `TaskStore`'s queue. Grounded in the teacher's `run_worker`/
//! `process_jobs`/`execute_job` trio (`job_queue.rs`): a `tokio::select!`
//! over a shutdown signal and the blocking pop, a heartbeat task refreshing
//! `last_heartbeat` on an interval, and dispatch-by-kind through a handler
//! registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::models::task::{TaskKind, TaskState};
use crate::services::task_handler::TaskHandler;
use crate::services::task_store::TaskStore;

const POST_ITERATION_PACE: Duration = Duration::from_secs(1);

pub struct WorkerPool {
    store: Arc<TaskStore>,
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
    worker_count: usize,
    poll_timeout: Duration,
    heartbeat_interval: Duration,
}

impl WorkerPool {
    pub fn new(store: Arc<TaskStore>, worker_count: usize, poll_timeout: Duration, heartbeat_interval: Duration) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
            worker_count,
            poll_timeout,
            heartbeat_interval,
        }
    }

    pub fn register_handler(&mut self, kind: TaskKind, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(kind, handler);
    }

    /// Spawns `worker_count` worker loops and returns once all of them have
    /// observed `shutdown` and exited.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let mut joins = Vec::with_capacity(self.worker_count);
        for index in 0..self.worker_count {
            let pool = self.clone();
            let mut rx = shutdown.clone();
            joins.push(tokio::spawn(async move {
                pool.run_worker(format!("worker-{}", index), &mut rx).await;
            }));
        }
        for join in joins {
            let _ = join.await;
        }
    }

    async fn run_worker(&self, worker_id: String, shutdown: &mut watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }

            tokio::select! {
                _ = wait_for_shutdown(shutdown) => return,
                popped = self.store.pop_next(self.poll_timeout.as_secs()) => {
                    match popped {
                        Ok(Some(key)) => self.process_key(&worker_id, &key, shutdown).await,
                        Ok(None) => continue,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to pop next task");
                            continue;
                        }
                    }
                }
            }

            tokio::time::sleep(POST_ITERATION_PACE).await;
        }
    }

    async fn process_key(&self, worker_id: &str, key: &str, shutdown: &mut watch::Receiver<bool>) {
        let Ok(Some(mut record)) = self.store.load(key).await else {
            return;
        };
        if record.status != TaskState::Queued {
            return;
        }

        record.transition(TaskState::Running, None);
        record.worker_id = Some(worker_id.to_string());
        record.last_heartbeat = Some(chrono::Utc::now().timestamp());
        if self.store.save(&record).await.is_err() {
            return;
        }

        let heartbeat = self.spawn_heartbeat(key.to_string(), worker_id.to_string(), self.heartbeat_interval);
        crate::metrics::tasks_in_flight(worker_id, 1);

        let Some(handler) = self.handlers.get(&record.kind).cloned() else {
            heartbeat.abort();
            crate::metrics::tasks_in_flight(worker_id, -1);
            record.transition(TaskState::Failed, Some("no handler registered for this task kind"));
            let _ = self.store.save(&record).await;
            return;
        };

        tokio::select! {
            result = handler.handle(&self.store, record.clone()) => {
                heartbeat.abort();
                crate::metrics::tasks_in_flight(worker_id, -1);
                if let Err(e) = result {
                    self.fail_if_not_terminal(key, &e.to_string()).await;
                }
                self.report_completion(key, record.kind).await;
            }
            _ = wait_for_shutdown(shutdown) => {
                heartbeat.abort();
                crate::metrics::tasks_in_flight(worker_id, -1);
                self.hold_for_shutdown(key).await;
            }
        }
    }

    /// Emits `task_completed` for whatever terminal state the handler left
    /// behind; a no-op if the record is still `ON_HOLD`/non-terminal (e.g.
    /// the handler returned without reaching a terminal transition).
    async fn report_completion(&self, key: &str, kind: TaskKind) {
        let Ok(Some(record)) = self.store.load(key).await else {
            return;
        };
        if !record.status.is_terminal() {
            return;
        }
        let outcome = match record.status {
            TaskState::Finished => "finished",
            TaskState::Failed => "failed",
            TaskState::Canceled => "canceled",
            _ => return,
        };
        let duration = match (record.started_at, record.done_at) {
            (Some(start), Some(done)) => (done - start).max(0) as f64,
            _ => 0.0,
        };
        crate::metrics::task_completed(kind.as_str(), outcome, duration);
    }

    async fn fail_if_not_terminal(&self, key: &str, reason: &str) {
        if let Ok(Some(mut record)) = self.store.load(key).await {
            if !record.status.is_terminal() {
                record.transition(TaskState::Failed, Some(reason));
                let _ = self.store.save(&record).await;
            }
        }
    }

    async fn hold_for_shutdown(&self, key: &str) {
        if let Ok(Some(mut record)) = self.store.load(key).await {
            if !record.status.is_terminal() {
                record.transition(TaskState::OnHold, Some("worker shutdown; will be retried later"));
                let _ = self.store.save(&record).await;
            }
        }
    }

    fn spawn_heartbeat(&self, key: String, worker_id: String, heartbeat_interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.store.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(heartbeat_interval);
            interval.tick().await;
            loop {
                interval.tick().await;
                match store.load(&key).await {
                    Ok(Some(mut record)) if !record.status.is_terminal() => {
                        record.last_heartbeat = Some(chrono::Utc::now().timestamp());
                        record.worker_id = Some(worker_id.clone());
                        if store.save(&record).await.is_err() {
                            return;
                        }
                    }
                    _ => return,
                }
            }
        })
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pool_has_no_handlers_registered() {
        // construction alone must not require a live Redis connection
        let store = Arc::new(TaskStore::new("redis://127.0.0.1:6379").unwrap());
        let pool = WorkerPool::new(store, 3, Duration::from_secs(5), Duration::from_secs(30));
        assert!(pool.handlers.is_empty());
    }
}
