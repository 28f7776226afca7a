//! `POST/GET/DELETE /api/v1/tasks/...` — enqueue, inspect, and cancel a
//! playlist transfer task. This is the entire user-facing surface of the
//! task runtime; everything else (matching, provider calls, retries) runs
//! off the HTTP request/response cycle inside the `WorkerPool`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::error::{CoreError, Result};
use crate::handlers::{parse_task_id, UserId};
use crate::models::task::{PlaylistTransferArguments, TaskKind, TaskRecord};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CreateTaskResponse {
    pub task_id: uuid::Uuid,
}

/// `POST /api/v1/tasks/transfer`. Enqueues a transfer and returns
/// immediately — per the concurrency model, there is no synchronous
/// transfer-completion path.
pub async fn create_transfer_task(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(args): Json<PlaylistTransferArguments>,
) -> Result<Json<CreateTaskResponse>> {
    let record = TaskRecord::new(
        TaskKind::UserInitiatedPlaylistTransfer,
        user_id,
        serde_json::to_value(&args)?,
    );
    state.task_store.enqueue(&record).await?;
    crate::metrics::task_enqueued("USER_INITIATED_PLAYLIST_TRANSFER");
    tracing::info!(task_id = %record.task_id, "playlist transfer task enqueued");
    Ok(Json(CreateTaskResponse { task_id: record.task_id }))
}

/// `GET /api/v1/tasks/:task_id`. Returns the caller's own record verbatim —
/// `status`, `progress`, and `result` reflect whatever the worker last
/// wrote.
pub async fn get_task(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(task_id): Path<String>,
) -> Result<Json<TaskRecord>> {
    let task_id = parse_task_id(&task_id).map_err(|(_, msg)| CoreError::InvalidArgument(msg))?;
    let record = state
        .task_store
        .find(&user_id, task_id)
        .await?
        .ok_or_else(|| CoreError::TaskStoreError(format!("no such task: {}", task_id)))?;
    Ok(Json(record))
}

/// `DELETE /api/v1/tasks/:task_id`. Marks the record `CANCELED`; the owning
/// worker observes this cooperatively at its next per-track check, it does
/// not stop mid-flight.
pub async fn cancel_task(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(task_id): Path<String>,
) -> Result<StatusCode> {
    let task_id = parse_task_id(&task_id).map_err(|(_, msg)| CoreError::InvalidArgument(msg))?;
    state.task_store.mark_cancelled(&user_id, task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
