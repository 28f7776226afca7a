//! Thin HTTP surface: enqueue, inspect, and cancel transfer tasks. Per
//! SPEC_FULL.md §1, this is deliberately the only exposed surface — no
//! accounts, sessions, or OAuth2 handlers live here.

pub mod health;
pub mod tasks;

use uuid::Uuid;

/// Stand-in for a full authentication system (out of scope): the caller is
/// trusted to supply their own id via `X-User-Id`. A real deployment would
/// replace this extractor's body with a session/JWT lookup without touching
/// any handler signature below.
pub struct UserId(pub String);

#[async_trait::async_trait]
impl<S> axum::extract::FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = (axum::http::StatusCode, String);

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_string()))
            .ok_or_else(|| (axum::http::StatusCode::UNAUTHORIZED, "missing X-User-Id header".to_string()))
    }
}

pub fn parse_task_id(raw: &str) -> Result<Uuid, (axum::http::StatusCode, String)> {
    Uuid::parse_str(raw).map_err(|_| (axum::http::StatusCode::BAD_REQUEST, "invalid task id".to_string()))
}
