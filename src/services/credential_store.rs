//! `CredentialStore` — the narrow port each provider driver uses to obtain a
//! fresh access token at construction time. OAuth2 link/unlink and encrypted
//! at-rest storage are out of scope for this core; this port only specifies
//! the read/invalidate contract a driver needs.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{CoreError, Result};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns a usable access token for `(user_id, provider)`, refreshing it
    /// lazily if the stored one is stale. `AuthError` if none is linked.
    async fn get_access_token(&self, user_id: &str, provider: &str) -> Result<String>;

    /// Deletes the stored credential, forcing the user to re-link. Called by
    /// a driver when a refresh attempt fails.
    async fn invalidate(&self, user_id: &str, provider: &str) -> Result<()>;
}

/// In-memory double used by tests and by the Subsonic/Deezer drivers, whose
/// "tokens" are really static per-user config rather than OAuth2 bearer
/// tokens that expire.
#[derive(Default)]
pub struct StaticCredentialStore {
    tokens: RwLock<HashMap<(String, String), String>>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, user_id: impl Into<String>, provider: impl Into<String>, token: impl Into<String>) {
        self.tokens
            .write()
            .unwrap()
            .insert((user_id.into(), provider.into()), token.into());
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn get_access_token(&self, user_id: &str, provider: &str) -> Result<String> {
        self.tokens
            .read()
            .unwrap()
            .get(&(user_id.to_string(), provider.to_string()))
            .cloned()
            .ok_or_else(|| CoreError::AuthError {
                provider: provider.to_string(),
                message: "no credential linked".to_string(),
            })
    }

    async fn invalidate(&self, user_id: &str, provider: &str) -> Result<()> {
        self.tokens
            .write()
            .unwrap()
            .remove(&(user_id.to_string(), provider.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_token_is_auth_error() {
        let store = StaticCredentialStore::new();
        let err = store.get_access_token("u1", "spotify").await.unwrap_err();
        assert!(matches!(err, CoreError::AuthError { .. }));
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = StaticCredentialStore::new();
        store.set("u1", "spotify", "tok-123");
        assert_eq!(store.get_access_token("u1", "spotify").await.unwrap(), "tok-123");
    }

    #[tokio::test]
    async fn invalidate_removes_token() {
        let store = StaticCredentialStore::new();
        store.set("u1", "spotify", "tok-123");
        store.invalidate("u1", "spotify").await.unwrap();
        assert!(store.get_access_token("u1", "spotify").await.is_err());
    }
}
