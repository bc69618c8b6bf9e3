use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::models::session::{RefreshTokenData, TokenData};

/// Persistence for session records, keyed by token and by refresh token.
///
/// Every method that mutates more than one key must apply all of its
/// changes atomically with respect to other calls for the same user.
#[async_trait]
pub trait SessionIndex: Send + Sync {
    /// Looks up an access token record.
    async fn get_token(&self, token: &str) -> Result<Option<TokenData>>;

    /// Looks up a refresh token record.
    async fn get_refresh_token(&self, refresh_token: &str) -> Result<Option<RefreshTokenData>>;

    /// Stores a new token pair. With `supersede`, every other session of
    /// the same user is removed in the same step.
    async fn insert_session(
        &self,
        token: &str,
        token_data: &TokenData,
        refresh_token: &str,
        refresh_data: &RefreshTokenData,
        supersede: bool,
    ) -> Result<()>;

    /// Binds a new access token to an existing refresh token, dropping the
    /// previously bound access token. Returns false if the refresh token is
    /// no longer stored.
    async fn swap_token(&self, refresh_token: &str, token: &str, token_data: &TokenData) -> Result<bool>;

    /// Replaces the session behind `old_refresh_token` with a new token
    /// pair. Returns false, storing nothing, if the old refresh token is no
    /// longer stored.
    async fn rotate_session(
        &self,
        old_refresh_token: &str,
        token: &str,
        token_data: &TokenData,
        refresh_token: &str,
        refresh_data: &RefreshTokenData,
    ) -> Result<bool>;

    /// Removes every session of a user. Returns how many were removed.
    async fn delete_user_sessions(&self, user_id: Uuid) -> Result<usize>;

    /// Drops sessions whose refresh token expired before `now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

#[derive(Default)]
struct MemoryState {
    tokens: HashMap<String, TokenData>,
    refresh_tokens: HashMap<String, RefreshTokenData>,
    by_user: HashMap<Uuid, HashSet<String>>,
}

impl MemoryState {
    fn remove_refresh(&mut self, refresh_token: &str) -> bool {
        let Some(data) = self.refresh_tokens.remove(refresh_token) else {
            return false;
        };
        self.tokens.remove(&data.current_token);
        if let Some(owned) = self.by_user.get_mut(&data.user_id) {
            owned.remove(refresh_token);
            if owned.is_empty() {
                self.by_user.remove(&data.user_id);
            }
        }
        true
    }

    fn remove_user(&mut self, user_id: Uuid) -> usize {
        let owned = self.by_user.remove(&user_id).unwrap_or_default();
        for refresh_token in &owned {
            if let Some(data) = self.refresh_tokens.remove(refresh_token) {
                self.tokens.remove(&data.current_token);
            }
        }
        owned.len()
    }

    fn insert(&mut self, token: &str, token_data: &TokenData, refresh_token: &str, refresh_data: &RefreshTokenData) {
        self.tokens.insert(token.to_string(), token_data.clone());
        self.refresh_tokens
            .insert(refresh_token.to_string(), refresh_data.clone());
        self.by_user
            .entry(refresh_data.user_id)
            .or_default()
            .insert(refresh_token.to_string());
    }
}

/// An in-process session index. One lock guards all maps, so each call is
/// atomic.
#[derive(Clone, Default)]
pub struct MemorySessionIndex {
    state: Arc<RwLock<MemoryState>>,
}

impl MemorySessionIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionIndex for MemorySessionIndex {
    async fn get_token(&self, token: &str) -> Result<Option<TokenData>> {
        let state = self.state.read().await;
        Ok(state.tokens.get(token).cloned())
    }

    async fn get_refresh_token(&self, refresh_token: &str) -> Result<Option<RefreshTokenData>> {
        let state = self.state.read().await;
        Ok(state.refresh_tokens.get(refresh_token).cloned())
    }

    async fn insert_session(
        &self,
        token: &str,
        token_data: &TokenData,
        refresh_token: &str,
        refresh_data: &RefreshTokenData,
        supersede: bool,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if supersede {
            let removed = state.remove_user(refresh_data.user_id);
            if removed > 0 {
                tracing::debug!("Superseded {} session(s) for user {}", removed, refresh_data.user_id);
            }
        }
        state.insert(token, token_data, refresh_token, refresh_data);
        Ok(())
    }

    async fn swap_token(&self, refresh_token: &str, token: &str, token_data: &TokenData) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(refresh_data) = state.refresh_tokens.get_mut(refresh_token) else {
            return Ok(false);
        };

        let previous = std::mem::replace(&mut refresh_data.current_token, token.to_string());
        state.tokens.remove(&previous);
        state.tokens.insert(token.to_string(), token_data.clone());
        Ok(true)
    }

    async fn rotate_session(
        &self,
        old_refresh_token: &str,
        token: &str,
        token_data: &TokenData,
        refresh_token: &str,
        refresh_data: &RefreshTokenData,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        if !state.remove_refresh(old_refresh_token) {
            return Ok(false);
        }
        state.insert(token, token_data, refresh_token, refresh_data);
        Ok(true)
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> Result<usize> {
        let mut state = self.state.write().await;
        Ok(state.remove_user(user_id))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut state = self.state.write().await;

        let expired: Vec<String> = state
            .refresh_tokens
            .iter()
            .filter(|(_, data)| data.expires_at <= now)
            .map(|(refresh_token, _)| refresh_token.clone())
            .collect();

        for refresh_token in &expired {
            state.remove_refresh(refresh_token);
        }
        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn records(user_id: Uuid, token: &str, refresh_token: &str, now: DateTime<Utc>) -> (TokenData, RefreshTokenData) {
        let token_data = TokenData {
            user_id,
            username: "alice".to_string(),
            roles: vec!["user".to_string()],
            refresh_token: refresh_token.to_string(),
            issued_at: now,
            expires_at: now + Duration::minutes(5),
        };
        let refresh_data = RefreshTokenData {
            user_id,
            username: "alice".to_string(),
            roles: vec!["user".to_string()],
            current_token: token.to_string(),
            issued_at: now,
            expires_at: now + Duration::hours(12),
        };
        (token_data, refresh_data)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let index = MemorySessionIndex::new();
        let user = Uuid::new_v4();
        let (t, r) = records(user, "t1", "r1", Utc::now());

        index.insert_session("t1", &t, "r1", &r, false).await.unwrap();

        assert_eq!(index.get_token("t1").await.unwrap(), Some(t));
        assert_eq!(index.get_refresh_token("r1").await.unwrap(), Some(r));
    }

    #[tokio::test]
    async fn test_supersede_removes_prior_sessions() {
        let index = MemorySessionIndex::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        let (t1, r1) = records(user, "t1", "r1", now);
        let (t2, r2) = records(user, "t2", "r2", now);

        index.insert_session("t1", &t1, "r1", &r1, true).await.unwrap();
        index.insert_session("t2", &t2, "r2", &r2, true).await.unwrap();

        assert!(index.get_token("t1").await.unwrap().is_none());
        assert!(index.get_refresh_token("r1").await.unwrap().is_none());
        assert!(index.get_token("t2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_swap_token_drops_previous() {
        let index = MemorySessionIndex::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        let (t1, r1) = records(user, "t1", "r1", now);
        index.insert_session("t1", &t1, "r1", &r1, false).await.unwrap();

        let (t2, _) = records(user, "t2", "r1", now);
        assert!(index.swap_token("r1", "t2", &t2).await.unwrap());

        assert!(index.get_token("t1").await.unwrap().is_none());
        assert!(index.get_token("t2").await.unwrap().is_some());
        let refresh = index.get_refresh_token("r1").await.unwrap().unwrap();
        assert_eq!(refresh.current_token, "t2");

        assert!(!index.swap_token("missing", "t3", &t2).await.unwrap());
    }

    #[tokio::test]
    async fn test_rotate_requires_live_refresh_token() {
        let index = MemorySessionIndex::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        let (t1, r1) = records(user, "t1", "r1", now);
        let (t2, r2) = records(user, "t2", "r2", now);
        index.insert_session("t1", &t1, "r1", &r1, false).await.unwrap();

        assert!(index.rotate_session("r1", "t2", &t2, "r2", &r2).await.unwrap());
        assert!(index.get_refresh_token("r1").await.unwrap().is_none());
        assert!(index.get_token("t1").await.unwrap().is_none());

        // Replaying the old refresh token stores nothing
        let (t3, r3) = records(user, "t3", "r3", now);
        assert!(!index.rotate_session("r1", "t3", &t3, "r3", &r3).await.unwrap());
        assert!(index.get_token("t3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_user_sessions_is_idempotent() {
        let index = MemorySessionIndex::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        let (t1, r1) = records(user, "t1", "r1", now);
        let (t2, r2) = records(user, "t2", "r2", now);
        index.insert_session("t1", &t1, "r1", &r1, false).await.unwrap();
        index.insert_session("t2", &t2, "r2", &r2, false).await.unwrap();

        assert_eq!(index.delete_user_sessions(user).await.unwrap(), 2);
        assert_eq!(index.delete_user_sessions(user).await.unwrap(), 0);
        assert!(index.get_token("t2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let index = MemorySessionIndex::new();
        let now = Utc::now();
        let (t1, r1) = records(Uuid::new_v4(), "t1", "r1", now - Duration::hours(13));
        let (t2, r2) = records(Uuid::new_v4(), "t2", "r2", now);
        index.insert_session("t1", &t1, "r1", &r1, false).await.unwrap();
        index.insert_session("t2", &t2, "r2", &r2, false).await.unwrap();

        assert_eq!(index.purge_expired(now).await.unwrap(), 1);
        assert!(index.get_refresh_token("r1").await.unwrap().is_none());
        assert!(index.get_refresh_token("r2").await.unwrap().is_some());
    }
}
