use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::config::{SessionConfig, SessionPolicy};
use crate::error::{AppError, Result};
use crate::models::session::{
    IssuedSession, IssuedToken, RefreshOutcome, RefreshTokenData, TokenData,
};
use crate::session::clock::{Clock, SystemClock};
use crate::session::index::SessionIndex;
use crate::session::token::TokenSigner;

/// Issues, verifies, rotates and revokes access/refresh token pairs.
///
/// The only authority on whether a caller is authenticated. Verification
/// failures of any kind surface as `None`.
#[derive(Clone)]
pub struct SessionStore {
    index: Arc<dyn SessionIndex>,
    token_signer: TokenSigner,
    refresh_signer: TokenSigner,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    /// Creates a store over `index` using the wall clock.
    ///
    /// # Arguments
    ///
    /// * `index` - The session persistence backend.
    /// * `token_secret` - The HMAC secret for access tokens.
    /// * `refresh_secret` - The HMAC secret for refresh tokens.
    /// * `config` - Lifetimes and session policy.
    pub fn new(
        index: Arc<dyn SessionIndex>,
        token_secret: &[u8],
        refresh_secret: &[u8],
        config: SessionConfig,
    ) -> Result<Self> {
        Self::with_clock(index, token_secret, refresh_secret, config, Arc::new(SystemClock))
    }

    /// Creates a store with an explicit time source.
    pub fn with_clock(
        index: Arc<dyn SessionIndex>,
        token_secret: &[u8],
        refresh_secret: &[u8],
        config: SessionConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if token_secret == refresh_secret {
            return Err(AppError::Encryption(
                "token and refresh token secrets must differ".to_string(),
            ));
        }
        Ok(Self {
            index,
            token_signer: TokenSigner::new(token_secret)?,
            refresh_signer: TokenSigner::new(refresh_secret)?,
            config,
            clock,
        })
    }

    fn token_lifetime(&self) -> Duration {
        Duration::seconds(self.config.token_lifetime_secs)
    }

    fn refresh_lifetime(&self) -> Duration {
        Duration::seconds(self.config.refresh_token_lifetime_secs)
    }

    fn token_data(
        &self,
        user_id: Uuid,
        username: &str,
        roles: &[String],
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> TokenData {
        TokenData {
            user_id,
            username: username.to_string(),
            roles: roles.to_vec(),
            refresh_token: refresh_token.to_string(),
            issued_at: now,
            expires_at: now + self.token_lifetime(),
        }
    }

    fn new_pair(
        &self,
        user_id: Uuid,
        username: &str,
        roles: &[String],
    ) -> Result<(IssuedSession, TokenData, RefreshTokenData)> {
        let now = self.clock.now();
        let token = self.token_signer.issue()?;
        let refresh_token = self.refresh_signer.issue()?;

        let token_data = self.token_data(user_id, username, roles, &refresh_token, now);
        let refresh_data = RefreshTokenData {
            user_id,
            username: username.to_string(),
            roles: roles.to_vec(),
            current_token: token.clone(),
            issued_at: now,
            expires_at: now + self.refresh_lifetime(),
        };

        let issued = IssuedSession {
            token,
            refresh_token,
            issued_at: now,
            token_expires_at: token_data.expires_at,
            refresh_token_expires_at: refresh_data.expires_at,
        };
        Ok((issued, token_data, refresh_data))
    }

    /// Creates a new token pair for a user.
    ///
    /// Under `SessionPolicy::Single` the user's prior sessions are removed
    /// in the same atomic step.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        username: &str,
        roles: &[String],
    ) -> Result<IssuedSession> {
        let (issued, token_data, refresh_data) = self.new_pair(user_id, username, roles)?;
        let supersede = self.config.policy == SessionPolicy::Single;

        self.index
            .insert_session(
                &issued.token,
                &token_data,
                &issued.refresh_token,
                &refresh_data,
                supersede,
            )
            .await?;

        tracing::info!("✅ Session created for user: {}", user_id);
        Ok(issued)
    }

    /// Verifies an access token and returns its record.
    pub async fn check_token(&self, token: &str) -> Option<TokenData> {
        if !self.token_signer.verify(token) {
            tracing::debug!("Token signature rejected");
            return None;
        }

        let data = match self.index.get_token(token).await {
            Ok(Some(data)) => data,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Session index lookup failed: {}", e);
                return None;
            }
        };

        if self.clock.now() >= data.expires_at {
            tracing::debug!("Token expired for user: {}", data.user_id);
            return None;
        }
        Some(data)
    }

    /// Verifies a refresh token and returns its record.
    pub async fn check_refresh_token(&self, refresh_token: &str) -> Option<RefreshTokenData> {
        if !self.refresh_signer.verify(refresh_token) {
            tracing::debug!("Refresh token signature rejected");
            return None;
        }

        let data = match self.index.get_refresh_token(refresh_token).await {
            Ok(Some(data)) => data,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Session index lookup failed: {}", e);
                return None;
            }
        };

        if self.clock.now() >= data.expires_at {
            tracing::debug!("Refresh token expired for user: {}", data.user_id);
            return None;
        }
        Some(data)
    }

    /// Issues a new access token bound to the same refresh token.
    ///
    /// The previous access token of that refresh token stops working.
    pub async fn reissue_token(
        &self,
        refresh_token: &str,
        username: &str,
        roles: &[String],
    ) -> Result<IssuedToken> {
        let current = self
            .check_refresh_token(refresh_token)
            .await
            .ok_or(AppError::Unauthenticated)?;

        let now = self.clock.now();
        let token = self.token_signer.issue()?;
        let token_data = self.token_data(current.user_id, username, roles, refresh_token, now);

        if !self.index.swap_token(refresh_token, &token, &token_data).await? {
            return Err(AppError::Unauthenticated);
        }

        tracing::debug!("Access token reissued for user: {}", current.user_id);
        Ok(IssuedToken {
            token,
            issued_at: now,
            expires_at: token_data.expires_at,
        })
    }

    /// Whether a refresh token with this record should be fully rotated.
    ///
    /// Rotation happens once less than half of the refresh lifetime remains.
    pub fn needs_rotation(&self, data: &RefreshTokenData) -> bool {
        let remaining = data.expires_at - self.clock.now();
        remaining < self.refresh_lifetime() / 2
    }

    /// Handles a refresh request: reissue while the refresh token is fresh,
    /// full rotation once it is past half its lifetime.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshOutcome> {
        let current = self
            .check_refresh_token(refresh_token)
            .await
            .ok_or(AppError::Unauthenticated)?;

        if !self.needs_rotation(&current) {
            let token = self
                .reissue_token(refresh_token, &current.username, &current.roles)
                .await?;
            return Ok(RefreshOutcome::Reissued(token));
        }

        let (issued, token_data, refresh_data) =
            self.new_pair(current.user_id, &current.username, &current.roles)?;

        let rotated = self
            .index
            .rotate_session(
                refresh_token,
                &issued.token,
                &token_data,
                &issued.refresh_token,
                &refresh_data,
            )
            .await?;

        if !rotated {
            // Lost a race with logout or another rotation
            return Err(AppError::Unauthenticated);
        }

        tracing::info!("🔄 Session rotated for user: {}", current.user_id);
        Ok(RefreshOutcome::Rotated(issued))
    }

    /// Removes every session of a user. Revoking a user with no sessions is
    /// a no-op.
    pub async fn revoke_user_sessions(&self, user_id: Uuid) -> Result<()> {
        let removed = self.index.delete_user_sessions(user_id).await?;
        tracing::info!("👋 Revoked {} session(s) for user: {}", removed, user_id);
        Ok(())
    }

    /// Drops expired sessions from the index.
    pub async fn purge_expired(&self) -> Result<usize> {
        self.index.purge_expired(self.clock.now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::clock::ManualClock;
    use crate::session::index::MemorySessionIndex;

    fn store(policy: SessionPolicy) -> (SessionStore, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let config = SessionConfig {
            token_lifetime_secs: 300,
            refresh_token_lifetime_secs: 12 * 3600,
            policy,
        };
        let store = SessionStore::with_clock(
            Arc::new(MemorySessionIndex::new()),
            b"token-secret",
            b"refresh-secret",
            config,
            Arc::new(clock.clone()),
        )
        .unwrap();
        (store, clock)
    }

    fn roles() -> Vec<String> {
        vec!["user".to_string()]
    }

    #[tokio::test]
    async fn test_check_token_after_create() {
        let (store, _) = store(SessionPolicy::Single);
        let user = Uuid::new_v4();
        let session = store.create_session(user, "alice", &roles()).await.unwrap();

        let data = store.check_token(&session.token).await.unwrap();
        assert_eq!(data.user_id, user);
        assert_eq!(data.roles, roles());
        assert_eq!(data.refresh_token, session.refresh_token);
    }

    #[tokio::test]
    async fn test_revoke_invalidates_token() {
        let (store, _) = store(SessionPolicy::Single);
        let user = Uuid::new_v4();
        let session = store.create_session(user, "alice", &roles()).await.unwrap();

        store.revoke_user_sessions(user).await.unwrap();

        assert!(store.check_token(&session.token).await.is_none());
        assert!(store.check_refresh_token(&session.refresh_token).await.is_none());
        // Idempotent
        store.revoke_user_sessions(user).await.unwrap();
    }

    #[tokio::test]
    async fn test_token_expires() {
        let (store, clock) = store(SessionPolicy::Single);
        let session = store
            .create_session(Uuid::new_v4(), "alice", &roles())
            .await
            .unwrap();

        clock.advance(Duration::seconds(299));
        assert!(store.check_token(&session.token).await.is_some());
        clock.advance(Duration::seconds(1));
        assert!(store.check_token(&session.token).await.is_none());
        assert!(store.check_refresh_token(&session.refresh_token).await.is_some());
    }

    #[tokio::test]
    async fn test_tokens_are_not_interchangeable() {
        let (store, _) = store(SessionPolicy::Single);
        let session = store
            .create_session(Uuid::new_v4(), "alice", &roles())
            .await
            .unwrap();

        assert!(store.check_token(&session.refresh_token).await.is_none());
        assert!(store.check_refresh_token(&session.token).await.is_none());
    }

    #[tokio::test]
    async fn test_validly_signed_but_unknown_token_rejected() {
        let (store, _) = store(SessionPolicy::Single);
        let stray = store.token_signer.issue().unwrap();
        assert!(store.check_token(&stray).await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_early_reissues() {
        let (store, clock) = store(SessionPolicy::Single);
        let session = store
            .create_session(Uuid::new_v4(), "alice", &roles())
            .await
            .unwrap();

        clock.advance(Duration::hours(1));
        let outcome = store.refresh(&session.refresh_token).await.unwrap();

        let RefreshOutcome::Reissued(token) = outcome else {
            panic!("expected reissue, got {:?}", outcome);
        };
        assert_ne!(token.token, session.token);

        let data = store.check_token(&token.token).await.unwrap();
        assert_eq!(data.refresh_token, session.refresh_token);
        assert!(store.check_refresh_token(&session.refresh_token).await.is_some());
    }

    #[tokio::test]
    async fn test_refresh_late_rotates() {
        let (store, clock) = store(SessionPolicy::Single);
        let session = store
            .create_session(Uuid::new_v4(), "alice", &roles())
            .await
            .unwrap();

        clock.advance(Duration::hours(11));
        let outcome = store.refresh(&session.refresh_token).await.unwrap();

        let RefreshOutcome::Rotated(rotated) = outcome else {
            panic!("expected rotation, got {:?}", outcome);
        };
        assert_ne!(rotated.token, session.token);
        assert_ne!(rotated.refresh_token, session.refresh_token);

        assert!(store.check_refresh_token(&session.refresh_token).await.is_none());
        assert!(store.refresh(&session.refresh_token).await.is_err());
        assert!(store.check_token(&rotated.token).await.is_some());
        assert!(store.check_refresh_token(&rotated.refresh_token).await.is_some());
    }

    #[tokio::test]
    async fn test_rotation_threshold_is_half_lifetime() {
        let (store, clock) = store(SessionPolicy::Single);
        let session = store
            .create_session(Uuid::new_v4(), "alice", &roles())
            .await
            .unwrap();
        let data = store
            .check_refresh_token(&session.refresh_token)
            .await
            .unwrap();

        clock.advance(Duration::hours(6));
        assert!(!store.needs_rotation(&data));
        clock.advance(Duration::seconds(1));
        assert!(store.needs_rotation(&data));
    }

    #[tokio::test]
    async fn test_reissue_retires_previous_access_token() {
        let (store, _) = store(SessionPolicy::Single);
        let session = store
            .create_session(Uuid::new_v4(), "alice", &roles())
            .await
            .unwrap();

        let token = store
            .reissue_token(&session.refresh_token, "alice", &roles())
            .await
            .unwrap();

        assert!(store.check_token(&session.token).await.is_none());
        assert!(store.check_token(&token.token).await.is_some());
    }

    #[tokio::test]
    async fn test_single_policy_supersedes() {
        let (store, _) = store(SessionPolicy::Single);
        let user = Uuid::new_v4();
        let first = store.create_session(user, "alice", &roles()).await.unwrap();
        let second = store.create_session(user, "alice", &roles()).await.unwrap();

        assert!(store.check_token(&first.token).await.is_none());
        assert!(store.check_token(&second.token).await.is_some());
    }

    #[tokio::test]
    async fn test_multiple_policy_keeps_sessions() {
        let (store, _) = store(SessionPolicy::Multiple);
        let user = Uuid::new_v4();
        let first = store.create_session(user, "alice", &roles()).await.unwrap();
        let second = store.create_session(user, "alice", &roles()).await.unwrap();

        assert!(store.check_token(&first.token).await.is_some());
        assert!(store.check_token(&second.token).await.is_some());

        store.revoke_user_sessions(user).await.unwrap();
        assert!(store.check_token(&first.token).await.is_none());
        assert!(store.check_token(&second.token).await.is_none());
    }

    #[tokio::test]
    async fn test_revoke_leaves_other_users() {
        let (store, _) = store(SessionPolicy::Single);
        let alice = store.create_session(Uuid::new_v4(), "alice", &roles()).await.unwrap();
        let bob_id = Uuid::new_v4();
        store.create_session(bob_id, "bob", &roles()).await.unwrap();

        store.revoke_user_sessions(bob_id).await.unwrap();
        assert!(store.check_token(&alice.token).await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_login_logout_leaves_consistent_state() {
        let (store, _) = store(SessionPolicy::Single);
        let user = Uuid::new_v4();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    store.create_session(user, "alice", &roles()).await.map(Some)
                } else {
                    store.revoke_user_sessions(user).await.map(|_| None)
                }
            }));
        }

        let mut issued = Vec::new();
        for handle in handles {
            if let Some(session) = handle.await.unwrap().unwrap() {
                issued.push(session);
            }
        }

        // Every live access token must still have its refresh token, and
        // at most one session survives under the single policy.
        let mut live = 0;
        for session in &issued {
            let token_live = store.check_token(&session.token).await.is_some();
            let refresh_live = store.check_refresh_token(&session.refresh_token).await.is_some();
            assert_eq!(token_live, refresh_live);
            if token_live {
                live += 1;
            }
        }
        assert!(live <= 1);
    }

    #[test]
    fn test_equal_secrets_rejected() {
        let result = SessionStore::new(
            Arc::new(MemorySessionIndex::new()),
            b"same",
            b"same",
            SessionConfig::default(),
        );
        assert!(result.is_err());
    }
}
