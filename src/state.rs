use std::sync::Arc;

use crate::config::{Config, SessionConfig};
use crate::crypto::kdf::DEFAULT_KDF_SALT;
use crate::error::Result;
use crate::repositories::user::{MemoryUserDirectory, UserDirectory};
use crate::session::index::{MemorySessionIndex, SessionIndex};
use crate::session::redis_index::RedisSessionIndex;
use crate::session::store::SessionStore;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The session store.
    pub sessions: SessionStore,
    /// The user directory.
    pub users: Arc<dyn UserDirectory>,
    /// The KDF salt clients use to wrap their UEK.
    pub kdf_salt: String,
    /// Whether cookies carry the `Secure` attribute.
    pub secure_cookies: bool,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let index: Arc<dyn SessionIndex> = match &config.redis_url {
            Some(url) => Arc::new(RedisSessionIndex::connect(url).await?),
            None => {
                tracing::warn!("⚠️  REDIS_URL not set, sessions are kept in memory");
                Arc::new(MemorySessionIndex::new())
            }
        };

        let sessions = SessionStore::new(
            index,
            &config.token_secret,
            &config.refresh_token_secret,
            config.session.clone(),
        )?;
        tracing::info!(
            "✅ Session store initialized ({:?} policy, token {}s, refresh {}s)",
            config.session.policy,
            config.session.token_lifetime_secs,
            config.session.refresh_token_lifetime_secs
        );

        Ok(AppState {
            sessions,
            users: Arc::new(MemoryUserDirectory::new()),
            kdf_salt: config.kdf_salt.clone(),
            secure_cookies: config.secure_cookies,
        })
    }

    /// Creates a fully in-memory state.
    pub fn in_memory(session: SessionConfig, token_secret: &[u8], refresh_secret: &[u8]) -> Result<Self> {
        let sessions = SessionStore::new(
            Arc::new(MemorySessionIndex::new()),
            token_secret,
            refresh_secret,
            session,
        )?;
        Ok(Self::with_sessions(sessions))
    }

    /// Creates a state around an existing session store.
    pub fn with_sessions(sessions: SessionStore) -> Self {
        AppState {
            sessions,
            users: Arc::new(MemoryUserDirectory::new()),
            kdf_salt: DEFAULT_KDF_SALT.to_string(),
            secure_cookies: false,
        }
    }
}
