use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use anyhow::{Context, Result};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::kdf::DEFAULT_KDF_SALT;

/// Whether a user may hold more than one live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPolicy {
    /// A new session supersedes every prior session of the user.
    #[default]
    Single,
    /// Sessions accumulate until revoked or expired.
    Multiple,
}

impl FromStr for SessionPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(SessionPolicy::Single),
            "multiple" => Ok(SessionPolicy::Multiple),
            other => anyhow::bail!("unknown session policy {:?} (expected single or multiple)", other),
        }
    }
}

/// Token lifetimes and session policy.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The access token lifetime in seconds.
    pub token_lifetime_secs: i64,
    /// The refresh token lifetime in seconds.
    pub refresh_token_lifetime_secs: i64,
    /// How concurrent sessions of one user are handled.
    pub policy: SessionPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_lifetime_secs: 300,
            refresh_token_lifetime_secs: 12 * 3600,
            policy: SessionPolicy::Single,
        }
    }
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The address the server binds to.
    pub bind_addr: SocketAddr,
    /// The URL of the Redis server; sessions stay in memory when unset.
    pub redis_url: Option<String>,
    /// The HMAC secret for access tokens.
    pub token_secret: Zeroizing<Vec<u8>>,
    /// The HMAC secret for refresh tokens.
    pub refresh_token_secret: Zeroizing<Vec<u8>>,
    /// Token lifetimes and session policy.
    pub session: SessionConfig,
    /// The application-wide KDF salt handed to clients.
    pub kdf_salt: String,
    /// Whether cookies carry the `Secure` attribute.
    pub secure_cookies: bool,
}

fn secret_from_env(name: &str) -> Result<Zeroizing<Vec<u8>>> {
    let mut secret_hex = env::var(name)
        .with_context(|| format!("{} must be set (generate with: openssl rand -hex 32)", name))?;

    let secret = hex::decode(&secret_hex)
        .with_context(|| format!("{} must be valid hexadecimal", name));
    secret_hex.zeroize();
    let secret = secret?;

    if secret.len() != 32 {
        anyhow::bail!("{} must be exactly 32 bytes (64 hex characters)", name);
    }
    Ok(Zeroizing::new(secret))
}

fn parse_env<T: FromStr>(name: &str, default: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid {}: {}", name, e))
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let token_secret = secret_from_env("TOKEN_SECRET")?;
        let refresh_token_secret = secret_from_env("REFRESH_TOKEN_SECRET")?;

        if *token_secret == *refresh_token_secret {
            anyhow::bail!("TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ");
        }

        let session = SessionConfig {
            token_lifetime_secs: parse_env("TOKEN_LIFETIME_SECS", "300")?,
            refresh_token_lifetime_secs: parse_env("REFRESH_TOKEN_LIFETIME_SECS", "43200")?,
            policy: parse_env("SESSION_POLICY", "single")?,
        };

        if session.token_lifetime_secs <= 0 || session.refresh_token_lifetime_secs <= 0 {
            anyhow::bail!("Token lifetimes must be positive");
        }
        if session.token_lifetime_secs > session.refresh_token_lifetime_secs {
            anyhow::bail!("TOKEN_LIFETIME_SECS must not exceed REFRESH_TOKEN_LIFETIME_SECS");
        }

        Ok(Self {
            bind_addr: parse_env("BIND_ADDR", "127.0.0.1:3000")?,
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            token_secret,
            refresh_token_secret,
            session,
            kdf_salt: env::var("KDF_SALT").unwrap_or_else(|_| DEFAULT_KDF_SALT.to_string()),
            secure_cookies: env::var("APP_ENV")
                .unwrap_or_else(|_| "development".to_string())
                == "production",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_policy_parsing() {
        assert_eq!("single".parse::<SessionPolicy>().unwrap(), SessionPolicy::Single);
        assert_eq!(" Multiple ".parse::<SessionPolicy>().unwrap(), SessionPolicy::Multiple);
        assert!("many".parse::<SessionPolicy>().is_err());
    }

    #[test]
    fn test_default_lifetimes() {
        let config = SessionConfig::default();
        assert_eq!(config.token_lifetime_secs, 300);
        assert_eq!(config.refresh_token_lifetime_secs, 43200);
        assert_eq!(config.policy, SessionPolicy::Single);
    }
}
