use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The record stored under an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenData {
    /// The ID of the user this token belongs to.
    pub user_id: Uuid,
    /// The user's username.
    pub username: String,
    /// The user's roles.
    pub roles: Vec<String>,
    /// The refresh token this access token was issued under.
    pub refresh_token: String,
    /// The timestamp when the token was issued.
    pub issued_at: DateTime<Utc>,
    /// The timestamp when the token expires.
    pub expires_at: DateTime<Utc>,
}

/// The record stored under a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenData {
    /// The ID of the user this refresh token belongs to.
    pub user_id: Uuid,
    /// The user's username.
    pub username: String,
    /// The user's roles.
    pub roles: Vec<String>,
    /// The access token currently bound to this refresh token.
    pub current_token: String,
    /// The timestamp when the refresh token was issued.
    pub issued_at: DateTime<Utc>,
    /// The timestamp when the refresh token expires.
    pub expires_at: DateTime<Utc>,
}

/// A freshly created token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedSession {
    pub token: String,
    pub refresh_token: String,
    pub issued_at: DateTime<Utc>,
    pub token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

/// A reissued access token bound to an existing refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// What a refresh request produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new access token; the refresh token is unchanged.
    Reissued(IssuedToken),
    /// A brand-new token pair; the old refresh token is gone.
    Rotated(IssuedSession),
}
