use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::keys::PublicJwk;
use crate::crypto::uek::WrappedUek;

/// Represents a user in the system.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    /// The unique identifier for the user.
    pub id: Uuid,
    /// The user's username.
    pub username: String,
    /// The user's roles.
    pub roles: Vec<String>,
    /// Argon2id PHC hash of the user's passkey.
    pub passkey_hash: String,
    /// The user's private key, wrapped under the KDF-derived key.
    pub wrapped_uek: WrappedUek,
    /// The user's public key.
    pub public_key_jwk: PublicJwk,
    /// The timestamp when the user was created.
    pub created_at: DateTime<Utc>,
}
