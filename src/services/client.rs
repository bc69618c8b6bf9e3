//! Client-side key flows: what a browser or app does at signup, at login,
//! and when it opens a conversation. Nothing here talks to the server.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::aes::{KeyUsage, SymmetricKey};
use crate::crypto::kdf::{credential_string, derive_symmetric_key};
use crate::crypto::keys::{export_public_key, generate_key_pair, import_public_key, KeyPair, PrivateKey, PublicJwk};
use crate::crypto::shared::derive_shared_key;
use crate::crypto::uek::{self, WrappedUek};
use crate::error::Result;

const WRAPPING_USAGES: &[KeyUsage] = &[KeyUsage::WrapKey, KeyUsage::UnwrapKey];

/// Everything the server needs from a client at signup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupBundle {
    /// Hex SHA-256 of `"{username}:{password}"`.
    pub passkey: String,
    pub public_key: PublicJwk,
    pub wrapped_uek: WrappedUek,
}

/// Derives the passkey the server verifies at login.
pub fn derive_passkey(username: &str, password: &str) -> String {
    let credential = credential_string(username, password);
    hex::encode(Sha256::digest(credential.as_bytes()))
}

fn wrapping_key(username: &str, password: &str, salt: &str) -> Result<SymmetricKey> {
    derive_symmetric_key(&credential_string(username, password), salt, WRAPPING_USAGES)
}

/// Generates the user's key pair and wraps the private half.
///
/// Returns the bundle to send and the key pair to keep in memory.
pub fn prepare_signup(username: &str, password: &str, salt: &str) -> Result<(SignupBundle, KeyPair)> {
    let pair = generate_key_pair();
    let key = wrapping_key(username, password, salt)?;
    let wrapped_uek = uek::wrap(&pair.private_key, &key)?;

    let bundle = SignupBundle {
        passkey: derive_passkey(username, password),
        public_key: export_public_key(&pair.public_key),
        wrapped_uek,
    };
    Ok((bundle, pair))
}

/// Re-derives the wrapping key from credentials and unwraps the UEK.
pub fn unlock(username: &str, password: &str, salt: &str, wrapped: &WrappedUek) -> Result<PrivateKey> {
    let key = wrapping_key(username, password, salt)?;
    wrapped.unwrap_with(&key)
}

/// Derives the conversation key with a counterpart's published key.
pub fn conversation_key(my_private_key: &PrivateKey, their_public_key: &PublicJwk) -> Result<SymmetricKey> {
    let their_public_key = import_public_key(their_public_key)?;
    derive_shared_key(my_private_key, &their_public_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn test_passkey_is_hex_sha256() {
        let passkey = derive_passkey("alice", "pw");
        assert_eq!(passkey.len(), 64);
        assert_eq!(passkey, derive_passkey("alice", "pw"));
        assert_ne!(passkey, derive_passkey("alice", "pW"));
    }

    #[test]
    fn test_signup_then_unlock() {
        let (bundle, pair) = prepare_signup("alice", "s3cret", "salt").unwrap();
        let unlocked = unlock("alice", "s3cret", "salt", &bundle.wrapped_uek).unwrap();
        assert_eq!(unlocked, pair.private_key);
    }

    #[test]
    fn test_unlock_with_wrong_password() {
        let (bundle, _) = prepare_signup("alice", "s3cret", "salt").unwrap();
        let result = unlock("alice", "s3creT", "salt", &bundle.wrapped_uek);
        assert!(matches!(result, Err(AppError::InvalidCredential)));
    }

    #[test]
    fn test_both_sides_agree_on_conversation_key() {
        let (alice_bundle, alice) = prepare_signup("alice", "a", "salt").unwrap();
        let (bob_bundle, bob) = prepare_signup("bob", "b", "salt").unwrap();

        let alice_side = conversation_key(&alice.private_key, &bob_bundle.public_key).unwrap();
        let bob_side = conversation_key(&bob.private_key, &alice_bundle.public_key).unwrap();
        assert_eq!(alice_side, bob_side);
    }
}
