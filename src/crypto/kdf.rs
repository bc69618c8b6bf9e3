use sha2::Sha256;
use zeroize::Zeroizing;

use crate::crypto::aes::{KeyUsage, SymmetricKey, KEY_SIZE};
use crate::error::{AppError, Result};

/// The number of PBKDF2-HMAC-SHA256 rounds.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// The application-wide salt used when no `KDF_SALT` is configured.
///
/// Shared by every user; changing it invalidates every stored UEK.
pub const DEFAULT_KDF_SALT: &str = "sealchat-uek-wrapping-salt-v1";

/// Builds the `"{username}:{password}"` credential string.
pub fn credential_string(username: &str, password: &str) -> Zeroizing<String> {
    Zeroizing::new(format!("{}:{}", username, password))
}

/// Derives a deterministic symmetric key from a credential string and salt.
///
/// # Arguments
///
/// * `credential` - The `"{username}:{password}"` credential string.
/// * `salt` - The application salt.
/// * `usages` - The operations the derived key may be used for.
///
/// # Returns
///
/// A `Result` containing the derived `SymmetricKey`.
pub fn derive_symmetric_key(
    credential: &str,
    salt: &str,
    usages: &[KeyUsage],
) -> Result<SymmetricKey> {
    if credential.is_empty() || salt.is_empty() {
        return Err(AppError::InvalidCredential);
    }
    if usages.is_empty() {
        return Err(AppError::KeyUsage("at least one usage is required".to_string()));
    }

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2::pbkdf2_hmac::<Sha256>(
        credential.as_bytes(),
        salt.as_bytes(),
        PBKDF2_ITERATIONS,
        &mut *key,
    );

    tracing::debug!("Symmetric key derived with PBKDF2");
    Ok(SymmetricKey::new(*key, usages))
}
