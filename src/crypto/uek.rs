use serde::{Deserialize, Serialize};

use crate::crypto::aes::{self, KeyUsage, SymmetricKey};
use crate::crypto::keys::PrivateKey;
use crate::error::{AppError, Result};

/// A private key encrypted under the KDF-derived key, as stored server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedUek {
    #[serde(with = "crate::encoding::b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "crate::encoding::b64")]
    pub iv: Vec<u8>,
}

/// Wraps a private key for server-side storage.
///
/// # Arguments
///
/// * `private_key` - The user's long-lived private key.
/// * `key` - A KDF-derived key carrying the `WrapKey` usage.
pub fn wrap(private_key: &PrivateKey, key: &SymmetricKey) -> Result<WrappedUek> {
    key.require(KeyUsage::WrapKey)?;

    let scalar = private_key.to_scalar_bytes();
    let (ciphertext, iv) = aes::encrypt(key.as_bytes(), &scalar)?;

    tracing::debug!("UEK wrapped");
    Ok(WrappedUek {
        ciphertext,
        iv: iv.to_vec(),
    })
}

/// Unwraps a stored private key.
///
/// A wrong key and tampered ciphertext are indistinguishable here, and both
/// are reported as `AppError::InvalidCredential`.
pub fn unwrap(ciphertext: &[u8], iv: &[u8], key: &SymmetricKey) -> Result<PrivateKey> {
    key.require(KeyUsage::UnwrapKey)?;

    let nonce = aes::nonce_from_slice(iv)
        .ok_or_else(|| AppError::MalformedKeyMaterial("UEK iv must be 96 bits".to_string()))?;

    let scalar = zeroize::Zeroizing::new(
        aes::decrypt(key.as_bytes(), ciphertext, &nonce).map_err(|_| {
            tracing::warn!("UEK unwrap failed authentication");
            AppError::InvalidCredential
        })?,
    );

    PrivateKey::from_scalar_bytes(&scalar)
}

impl WrappedUek {
    /// Convenience for `unwrap(&self.ciphertext, &self.iv, key)`.
    pub fn unwrap_with(&self, key: &SymmetricKey) -> Result<PrivateKey> {
        unwrap(&self.ciphertext, &self.iv, key)
    }
}
