use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use aes_gcm::aead::rand_core::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};
use crate::error::{AppError, Result};

/// The size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// The size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// An operation a symmetric key may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyUsage {
    /// Encrypt message payloads.
    Encrypt,
    /// Decrypt message payloads.
    Decrypt,
    /// Wrap a private key for storage.
    WrapKey,
    /// Unwrap a stored private key.
    UnwrapKey,
}

/// An AES-256 key, zeroized on drop, tagged with its permitted usages.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
    #[zeroize(skip)]
    usages: Vec<KeyUsage>,
}

impl SymmetricKey {
    /// Creates a new `SymmetricKey` from raw key bytes.
    ///
    /// # Arguments
    ///
    /// * `bytes` - A 32-byte array representing the AES-256 key.
    /// * `usages` - The operations this key may be used for.
    pub fn new(bytes: [u8; KEY_SIZE], usages: &[KeyUsage]) -> Self {
        Self {
            bytes,
            usages: usages.to_vec(),
        }
    }

    /// Returns a reference to the key as a byte slice.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Returns the usages this key was created with.
    pub fn usages(&self) -> &[KeyUsage] {
        &self.usages
    }

    /// Fails with `AppError::KeyUsage` unless `usage` is permitted.
    pub fn require(&self, usage: KeyUsage) -> Result<()> {
        if self.usages.contains(&usage) {
            Ok(())
        } else {
            Err(AppError::KeyUsage(format!("{:?} not permitted", usage)))
        }
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("usages", &self.usages)
            .finish_non_exhaustive()
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl Eq for SymmetricKey {}

/// Generates a new random AES-GCM nonce.
///
/// # Returns
///
/// A 12-byte array representing the nonce.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypts a plaintext using AES-256-GCM under a fresh random nonce.
///
/// # Arguments
///
/// * `key` - The AES-256 key.
/// * `plaintext` - The data to encrypt.
///
/// # Returns
///
/// A tuple containing the ciphertext and the nonce used for encryption.
pub fn encrypt(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_SIZE])> {
    let cipher = Aes256Gcm::new(key.into());

    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from(nonce_bytes);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| AppError::Encryption(format!("Encryption failed: {}", e)))?;

    Ok((ciphertext, nonce_bytes))
}

/// Decrypts a ciphertext using AES-256-GCM.
///
/// Any authentication failure is reported as `AppError::TamperedCiphertext`;
/// callers that need a different classification map it themselves.
pub fn decrypt(key: &[u8; KEY_SIZE], ciphertext: &[u8], nonce: &[u8; NONCE_SIZE]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.into());
    let nonce = Nonce::from(*nonce);

    cipher
        .decrypt(&nonce, ciphertext)
        .map_err(|_| AppError::TamperedCiphertext)
}

/// Converts an iv slice into a fixed-size nonce.
pub fn nonce_from_slice(iv: &[u8]) -> Option<[u8; NONCE_SIZE]> {
    iv.try_into().ok()
}
