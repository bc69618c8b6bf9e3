use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{AppError, Result};

/// The size of the random token payload in bytes.
pub const TOKEN_PAYLOAD_SIZE: usize = 32;
/// The size of an HMAC-SHA256 signature in bytes.
pub const SIGNATURE_SIZE: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// Issues and verifies `base64(payload).base64(hmac)` tokens under one secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Zeroizing<Vec<u8>>,
}

impl TokenSigner {
    /// Creates a signer from a server-held secret.
    pub fn new(secret: &[u8]) -> Result<Self> {
        if secret.is_empty() {
            return Err(AppError::Encryption("token secret must not be empty".to_string()));
        }
        Ok(Self {
            secret: Zeroizing::new(secret.to_vec()),
        })
    }

    fn sign(&self, payload: &[u8]) -> Result<[u8; SIGNATURE_SIZE]> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::Encryption(format!("HMAC key error: {}", e)))?;
        mac.update(payload);
        let mut signature = [0u8; SIGNATURE_SIZE];
        signature.copy_from_slice(&mac.finalize().into_bytes());
        Ok(signature)
    }

    /// Generates a fresh signed token.
    pub fn issue(&self) -> Result<String> {
        let mut payload = [0u8; TOKEN_PAYLOAD_SIZE];
        OsRng.fill_bytes(&mut payload);
        let signature = self.sign(&payload)?;

        Ok(format!(
            "{}.{}",
            general_purpose::URL_SAFE_NO_PAD.encode(payload),
            general_purpose::URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Returns true if the token's signature matches its payload.
    pub fn verify(&self, token: &str) -> bool {
        let Some((payload_b64, signature_b64)) = token.split_once('.') else {
            return false;
        };

        let (Ok(payload), Ok(signature)) = (
            general_purpose::URL_SAFE_NO_PAD.decode(payload_b64),
            general_purpose::URL_SAFE_NO_PAD.decode(signature_b64),
        ) else {
            return false;
        };

        if payload.len() != TOKEN_PAYLOAD_SIZE || signature.len() != SIGNATURE_SIZE {
            return false;
        }

        match self.sign(&payload) {
            Ok(expected) => expected.as_slice().ct_eq(signature.as_slice()).into(),
            Err(_) => false,
        }
    }
}
