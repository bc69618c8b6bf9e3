use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::crypto::aes::{KeyUsage, SymmetricKey, KEY_SIZE};
use crate::crypto::keys::{PrivateKey, PublicKey};
use crate::error::{AppError, Result};

/// HKDF info string binding the derived key to its purpose.
const CONVERSATION_KEY_INFO: &[u8] = b"sealchat-conversation-key-v1";

/// Derives the symmetric key for a conversation between two parties.
///
/// `their_public_key` must come from `keys::import_public_key`, which is
/// where curve membership is checked.
pub fn derive_shared_key(my_private_key: &PrivateKey, their_public_key: &PublicKey) -> Result<SymmetricKey> {
    let shared = p521::elliptic_curve::ecdh::diffie_hellman(
        my_private_key.inner().to_nonzero_scalar(),
        their_public_key.inner().as_affine(),
    );

    let hk = Hkdf::<Sha256>::new(None, &shared.raw_secret_bytes()[..]);
    let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
    hk.expand(CONVERSATION_KEY_INFO, &mut *okm)
        .map_err(|e| AppError::Encryption(format!("HKDF expand failed: {}", e)))?;

    Ok(SymmetricKey::new(*okm, &[KeyUsage::Encrypt, KeyUsage::Decrypt]))
}
