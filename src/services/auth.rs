use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder,
};
use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use uuid::Uuid;

use crate::crypto::keys::{import_public_key, PublicJwk};
use crate::crypto::uek::WrappedUek;
use crate::error::{AppError, Result};
use crate::models::user::User;
use crate::repositories::user::UserDirectory;

/// The memory cost for Argon2 in MB.
const ARGON2_MEMORY_MB: u32 = 19;
/// The number of iterations for Argon2.
const ARGON2_ITERATIONS: u32 = 3;
/// The parallelism factor for Argon2.
const ARGON2_PARALLELISM: u32 = 6;

/// The role every new account receives.
pub const DEFAULT_ROLE: &str = "user";

/// Hashes a passkey using Argon2id.
///
/// # Arguments
///
/// * `passkey` - The client-derived passkey.
///
/// # Returns
///
/// A `Result` containing the PHC-format hash.
pub fn hash_passkey(passkey: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    OsRng.fill_bytes(&mut salt_bytes);

    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::Encryption(format!("Salt encoding error: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        ParamsBuilder::new()
            .m_cost(ARGON2_MEMORY_MB * 1024)
            .t_cost(ARGON2_ITERATIONS)
            .p_cost(ARGON2_PARALLELISM)
            .build()
            .map_err(|e| AppError::Encryption(format!("Argon2 params: {}", e)))?,
    );

    let passkey_hash = argon2
        .hash_password(passkey.as_bytes(), &salt)
        .map_err(|e| AppError::Encryption(format!("Argon2 hash error: {}", e)))?
        .to_string();

    tracing::debug!("Passkey hashed successfully with Argon2");
    Ok(passkey_hash)
}

/// Verifies a passkey against a stored hash.
pub fn verify_passkey(passkey: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Encryption(format!("Hash parse error: {}", e)))?;
    let result = Argon2::default()
        .verify_password(passkey.as_bytes(), &parsed_hash)
        .is_ok();

    tracing::debug!("Passkey verification completed");
    Ok(result)
}

/// Creates a new user from client-prepared key material.
///
/// The public key is imported before anything is stored, so a malformed
/// key never reaches the directory.
pub async fn create_user(
    users: &dyn UserDirectory,
    username: String,
    passkey: &str,
    public_key_jwk: PublicJwk,
    wrapped_uek: WrappedUek,
) -> Result<User> {
    tracing::debug!("🔐 Creating user: {}", username);

    import_public_key(&public_key_jwk)?;
    if crate::crypto::aes::nonce_from_slice(&wrapped_uek.iv).is_none() {
        return Err(AppError::MalformedKeyMaterial("UEK iv must be 96 bits".to_string()));
    }

    let user = User {
        id: Uuid::new_v4(),
        username,
        roles: vec![DEFAULT_ROLE.to_string()],
        passkey_hash: hash_passkey(passkey)?,
        wrapped_uek,
        public_key_jwk,
        created_at: Utc::now(),
    };

    let user = users.create_user(user).await?;
    tracing::info!("✅ User created with ID: {}", user.id);
    Ok(user)
}

/// Authenticates a user by passkey.
///
/// An unknown username and a wrong passkey produce the same error.
pub async fn authenticate_user(
    users: &dyn UserDirectory,
    username: &str,
    passkey: &str,
) -> Result<User> {
    tracing::debug!("🔐 Authenticating user: {}", username);

    let user = users
        .find_by_username(username)
        .await?
        .ok_or(AppError::InvalidCredential)?;

    if !verify_passkey(passkey, &user.passkey_hash)? {
        return Err(AppError::InvalidCredential);
    }

    tracing::info!("✅ User authenticated: {}", user.id);
    Ok(user)
}
