use crate::error::{AppError, Result};

/// The length of a hex-encoded SHA-256 passkey.
const PASSKEY_HEX_LEN: usize = 64;

/// Validates a username.
///
/// # Arguments
///
/// * `username` - The username to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the username is valid.
pub fn validate_username(username: &str) -> Result<()> {
    if username.len() < 3 {
        return Err(AppError::Validation(
            "Username must be at least 3 characters long".to_string(),
        ));
    }

    if username.len() > 255 {
        return Err(AppError::Validation(
            "Username must be at most 255 characters".to_string(),
        ));
    }

    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(AppError::Validation(
            "Username can only contain letters, numbers, underscores, and hyphens".to_string(),
        ));
    }

    Ok(())
}

/// Validates a passkey: 64 hex characters.
pub fn validate_passkey(passkey: &str) -> Result<()> {
    if passkey.len() != PASSKEY_HEX_LEN || !passkey.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AppError::Validation(
            "Passkey must be 64 hexadecimal characters".to_string(),
        ));
    }

    Ok(())
}
