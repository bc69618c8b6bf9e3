use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
///
/// Crypto and session failures are deliberately coarse: callers only learn
/// that a credential was rejected or that a request is unauthenticated,
/// never which check failed.
#[derive(Error, Debug)]
pub enum AppError {
    /// Key derivation input was rejected, a UEK failed to unwrap, or the
    /// passkey did not verify.
    #[error("Invalid credential")]
    InvalidCredential,

    /// A public or private key did not have the expected curve or shape.
    #[error("Malformed key material: {0}")]
    MalformedKeyMaterial(String),

    /// Authenticated decryption failed.
    #[error("Ciphertext failed authentication")]
    TamperedCiphertext,

    /// The caller holds no valid session.
    #[error("Unauthenticated")]
    Unauthenticated,

    /// A symmetric key was used for an operation it was not derived for.
    #[error("Key usage not permitted: {0}")]
    KeyUsage(String),

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The resource already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A resource not found error.
    #[error("Resource not found")]
    NotFound,

    /// An encryption primitive rejected its parameters.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A record could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl From<sonic_rs::Error> for AppError {
    fn from(e: sonic_rs::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::InvalidCredential => {
                tracing::warn!("Credential rejected");
                (
                    StatusCode::UNAUTHORIZED,
                    "Invalid username or password".to_string(),
                )
            }

            AppError::Unauthenticated => {
                tracing::warn!("Unauthenticated request");
                (StatusCode::UNAUTHORIZED, "Access denied".to_string())
            }

            AppError::MalformedKeyMaterial(ref msg) => {
                tracing::debug!("Malformed key material: {}", msg);
                (StatusCode::BAD_REQUEST, "Malformed key material".to_string())
            }

            AppError::TamperedCiphertext => {
                tracing::warn!("Ciphertext failed authentication");
                (StatusCode::BAD_REQUEST, "Decryption failed".to_string())
            }

            AppError::KeyUsage(ref msg) => {
                tracing::error!("Key usage error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Encryption error".to_string())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Conflict(ref msg) => {
                tracing::debug!("Conflict: {}", msg);
                (StatusCode::CONFLICT, msg.clone())
            }

            AppError::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, "Resource not found".to_string())
            }

            AppError::Encryption(ref msg) => {
                tracing::error!("Encryption error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Encryption error".to_string())
            }

            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Session store error".to_string())
            }

            AppError::Serialization(ref msg) => {
                tracing::error!("Serialization error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (status, [(axum::http::header::CONTENT_TYPE, "application/json")], body).into_response()
    }
}
