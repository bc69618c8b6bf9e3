use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    crypto::keys::PublicJwk,
    error::{AppError, Result},
    state::AppState,
};

/// Returns a user's published public key, for deriving a conversation key.
pub async fn public_key(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<PublicJwk>> {
    let user = state
        .users
        .find_by_username(&username)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(user.public_key_jwk))
}
