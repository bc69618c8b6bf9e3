use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    crypto::keys::PublicJwk,
    crypto::uek::WrappedUek,
    error::{AppError, Result},
    models::session::{RefreshOutcome, TokenData},
    services::auth as auth_service,
    session::cookies::{
        logout_cookies, session_cookies, token_cookie, REFRESH_TOKEN_COOKIE, TOKEN_COOKIE,
    },
    state::AppState,
    validation::auth::*,
};

/// The request payload for user signup.
#[derive(Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub passkey: String,
    pub public_key: PublicJwk,
    pub wrapped_uek: WrappedUek,
}

/// The request payload for user login.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub passkey: String,
}

/// The response payload for signup.
#[derive(Serialize)]
pub struct SignupResponse {
    pub user_id: Uuid,
    pub username: String,
}

/// The response payload for login: the key material the client unwraps.
#[derive(Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub roles: Vec<String>,
    pub wrapped_uek: WrappedUek,
    pub public_key: PublicJwk,
    pub kdf_salt: String,
}

/// The response payload for the KDF salt lookup.
#[derive(Serialize)]
pub struct KdfSaltResponse {
    pub kdf_salt: String,
}

/// The response payload for refresh requests.
#[derive(Serialize)]
pub struct RefreshResponse {
    pub rotated: bool,
}

/// The response payload for the current user.
#[derive(Serialize)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub username: String,
    pub roles: Vec<String>,
    pub public_key: PublicJwk,
}

/// The response payload for simple acknowledgements.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
}

/// Returns the application KDF salt.
pub async fn kdf_salt(State(state): State<AppState>) -> Json<KdfSaltResponse> {
    Json(KdfSaltResponse {
        kdf_salt: state.kdf_salt.clone(),
    })
}

/// Handles user signup.
pub async fn signup(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<SignupRequest>,
) -> Result<Response> {
    tracing::info!("📝 Signup attempt for: {}", payload.username);
    validate_username(&payload.username)?;
    validate_passkey(&payload.passkey)?;

    let user = auth_service::create_user(
        state.users.as_ref(),
        payload.username,
        &payload.passkey,
        payload.public_key,
        payload.wrapped_uek,
    )
    .await?;

    let session = state
        .sessions
        .create_session(user.id, &user.username, &user.roles)
        .await?;
    for cookie in session_cookies(&session, state.secure_cookies) {
        cookies.add(cookie);
    }

    tracing::info!("✅ User signed up: {}", user.id);

    let response = SignupResponse {
        user_id: user.id,
        username: user.username,
    };
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Handles user login.
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<LoginRequest>,
) -> Result<Response> {
    tracing::info!("🔐 Login attempt for: {}", payload.username);
    validate_username(&payload.username).map_err(|_| AppError::InvalidCredential)?;
    validate_passkey(&payload.passkey).map_err(|_| AppError::InvalidCredential)?;

    let user = auth_service::authenticate_user(
        state.users.as_ref(),
        &payload.username,
        &payload.passkey,
    )
    .await?;

    let session = state
        .sessions
        .create_session(user.id, &user.username, &user.roles)
        .await?;
    for cookie in session_cookies(&session, state.secure_cookies) {
        cookies.add(cookie);
    }

    tracing::info!("✅ User logged in: {}", user.id);

    let response = LoginResponse {
        user_id: user.id,
        username: user.username,
        roles: user.roles,
        wrapped_uek: user.wrapped_uek,
        public_key: user.public_key_jwk,
        kdf_salt: state.kdf_salt.clone(),
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Handles refresh: reissues the access token, or rotates the whole pair
/// once the refresh token is past half its lifetime.
pub async fn refresh(State(state): State<AppState>, cookies: Cookies) -> Result<Response> {
    let refresh_token = cookies
        .get(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(AppError::Unauthenticated)?;

    let rotated = match state.sessions.refresh(&refresh_token).await? {
        RefreshOutcome::Reissued(token) => {
            cookies.add(token_cookie(&token, state.secure_cookies));
            false
        }
        RefreshOutcome::Rotated(session) => {
            for cookie in session_cookies(&session, state.secure_cookies) {
                cookies.add(cookie);
            }
            true
        }
    };

    tracing::debug!("Refresh handled (rotated: {})", rotated);
    Ok((StatusCode::OK, Json(RefreshResponse { rotated })).into_response())
}

/// Handles user logout: revokes every session of the user.
///
/// The user is identified by the access token, or by the refresh token
/// when the access token has already expired.
pub async fn logout(State(state): State<AppState>, cookies: Cookies) -> Result<Response> {
    let token = cookies.get(TOKEN_COOKIE).map(|c| c.value().to_string());
    let refresh_token = cookies.get(REFRESH_TOKEN_COOKIE).map(|c| c.value().to_string());

    let mut user_id = None;
    if let Some(token) = token {
        user_id = state.sessions.check_token(&token).await.map(|data| data.user_id);
    }
    if user_id.is_none() {
        if let Some(refresh_token) = refresh_token {
            user_id = state
                .sessions
                .check_refresh_token(&refresh_token)
                .await
                .map(|data| data.user_id);
        }
    }
    let user_id = user_id.ok_or(AppError::Unauthenticated)?;

    tracing::info!("👋 Logout for user: {}", user_id);

    state.sessions.revoke_user_sessions(user_id).await?;
    for cookie in logout_cookies() {
        cookies.add(cookie);
    }

    let response = AuthResponse {
        success: true,
        message: "Logout successful".to_string(),
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Returns the authenticated user.
pub async fn me(
    State(state): State<AppState>,
    Extension(session): Extension<TokenData>,
) -> Result<Json<MeResponse>> {
    let user = state
        .users
        .find_by_id(&session.user_id)
        .await?
        .ok_or(AppError::Unauthenticated)?;

    Ok(Json(MeResponse {
        user_id: user.id,
        username: user.username,
        roles: user.roles,
        public_key: user.public_key_jwk,
    }))
}
