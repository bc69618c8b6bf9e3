use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::Cookies;

use crate::{error::AppError, session::cookies::TOKEN_COOKIE, state::AppState};

/// A middleware that requires a valid access token cookie.
///
/// On success the token's `TokenData` is inserted as a request extension.
/// Every failure produces the same generic 401.
pub async fn require_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    tracing::debug!("🔐 Checking authentication...");

    let Some(token) = cookies.get(TOKEN_COOKIE).map(|c| c.value().to_string()) else {
        tracing::debug!("❌ No token cookie found");
        return AppError::Unauthenticated.into_response();
    };

    let Some(data) = state.sessions.check_token(&token).await else {
        return AppError::Unauthenticated.into_response();
    };

    tracing::debug!("✅ User authenticated: {}", data.user_id);
    request.extensions_mut().insert(data);

    next.run(request).await
}
