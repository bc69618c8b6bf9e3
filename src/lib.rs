//! End-to-end encrypted chat key management and session tokens.
//!
//! The client side derives a wrapping key from credentials, generates a
//! P-521 key pair, stores the private half wrapped on the server, and
//! derives per-conversation AES keys with ECDH. The server side issues,
//! checks, rotates and revokes HMAC-signed access/refresh tokens.

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_cookies::CookieManagerLayer;

pub mod config;
pub mod encoding;
pub mod error;
pub mod state;

pub mod crypto {
    pub mod aes;
    pub mod kdf;
    pub mod keys;
    pub mod message;
    pub mod shared;
    pub mod uek;
}

pub mod models {
    pub mod message;
    pub mod session;
    pub mod user;
}

pub mod repositories {
    pub mod user;
}

pub mod session {
    pub mod clock;
    pub mod cookies;
    pub mod index;
    pub mod redis_index;
    pub mod store;
    pub mod token;
}

pub mod services {
    pub mod auth;
    pub mod client;
}

pub mod handlers {
    pub mod auth;
    pub mod users;
}

pub mod middleware_layer {
    pub mod auth;
}

pub mod validation {
    pub mod auth;
}

use state::AppState;

/// Routes that establish a session; the binary rate limits these.
pub fn credential_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/signup", post(handlers::auth::signup))
        .route("/api/auth/login", post(handlers::auth::login))
        .with_state(state)
}

/// Every other route, with the cookie layer applied.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/kdf-salt", get(handlers::auth::kdf_salt))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/auth/me", get(handlers::auth::me))
        .route(
            "/api/users/{username}/public-key",
            get(handlers::users::public_key),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
}

/// The full application without rate limiting, as used by tests.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(credential_routes(state.clone()))
        .merge(router(state))
        .layer(CookieManagerLayer::new())
}
