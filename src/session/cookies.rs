use chrono::{DateTime, Utc};
use tower_cookies::cookie::time::{Duration, OffsetDateTime};
use tower_cookies::cookie::SameSite;
use tower_cookies::Cookie;

use crate::models::session::{IssuedSession, IssuedToken};

/// The access token cookie name.
pub const TOKEN_COOKIE: &str = "token";
/// The refresh token cookie name.
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

fn to_offset(at: DateTime<Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(at.timestamp()).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// Creates a HttpOnly, SameSite=Strict cookie expiring at `expires_at`.
fn create_secure_cookie(
    name: &'static str,
    value: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    secure: bool,
) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_path("/");
    if secure {
        cookie.set_secure(true);
    }
    cookie.set_expires(to_offset(expires_at));
    cookie.set_max_age(Duration::seconds((expires_at - issued_at).num_seconds().max(0)));
    cookie
}

/// The `token` and `refreshToken` cookies for a new session.
pub fn session_cookies(session: &IssuedSession, secure: bool) -> [Cookie<'static>; 2] {
    [
        create_secure_cookie(
            TOKEN_COOKIE,
            session.token.clone(),
            session.issued_at,
            session.token_expires_at,
            secure,
        ),
        create_secure_cookie(
            REFRESH_TOKEN_COOKIE,
            session.refresh_token.clone(),
            session.issued_at,
            session.refresh_token_expires_at,
            secure,
        ),
    ]
}

/// The `token` cookie for a reissued access token.
pub fn token_cookie(token: &IssuedToken, secure: bool) -> Cookie<'static> {
    create_secure_cookie(
        TOKEN_COOKIE,
        token.token.clone(),
        token.issued_at,
        token.expires_at,
        secure,
    )
}

/// Cookies that make the client drop both session cookies.
pub fn logout_cookies() -> [Cookie<'static>; 2] {
    [TOKEN_COOKIE, REFRESH_TOKEN_COOKIE].map(|name| {
        let mut cookie = Cookie::new(name, "");
        cookie.set_http_only(true);
        cookie.set_same_site(SameSite::Strict);
        cookie.set_path("/");
        cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
        cookie.set_max_age(Duration::seconds(0));
        cookie
    })
}

/// Renders cookies as `Set-Cookie` header values.
pub fn set_cookie_headers(cookies: &[Cookie<'static>]) -> Vec<String> {
    cookies.iter().map(|cookie| cookie.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn session() -> IssuedSession {
        let now = Utc::now();
        IssuedSession {
            token: "tok".to_string(),
            refresh_token: "ref".to_string(),
            issued_at: now,
            token_expires_at: now + ChronoDuration::seconds(300),
            refresh_token_expires_at: now + ChronoDuration::hours(12),
        }
    }

    #[test]
    fn test_session_cookies_attributes() {
        let [token, refresh] = session_cookies(&session(), false);

        assert_eq!(token.name(), "token");
        assert_eq!(token.value(), "tok");
        assert_eq!(token.http_only(), Some(true));
        assert_eq!(token.same_site(), Some(SameSite::Strict));
        assert_eq!(token.max_age(), Some(Duration::seconds(300)));

        assert_eq!(refresh.name(), "refreshToken");
        assert_eq!(refresh.max_age(), Some(Duration::seconds(12 * 3600)));
    }

    #[test]
    fn test_set_cookie_headers() {
        let headers = set_cookie_headers(&session_cookies(&session(), true));
        assert_eq!(headers.len(), 2);
        assert!(headers[0].starts_with("token=tok"));
        assert!(headers[0].contains("HttpOnly"));
        assert!(headers[0].contains("SameSite=Strict"));
        assert!(headers[0].contains("Secure"));
        assert!(headers[1].starts_with("refreshToken=ref"));
    }

    #[test]
    fn test_logout_cookies_expire_at_epoch() {
        let headers = set_cookie_headers(&logout_cookies());
        assert!(headers[0].starts_with("token=;"));
        assert!(headers[1].starts_with("refreshToken=;"));
        for header in &headers {
            assert!(header.contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
            assert!(header.contains("HttpOnly"));
        }
    }
}
