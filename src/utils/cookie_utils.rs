use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::HttpRequest;

use crate::oauth::state::STATE_MAX_AGE_MINUTES;

/// Cookie holding the CSRF token of an in-flight login
pub const OAUTH_STATE_COOKIE: &str = "streamgate_oauth_state";

/// Short-lived cookie binding the OAuth callback to the browser that started the login
///
/// `SameSite=Lax` so the cookie survives the top-level redirect back from the provider.
#[must_use]
pub fn create_state_cookie(csrf_token: &str, secure: bool) -> Cookie<'static> {
    Cookie::build(OAUTH_STATE_COOKIE, csrf_token.to_owned())
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::minutes(STATE_MAX_AGE_MINUTES))
        .finish()
}

/// Create an expired cookie to clear a specific cookie
#[must_use]
pub fn create_expired_cookie(name: &str, secure: bool) -> Cookie<'static> {
    Cookie::build(name.to_owned(), "")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::seconds(-1))
        .finish()
}

/// Extract a cookie value from the request
#[must_use]
pub fn extract_cookie_value(req: &HttpRequest, cookie_name: &str) -> Option<String> {
    req.cookie(cookie_name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}
