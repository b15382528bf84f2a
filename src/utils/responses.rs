//! HTTP response helpers
//!
//! JSON error bodies, the `ApiError` type handlers return, and redirect
//! builders shared by the OAuth handlers.

use actix_web::{cookie::Cookie, http::header, http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Pre-serialized bodies for the responses sent on every rejected request
static CACHED_RESPONSES: std::sync::LazyLock<CachedResponses> =
    std::sync::LazyLock::new(CachedResponses::new);

struct CachedResponses {
    not_authenticated: String,
    not_found: String,
}

impl CachedResponses {
    fn new() -> Self {
        Self {
            not_authenticated: json!({ "error": "Not authenticated" }).to_string(),
            not_found: json!({ "error": "Not found" }).to_string(),
        }
    }
}

/// Login page the OAuth handlers send failed logins back to
pub const LOGIN_PAGE_PATH: &str = "/login";

/// Errors returned by JSON endpoints
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Not found")]
    NotFound,
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Upstream unavailable")]
    BadGateway,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::BadGateway => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            Self::NotAuthenticated => ResponseBuilder::not_authenticated(),
            Self::NotFound => ResponseBuilder::json_body(
                StatusCode::NOT_FOUND,
                CACHED_RESPONSES.not_found.clone(),
            ),
            // Internal details stay in the logs
            Self::Internal(_) => ResponseBuilder::json_body(
                self.status_code(),
                json!({ "error": "Internal server error" }).to_string(),
            ),
            Self::BadRequest(_) | Self::BadGateway => ResponseBuilder::json_body(
                self.status_code(),
                json!({ "error": self.to_string() }).to_string(),
            ),
        }
    }
}

pub struct ResponseBuilder;

impl ResponseBuilder {
    /// 401 with the body every unauthenticated request receives
    #[must_use]
    pub fn not_authenticated() -> HttpResponse {
        Self::json_body(
            StatusCode::UNAUTHORIZED,
            CACHED_RESPONSES.not_authenticated.clone(),
        )
    }

    fn json_body(status: StatusCode, body: String) -> HttpResponse {
        HttpResponse::build(status)
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .body(body)
    }

    /// 302 to `location`, setting the given cookies
    #[must_use]
    pub fn redirect_with_cookies(location: &str, cookies: Vec<Cookie<'static>>) -> HttpResponse {
        let mut builder = HttpResponse::Found();
        for cookie in cookies {
            builder.cookie(cookie);
        }
        builder
            .insert_header((header::LOCATION, location.to_string()))
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .finish()
    }

    /// 302 to the login page with an `error` code and no token
    #[must_use]
    pub fn login_error_redirect(error_code: &str, cookies: Vec<Cookie<'static>>) -> HttpResponse {
        let location = format!(
            "{LOGIN_PAGE_PATH}?error={}",
            urlencoding::encode(error_code)
        );
        Self::redirect_with_cookies(&location, cookies)
    }
}
