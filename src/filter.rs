//! Per-request session token verification
//!
//! Every request outside the public routes must carry
//! `Authorization: Bearer <token>`. A valid token puts the subject into the
//! request extensions as [`AuthenticatedUser`] and into the `X-User-Id`
//! header for upstream services; anything else is answered with 401.

use std::future::{ready, Ready};

use actix_web::{
    body::{EitherBody, MessageBody},
    dev::{Payload, ServiceRequest, ServiceResponse},
    http::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION},
    middleware::Next,
    web, Error, FromRequest, HttpMessage, HttpRequest,
};
use log::{debug, error};

use crate::token::TokenCodec;
use crate::utils::responses::{ApiError, ResponseBuilder};

/// Header carrying the authenticated user id to upstream services
pub const USER_ID_HEADER: &str = "X-User-Id";

const BEARER_PREFIX: &str = "bearer ";

/// Authentication outcome of a single request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated(String),
}

/// Principal established by the filter, available to handlers as an extractor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub subject: String,
}

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Self>()
                .cloned()
                .ok_or(ApiError::NotAuthenticated),
        )
    }
}

/// Routes reachable without a session token
#[must_use]
pub fn is_public_path(path: &str) -> bool {
    path == "/"
        || path == "/ping"
        || path.starts_with("/login")
        || path.starts_with("/error")
        || path == "/oauth2"
        || path.starts_with("/oauth2/")
}

/// Extract the token from an `Authorization: Bearer` header
///
/// The scheme is matched case-insensitively; an empty token counts as absent.
#[must_use]
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let prefix = value.get(..BEARER_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(BEARER_PREFIX) {
        return None;
    }
    let token = value[BEARER_PREFIX.len()..].trim();
    (!token.is_empty()).then_some(token)
}

/// Decide the authentication state of a request from its headers
///
/// Verification failures are logged at debug and reported only as
/// `Unauthenticated`.
#[must_use]
pub fn resolve_auth_state(headers: &HeaderMap, codec: &TokenCodec) -> AuthState {
    let Some(token) = extract_bearer_token(headers) else {
        return AuthState::Unauthenticated;
    };

    match codec.verify(token) {
        Ok(subject) => AuthState::Authenticated(subject),
        Err(e) => {
            debug!("Rejected bearer token: {}", e.kind());
            AuthState::Unauthenticated
        }
    }
}

/// Middleware enforcing session tokens on protected routes
///
/// Install with `actix_web::middleware::from_fn(authenticate_request)`; the
/// [`TokenCodec`] must be registered as `web::Data`.
///
/// # Errors
///
/// Propagates errors from the wrapped service
pub async fn authenticate_request<B: MessageBody + 'static>(
    mut req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error> {
    if is_public_path(req.path()) {
        return next.call(req).await.map(ServiceResponse::map_into_left_body);
    }

    let user_id_header = HeaderName::from_static("x-user-id");
    req.headers_mut().remove(&user_id_header);

    let Some(codec) = req.app_data::<web::Data<TokenCodec>>().cloned() else {
        error!("TokenCodec is not registered; rejecting {}", req.path());
        return Ok(req
            .into_response(ResponseBuilder::not_authenticated())
            .map_into_right_body());
    };

    match resolve_auth_state(req.headers(), &codec) {
        AuthState::Authenticated(subject) => {
            if let Ok(value) = HeaderValue::from_str(&subject) {
                req.headers_mut().insert(user_id_header, value);
            }
            req.extensions_mut().insert(AuthenticatedUser { subject });
            next.call(req).await.map(ServiceResponse::map_into_left_body)
        }
        AuthState::Unauthenticated => {
            debug!("Unauthenticated request to {}", req.path());
            Ok(req
                .into_response(ResponseBuilder::not_authenticated())
                .map_into_right_body())
        }
    }
}
