use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};
use log::{debug, warn};
use reqwest::Client;
use url::Url;

use crate::filter::AuthenticatedUser;
use crate::settings::Settings;
use crate::utils::headers::{forward_request_headers, forward_response_headers};
use crate::utils::responses::ApiError;

/// HTTP client for making upstream requests
static CLIENT: std::sync::LazyLock<Client> = std::sync::LazyLock::new(Client::new);

/// Forward an authenticated request to the configured upstream service
///
/// Without an upstream every unrouted path is a 404.
///
/// # Errors
///
/// Returns an error if:
/// - No upstream is configured (`NotFound`)
/// - The upstream URL cannot be built (`BadRequest`)
/// - The upstream is unreachable or its body cannot be read (`BadGateway`)
pub async fn proxy_upstream(
    req: HttpRequest,
    user: AuthenticatedUser,
    body: web::Bytes,
    settings: web::Data<Settings>,
) -> Result<HttpResponse, ApiError> {
    let Some(upstream) = settings.proxy.upstream_url.as_deref() else {
        return Err(ApiError::NotFound);
    };

    let upstream_url = build_upstream_url(upstream, req.path(), req.query_string())?;
    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|_| ApiError::BadRequest("unsupported method".to_string()))?;

    debug!("Proxying {} {} for user {}", method, req.path(), user.subject);
    let mut request_builder = CLIENT.request(method, upstream_url);
    request_builder = forward_request_headers(&req, request_builder, &user.subject);
    if !body.is_empty() {
        request_builder = request_builder.body(body.to_vec());
    }

    let upstream_response = request_builder.send().await.map_err(|e| {
        warn!("Upstream request failed: {e}");
        ApiError::BadGateway
    })?;

    let status = StatusCode::from_u16(upstream_response.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response_builder = HttpResponse::build(status);
    forward_response_headers(&upstream_response, &mut response_builder);

    let response_body = upstream_response.bytes().await.map_err(|e| {
        warn!("Failed to read upstream response: {e}");
        ApiError::BadGateway
    })?;

    Ok(response_builder.body(response_body))
}

/// Join the request path and query onto the upstream base URL
///
/// # Errors
///
/// Returns `ApiError::BadRequest` if the base is invalid or the path tries to
/// escape it
pub fn build_upstream_url(base_url: &str, path: &str, query: &str) -> Result<Url, ApiError> {
    let base = Url::parse(base_url).map_err(|e| {
        warn!("Failed to parse upstream URL '{base_url}': {e}");
        ApiError::BadRequest("invalid upstream URL".to_string())
    })?;

    let decoded = urlencoding::decode(path).map_or_else(|_| path.to_string(), |p| p.into_owned());
    if decoded.split('/').any(|segment| segment == "..") || decoded.contains('\\') {
        warn!("Rejected upstream path with traversal: {path}");
        return Err(ApiError::BadRequest("invalid path".to_string()));
    }

    let mut url = base
        .join(path.trim_start_matches('/'))
        .map_err(|_| ApiError::BadRequest("invalid path".to_string()))?;
    if url.origin() != base.origin() {
        return Err(ApiError::BadRequest("invalid path".to_string()));
    }
    url.set_query((!query.is_empty()).then_some(query));
    Ok(url)
}
