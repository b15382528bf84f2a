//! Header forwarding between the gateway and the upstream service

use actix_web::{HttpRequest, HttpResponseBuilder};
use reqwest::RequestBuilder;

use crate::filter::USER_ID_HEADER;
use crate::utils::cookie_utils::OAUTH_STATE_COOKIE;

/// Check if a header is hop-by-hop and must not be forwarded
///
/// Based on RFC 2616 Section 13.5.1
#[must_use]
pub fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Request headers the gateway owns and never passes through from the client
fn is_gateway_owned_header(name: &str) -> bool {
    name == "authorization"
        || name == "host"
        || name == "content-length"
        || name.eq_ignore_ascii_case(USER_ID_HEADER)
}

/// Forward client headers to the upstream request and assert the authenticated user
///
/// The bearer token is not forwarded; upstream services trust `X-User-Id` instead.
pub fn forward_request_headers(
    req: &HttpRequest,
    mut request_builder: RequestBuilder,
    subject: &str,
) -> RequestBuilder {
    for (name, value) in req.headers() {
        let name_str = name.as_str().to_lowercase();
        if is_hop_by_hop_header(&name_str) || is_gateway_owned_header(&name_str) {
            continue;
        }

        if name_str == "cookie" {
            if let Some(filtered) = value.to_str().ok().and_then(filter_gateway_cookies) {
                request_builder = request_builder.header(name.as_str(), filtered);
            }
            continue;
        }

        if let Ok(value_str) = value.to_str() {
            request_builder = request_builder.header(name.as_str(), value_str);
        }
    }

    request_builder.header(USER_ID_HEADER, subject)
}

/// Forward upstream response headers, dropping hop-by-hop headers
pub fn forward_response_headers(
    upstream_response: &reqwest::Response,
    response_builder: &mut HttpResponseBuilder,
) {
    for (name, value) in upstream_response.headers() {
        if is_hop_by_hop_header(name.as_str()) {
            continue;
        }
        if let Ok(value_str) = value.to_str() {
            response_builder.append_header((name.as_str(), value_str));
        }
    }
}

/// Remove the gateway's own cookies from a `Cookie` header value
fn filter_gateway_cookies(cookie_header: &str) -> Option<String> {
    let kept: Vec<&str> = cookie_header
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            pair.split_once('=')
                .map_or(*pair, |(name, _)| name.trim())
                != OAUTH_STATE_COOKIE
        })
        .collect();

    if kept.is_empty() {
        None
    } else {
        Some(kept.join("; "))
    }
}
