//! HTTP request builders for testing handlers

use actix_web::cookie::Cookie;
use actix_web::http::header::AUTHORIZATION;
use actix_web::http::Method;
use actix_web::test;

use crate::utils::cookie_utils::OAUTH_STATE_COOKIE;

/// Builder for creating HTTP requests for testing
pub struct RequestBuilder {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    cookies: Vec<Cookie<'static>>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            method: Method::GET,
            uri: "/".to_string(),
            headers: Vec::new(),
            cookies: Vec::new(),
        }
    }

    /// GET request to `uri`
    #[must_use]
    pub fn get(uri: &str) -> Self {
        Self::new().uri(uri)
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn uri(mut self, uri: &str) -> Self {
        self.uri = uri.to_string();
        self
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Add `Authorization: Bearer <token>`
    #[must_use]
    pub fn bearer(self, token: &str) -> Self {
        self.header(AUTHORIZATION.as_str(), &format!("Bearer {token}"))
    }

    #[must_use]
    pub fn with_cookie(mut self, cookie: Cookie<'static>) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// Add the CSRF cookie the authorization redirect would have set
    #[must_use]
    pub fn with_state_cookie(self, csrf: &str) -> Self {
        self.with_cookie(Cookie::new(OAUTH_STATE_COOKIE, csrf.to_string()))
    }

    /// Finish into a `TestRequest`; call `.to_request()` on it for `test::call_service`
    #[must_use]
    pub fn finish(self) -> test::TestRequest {
        let mut req = test::TestRequest::default()
            .method(self.method)
            .uri(&self.uri);

        for (name, value) in self.headers {
            req = req.insert_header((name, value));
        }
        for cookie in self.cookies {
            req = req.cookie(cookie);
        }
        req
    }

    /// Build an `HttpRequest` for calling helpers directly
    #[must_use]
    pub fn build(self) -> actix_web::HttpRequest {
        self.finish().to_http_request()
    }
}
