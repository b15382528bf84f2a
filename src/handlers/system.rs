use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::models::HealthResponse;
use crate::oauth::ProviderRegistry;
use crate::VERSION;

const SERVICE_NAME: &str = "streamgate";

#[derive(Deserialize, Debug)]
pub struct LoginPageQuery {
    pub error: Option<String>,
}

/// Service banner
pub async fn index() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "service": SERVICE_NAME,
        "version": VERSION,
        "login": "/login",
    }))
}

/// Health check endpoint
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        version: VERSION,
    })
}

/// Minimal login page listing the configured providers
pub async fn login_page(
    query: web::Query<LoginPageQuery>,
    registry: web::Data<ProviderRegistry>,
) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .insert_header(("Cache-Control", "no-store"))
        .body(render_login_page(&registry, query.error.as_deref()))
}

/// Generic error page; the query is never echoed back
pub async fn error_page() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(page(
            "Error",
            "<p class=\"error\">Something went wrong.</p><p><a href=\"/login\">Back to sign in</a></p>",
        ))
}

/// Banner text for login error codes; unknown codes get a generic message
fn error_message(code: &str) -> &'static str {
    match code {
        "unsupported_provider" => "That sign-in provider is not available.",
        "invalid_state" => "Your sign-in session expired or was tampered with. Please try again.",
        "access_denied" => "Sign-in was cancelled at the provider.",
        "unauthorized_redirect" => "The application you came from is not allowed to receive a session.",
        _ => "Sign-in failed. Please try again.",
    }
}

fn render_login_page(registry: &ProviderRegistry, error: Option<&str>) -> String {
    let banner = error
        .map(|code| format!("<p class=\"error\">{}</p>", error_message(code)))
        .unwrap_or_default();

    let buttons = registry
        .provider_ids()
        .into_iter()
        .filter_map(|provider| registry.get(provider))
        .map(|registered| {
            format!(
                "<a class=\"provider provider-{id}\" href=\"/oauth2/authorization/{id}\">Continue with {name}</a>",
                id = registered.provider.registration_id(),
                name = escape_html(&registered.display_name),
            )
        })
        .collect::<Vec<_>>()
        .join("\n        ");

    page("Sign In", &format!("{banner}\n        {buttons}"))
}

fn page(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} - {SERVICE_NAME}</title>
    <style>{STYLES}</style>
</head>
<body>
    <main>
        <h1>{title}</h1>
        {content}
    </main>
</body>
</html>"#
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

const STYLES: &str = r"
        body { font-family: -apple-system, 'Segoe UI', Roboto, Arial, sans-serif; background: #f5f7fa; display: flex; justify-content: center; padding-top: 10vh; }
        main { background: white; border-radius: 10px; padding: 40px; min-width: 320px; box-shadow: 0 10px 20px rgba(0,0,0,0.08); }
        h1 { font-size: 24px; text-align: center; margin-bottom: 24px; }
        .provider { display: block; padding: 12px; margin-bottom: 12px; border-radius: 6px; text-align: center; text-decoration: none; color: white; }
        .provider-google { background: #4285f4; }
        .provider-github { background: #24292e; }
        .error { color: #b00020; text-align: center; }
";
