#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use actix_web::{middleware::from_fn, middleware::Logger, App, HttpServer};
use anyhow::Context;
use streamgate::{authenticate_request, build_cors, settings::Settings, AppComponents};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = Settings::load().context("Failed to load settings")?;

    let components = AppComponents::from_settings(settings)
        .await
        .context("Failed to initialize components")?;

    start_server(components).await
}

/// Start the server
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(components: AppComponents) -> anyhow::Result<()> {
    let bind_address = components.settings.get_bind_address();
    print_startup_info(&bind_address, &components);

    HttpServer::new(move || {
        App::new()
            .wrap(from_fn(authenticate_request))
            .wrap(build_cors(&components.settings.cors))
            .wrap(Logger::default())
            .configure(|cfg| components.configure(cfg))
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {bind_address}"))?
    .run()
    .await
    .context("Server terminated with an error")
}

fn print_startup_info(bind_address: &str, components: &AppComponents) {
    let settings = &components.settings;
    println!("Starting streamgate {} on http://{bind_address}", streamgate::VERSION);
    println!();
    println!("OAuth2 endpoints:");
    println!("  GET  /oauth2/authorization/{{provider}}?redirect_uri=... - Start login");
    println!("  GET  /login/oauth2/code/{{provider}}                    - Provider callback");
    println!("  GET  /login                                           - Login page");
    println!();
    println!("Callback URLs to register with identity providers:");
    for provider in components.registry.provider_ids() {
        println!("  {}", components.registry.callback_uri(provider));
    }
    println!();
    println!("Authorized redirect URIs:");
    for uri in &settings.oauth2.authorized_redirect_uris {
        println!("  {uri}");
    }
    println!();
    println!("Protected endpoints (Authorization: Bearer <token>):");
    println!("  GET  /user/me - Current user profile");
    match &settings.proxy.upstream_url {
        Some(upstream) => println!("  ALL  {{any path}} - Proxied to {upstream} with X-User-Id"),
        None => println!("  ALL  {{any path}} - 404 (no upstream configured)"),
    }
    println!();
    println!("System endpoints:");
    println!("  GET  /     - Service banner");
    println!("  GET  /ping - Health check");
}
