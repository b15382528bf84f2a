//! Wiring: shared components built once from settings and the route table

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::http::{header::HeaderName, Method};
use actix_web::web;
use log::{info, warn};

use crate::directory::{MemoryUserDirectory, UserDirectory};
use crate::handlers;
use crate::login::LoginSuccessHandler;
use crate::oauth::{HttpProfileResolver, ProfileResolver, ProviderRegistry, StateSealer};
use crate::reconcile::{IdentityReconciler, LinkPolicy};
use crate::settings::{CorsSettings, Settings};
use crate::token::TokenCodec;

/// Everything the handlers and the filter share, ready to hand to each worker
#[derive(Clone)]
pub struct AppComponents {
    pub settings: web::Data<Settings>,
    pub codec: web::Data<TokenCodec>,
    pub registry: web::Data<ProviderRegistry>,
    pub sealer: web::Data<StateSealer>,
    pub directory: web::Data<dyn UserDirectory>,
    pub resolver: web::Data<dyn ProfileResolver>,
    pub reconciler: web::Data<IdentityReconciler>,
    pub login: web::Data<LoginSuccessHandler>,
}

impl AppComponents {
    /// Build all components from validated settings
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The token secret is unusable
    /// - No OAuth provider is configured
    /// - The directory snapshot cannot be loaded
    /// - The outbound HTTP client cannot be built
    pub async fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let directory: Arc<dyn UserDirectory> = match &settings.directory.snapshot_path {
            Some(path) => {
                let directory = MemoryUserDirectory::open(path).await?;
                info!("Loaded {} users from {path}", directory.len().await);
                Arc::new(directory)
            }
            None => {
                warn!("No directory snapshot configured; users are kept in memory only");
                Arc::new(MemoryUserDirectory::new())
            }
        };
        let resolver: Arc<dyn ProfileResolver> = Arc::new(HttpProfileResolver::new()?);

        Self::assemble(settings, directory, resolver)
    }

    /// Build components around an explicit directory and profile resolver
    ///
    /// # Errors
    ///
    /// Returns an error if the token secret is unusable or no OAuth provider is configured
    pub fn assemble(
        settings: Settings,
        directory: Arc<dyn UserDirectory>,
        resolver: Arc<dyn ProfileResolver>,
    ) -> anyhow::Result<Self> {
        let key = settings.auth.token_key()?;
        let codec = TokenCodec::from_settings(&settings.auth)?;
        let sealer = StateSealer::new(&key);
        let registry = ProviderRegistry::from_settings(&settings)?;
        let reconciler = IdentityReconciler::new(
            Arc::clone(&directory),
            LinkPolicy::from_require_match(settings.oauth2.require_provider_match),
        );
        let login = LoginSuccessHandler::from_settings(codec.clone(), &settings.oauth2);

        Ok(Self {
            settings: web::Data::new(settings),
            codec: web::Data::new(codec),
            registry: web::Data::new(registry),
            sealer: web::Data::new(sealer),
            directory: web::Data::from(directory),
            resolver: web::Data::from(resolver),
            reconciler: web::Data::new(reconciler),
            login: web::Data::new(login),
        })
    }

    /// Register shared state and routes
    ///
    /// Unrouted paths fall through to the upstream proxy.
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(self.settings.clone())
            .app_data(self.codec.clone())
            .app_data(self.registry.clone())
            .app_data(self.sealer.clone())
            .app_data(self.directory.clone())
            .app_data(self.resolver.clone())
            .app_data(self.reconciler.clone())
            .app_data(self.login.clone())
            .route("/", web::get().to(handlers::index))
            .route("/ping", web::get().to(handlers::health))
            .route("/login", web::get().to(handlers::login_page))
            .route("/error", web::get().to(handlers::error_page))
            .route(
                "/oauth2/authorization/{provider}",
                web::get().to(handlers::oauth_authorize),
            )
            .route(
                "/login/oauth2/code/{provider}",
                web::get().to(handlers::oauth_callback),
            )
            .route("/user/me", web::get().to(handlers::current_user))
            .default_service(web::to(handlers::proxy_upstream));
    }
}

/// CORS policy from settings; `*` allows any origin or header
#[must_use]
pub fn build_cors(settings: &CorsSettings) -> Cors {
    let mut cors = Cors::default();

    if settings.allowed_origins.iter().any(|origin| origin == "*") {
        cors = cors.allow_any_origin();
    } else {
        let origins = settings.allowed_origins.clone();
        cors = cors.allowed_origin_fn(move |origin, _| {
            origin
                .to_str()
                .is_ok_and(|origin| origins.iter().any(|allowed| allowed == origin))
        });
    }

    let methods: Vec<Method> = settings
        .allowed_methods
        .iter()
        .filter_map(|method| Method::from_bytes(method.trim().to_uppercase().as_bytes()).ok())
        .collect();
    cors = cors.allowed_methods(methods);

    if settings.allowed_headers.iter().any(|header| header == "*") {
        cors = cors.allow_any_header();
    } else {
        let headers: Vec<HeaderName> = settings
            .allowed_headers
            .iter()
            .filter_map(|header| HeaderName::from_bytes(header.trim().as_bytes()).ok())
            .collect();
        cors = cors.allowed_headers(headers);
    }

    if settings.allow_credentials {
        cors = cors.supports_credentials();
    }
    cors.max_age(settings.max_age_secs)
}
