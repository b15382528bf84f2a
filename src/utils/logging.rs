// Centralized logging for the OAuth login flow
use log::{debug, info, warn};

use crate::models::AuthProvider;

pub struct LoggingHelper;

impl LoggingHelper {
    /// Log OAuth provider initialization start
    pub fn log_oauth_provider_initialization() {
        info!("🔧 Initializing OAuth providers from configuration...");
    }

    /// Log that a provider is disabled
    pub fn log_oauth_provider_disabled(provider_name: &str) {
        info!("⏭️  Provider {provider_name} is disabled, skipping");
    }

    /// Log that a provider is configured
    pub fn log_oauth_provider_configured(provider: AuthProvider, display_name: &str) {
        info!(
            "✅ {display_name} OAuth2 configured ({})",
            provider.registration_id()
        );
    }

    /// Log that a provider is not configured
    pub fn log_oauth_provider_not_configured(display_name: &str) {
        info!("❌ {display_name} OAuth2 not configured - missing client credentials");
    }

    /// Log summary of configured OAuth providers
    pub fn log_oauth_providers_summary(providers: &[AuthProvider]) {
        let names: Vec<&str> = providers.iter().map(|p| p.registration_id()).collect();
        info!("🎯 Configured OAuth providers: {names:?}");
    }

    /// Log OAuth URL building
    pub fn log_oauth_url_built(provider: AuthProvider, scopes: &str, extra_params: &[&str]) {
        debug!(
            "🔍 Built {} authorization URL with scopes: {scopes} and extra params: {extra_params:?}",
            provider.registration_id()
        );
    }

    /// Log token exchange start
    pub fn log_token_exchange_start(provider: AuthProvider) {
        debug!(
            "🔄 Exchanging authorization code for tokens with {}",
            provider.registration_id()
        );
    }

    /// Log token exchange summary without token values
    pub fn log_token_exchange_summary(
        provider: AuthProvider,
        token_type: Option<&str>,
        scope: Option<&str>,
    ) {
        debug!(
            "🔍 Token exchange summary for {}: token_type={}, scope={:?}",
            provider.registration_id(),
            token_type.unwrap_or("unspecified"),
            scope
        );
    }

    /// Log a rejected OAuth state, which may indicate a forged callback
    pub fn log_state_rejected(reason: &str) {
        warn!("🚫 OAuth state rejected: {reason}");
    }

    /// Log session token issuance
    pub fn log_session_issued(subject: &str, jti: &str, target_host: &str) {
        info!("Issued session token {jti} for user {subject}, redirecting to {target_host}");
    }
}
