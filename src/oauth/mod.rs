//! OAuth2 client side of the login
//!
//! Builds authorization redirects, seals the `state` parameter, and turns a
//! provider callback into a normalized [`ProviderProfile`].

pub mod authorization;
pub mod profile;
pub mod providers;
pub mod state;

pub use authorization::{AuthorizationRequest, AuthorizationRequestCustomizer, SelectAccountPrompt};
pub use profile::{normalize_profile, HttpProfileResolver, ProfileResolver};
pub use providers::{ProviderEndpoints, ProviderRegistry, RegisteredProvider};
pub use state::StateSealer;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{AuthProvider, ProviderProfile};

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("unknown or unconfigured provider: {0}")]
    UnknownProvider(String),
    #[error("invalid OAuth state: {0}")]
    State(String),
    #[error("provider returned an error: {0}")]
    Provider(String),
    #[error("token exchange failed: {0}")]
    TokenExchange(String),
    #[error("user info request failed: {0}")]
    UserInfo(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl OAuthError {
    /// Error code shown on the login page
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownProvider(_) => "unsupported_provider",
            Self::State(_) => "invalid_state",
            Self::Provider(_) => "access_denied",
            Self::TokenExchange(_) | Self::UserInfo(_) | Self::Configuration(_) => {
                "authentication_failed"
            }
        }
    }
}

/// Query parameters of the provider callback
#[derive(Deserialize, Debug, Default)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Login context carried through the provider round trip inside the sealed `state`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OAuthState {
    pub provider: AuthProvider,
    pub csrf: String,
    pub redirect_uri: Option<String>,
    pub issued_at: DateTime<Utc>,
}

impl OAuthState {
    #[must_use]
    pub fn new(provider: AuthProvider, csrf: String, redirect_uri: Option<String>) -> Self {
        Self {
            provider,
            csrf,
            redirect_uri,
            issued_at: Utc::now(),
        }
    }
}

/// First login phase: validate the callback and resolve the provider profile
///
/// # Errors
///
/// Returns an error if:
/// - The provider reported an error or the callback lacks `code`/`state`
/// - The state fails validation or names a different provider
/// - The provider is not configured
/// - Code exchange or user info retrieval fails
pub async fn resolve_provider_profile(
    provider: AuthProvider,
    callback: &OAuthCallback,
    csrf_cookie: Option<&str>,
    registry: &ProviderRegistry,
    sealer: &StateSealer,
    resolver: &dyn ProfileResolver,
) -> Result<(ProviderProfile, OAuthState), OAuthError> {
    if let Some(error) = &callback.error {
        let description = callback.error_description.as_deref().unwrap_or_default();
        return Err(OAuthError::Provider(format!("{error} {description}").trim().to_string()));
    }

    let (Some(code), Some(sealed_state)) = (callback.code.as_deref(), callback.state.as_deref())
    else {
        return Err(OAuthError::Provider(
            "callback is missing code or state".to_string(),
        ));
    };

    let state = sealer.unseal(sealed_state, csrf_cookie)?;
    if state.provider != provider {
        return Err(OAuthError::State(format!(
            "state was issued for {}, callback arrived for {}",
            state.provider, provider
        )));
    }

    let registered = registry
        .get(provider)
        .ok_or_else(|| OAuthError::UnknownProvider(provider.registration_id().to_string()))?;
    let profile = resolver
        .resolve(registered, code, &registry.callback_uri(provider))
        .await?;

    debug!(
        "Resolved {} profile for subject {}",
        profile.provider, profile.subject
    );
    Ok((profile, state))
}
