//! Provider registry
//!
//! Resolves `[[providers]]` settings into endpoints and client credentials for
//! each supported identity provider.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use super::authorization::{AuthorizationRequest, AuthorizationRequestCustomizer, SelectAccountPrompt};
use super::OAuthError;
use crate::models::AuthProvider;
use crate::settings::{ProviderSettings, Settings};
use crate::utils::logging::LoggingHelper;

/// Endpoints and default scopes of a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub authorization_uri: String,
    pub token_uri: String,
    pub user_info_uri: String,
    /// Secondary email listing, used when the profile omits a private email
    pub emails_uri: Option<String>,
    pub scopes: Vec<String>,
}

impl ProviderEndpoints {
    #[must_use]
    pub fn defaults_for(provider: AuthProvider) -> Self {
        match provider {
            AuthProvider::Google => Self {
                authorization_uri: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_uri: "https://oauth2.googleapis.com/token".to_string(),
                user_info_uri: "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
                emails_uri: None,
                scopes: vec![
                    "openid".to_string(),
                    "email".to_string(),
                    "profile".to_string(),
                ],
            },
            AuthProvider::Github => Self {
                authorization_uri: "https://github.com/login/oauth/authorize".to_string(),
                token_uri: "https://github.com/login/oauth/access_token".to_string(),
                user_info_uri: "https://api.github.com/user".to_string(),
                emails_uri: Some("https://api.github.com/user/emails".to_string()),
                scopes: vec!["read:user".to_string(), "user:email".to_string()],
            },
        }
    }
}

/// A provider with resolved credentials
#[derive(Clone)]
pub struct RegisteredProvider {
    pub provider: AuthProvider,
    pub display_name: String,
    pub client_id: String,
    pub client_secret: String,
    pub endpoints: ProviderEndpoints,
    pub extra_auth_params: BTreeMap<String, String>,
}

impl fmt::Debug for RegisteredProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredProvider")
            .field("provider", &self.provider)
            .field("display_name", &self.display_name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("endpoints", &self.endpoints)
            .field("extra_auth_params", &self.extra_auth_params)
            .finish()
    }
}

impl RegisteredProvider {
    /// Resolve provider settings, returning `None` when client credentials are missing
    ///
    /// # Errors
    ///
    /// Returns `OAuthError::Configuration` for an unsupported provider name
    pub fn from_settings(settings: &ProviderSettings) -> Result<Option<Self>, OAuthError> {
        let provider = AuthProvider::from_registration_id(&settings.name).ok_or_else(|| {
            OAuthError::Configuration(format!("Unsupported provider: {}", settings.name))
        })?;
        let display_name = settings
            .display_name
            .clone()
            .unwrap_or_else(|| provider.display_name().to_string());

        let (Some(client_id), Some(client_secret)) =
            (settings.get_client_id(), settings.get_client_secret())
        else {
            LoggingHelper::log_oauth_provider_not_configured(&display_name);
            return Ok(None);
        };

        let mut endpoints = ProviderEndpoints::defaults_for(provider);
        if let Some(uri) = &settings.authorization_endpoint {
            endpoints.authorization_uri.clone_from(uri);
        }
        if let Some(uri) = &settings.token_endpoint {
            endpoints.token_uri.clone_from(uri);
        }
        if let Some(uri) = &settings.userinfo_endpoint {
            endpoints.user_info_uri.clone_from(uri);
        }
        if !settings.scopes.is_empty() {
            endpoints.scopes.clone_from(&settings.scopes);
        }

        LoggingHelper::log_oauth_provider_configured(provider, &display_name);
        Ok(Some(Self {
            provider,
            display_name,
            client_id,
            client_secret,
            endpoints,
            extra_auth_params: settings.extra_auth_params.clone(),
        }))
    }
}

/// Configured providers plus the customizers applied to every authorization request
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<AuthProvider, RegisteredProvider>,
    public_base_url: String,
    customizers: Vec<Arc<dyn AuthorizationRequestCustomizer>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers)
            .field("public_base_url", &self.public_base_url)
            .field("customizers", &self.customizers.len())
            .finish()
    }
}

impl ProviderRegistry {
    /// Registry with the account chooser customizer installed
    #[must_use]
    pub fn new(public_base_url: &str) -> Self {
        Self {
            providers: HashMap::new(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            customizers: vec![Arc::new(SelectAccountPrompt)],
        }
    }

    /// Build the registry from settings
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A provider name is not supported
    /// - The same provider is configured twice
    /// - No enabled provider has client credentials
    pub fn from_settings(settings: &Settings) -> Result<Self, OAuthError> {
        LoggingHelper::log_oauth_provider_initialization();
        let mut registry = Self::new(&settings.application.public_base_url);

        for provider_settings in &settings.providers {
            if !provider_settings.enabled {
                LoggingHelper::log_oauth_provider_disabled(&provider_settings.name);
                continue;
            }
            if let Some(provider) = RegisteredProvider::from_settings(provider_settings)? {
                if registry.providers.contains_key(&provider.provider) {
                    return Err(OAuthError::Configuration(format!(
                        "Provider {} is configured more than once",
                        provider.provider.registration_id()
                    )));
                }
                registry.register(provider);
            }
        }

        if registry.providers.is_empty() {
            return Err(OAuthError::Configuration(
                "No OAuth providers are configured".to_string(),
            ));
        }

        LoggingHelper::log_oauth_providers_summary(&registry.provider_ids());
        Ok(registry)
    }

    pub fn register(&mut self, provider: RegisteredProvider) {
        self.providers.insert(provider.provider, provider);
    }

    /// Append a customizer; customizers run in registration order
    #[must_use]
    pub fn with_customizer(mut self, customizer: Arc<dyn AuthorizationRequestCustomizer>) -> Self {
        self.customizers.push(customizer);
        self
    }

    #[must_use]
    pub fn get(&self, provider: AuthProvider) -> Option<&RegisteredProvider> {
        self.providers.get(&provider)
    }

    /// Configured providers in a stable order
    #[must_use]
    pub fn provider_ids(&self) -> Vec<AuthProvider> {
        AuthProvider::ALL
            .into_iter()
            .filter(|p| self.providers.contains_key(p))
            .collect()
    }

    /// Callback URL registered with the provider
    #[must_use]
    pub fn callback_uri(&self, provider: AuthProvider) -> String {
        format!(
            "{}/login/oauth2/code/{}",
            self.public_base_url,
            provider.registration_id()
        )
    }

    /// Build the outbound authorization request for `provider`
    ///
    /// Provider `extra_auth_params` are applied first, then every customizer.
    ///
    /// # Errors
    ///
    /// Returns `OAuthError::UnknownProvider` if the provider is not configured
    pub fn authorization_request(
        &self,
        provider: AuthProvider,
        state: &str,
    ) -> Result<AuthorizationRequest, OAuthError> {
        let registered = self
            .get(provider)
            .ok_or_else(|| OAuthError::UnknownProvider(provider.registration_id().to_string()))?;

        let request = AuthorizationRequest {
            authorization_uri: registered.endpoints.authorization_uri.clone(),
            client_id: registered.client_id.clone(),
            redirect_uri: self.callback_uri(provider),
            scopes: registered.endpoints.scopes.clone(),
            state: state.to_string(),
            additional_parameters: registered.extra_auth_params.clone(),
        };

        let request = self
            .customizers
            .iter()
            .fold(request, |request, customizer| customizer.customize(request));

        let extra: Vec<&str> = request
            .additional_parameters
            .keys()
            .map(String::as_str)
            .collect();
        LoggingHelper::log_oauth_url_built(provider, &request.scopes.join(" "), &extra);
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn google_settings() -> ProviderSettings {
        ProviderSettings {
            name: "google".to_string(),
            client_id: Some("test_client_id".to_string()),
            client_secret: Some("test_client_secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_provider_config_creation() {
        let provider = RegisteredProvider::from_settings(&google_settings())
            .unwrap()
            .unwrap();
        assert_eq!(provider.provider, AuthProvider::Google);
        assert_eq!(provider.client_id, "test_client_id");
        assert_eq!(provider.display_name, "Google");
        assert_eq!(provider.endpoints.scopes, vec!["openid", "email", "profile"]);
        assert!(!format!("{provider:?}").contains("test_client_secret"));
    }

    #[test]
    fn test_missing_credentials_skips_provider() {
        let settings = ProviderSettings {
            client_secret: None,
            ..google_settings()
        };
        assert!(RegisteredProvider::from_settings(&settings).unwrap().is_none());
    }

    #[test]
    fn test_unsupported_provider_rejected() {
        let settings = ProviderSettings {
            name: "apple".to_string(),
            ..google_settings()
        };
        assert!(matches!(
            RegisteredProvider::from_settings(&settings),
            Err(OAuthError::Configuration(_))
        ));
    }

    #[test]
    fn test_endpoint_overrides() {
        let settings = ProviderSettings {
            token_endpoint: Some("http://127.0.0.1:9999/token".to_string()),
            scopes: vec!["email".to_string()],
            ..google_settings()
        };
        let provider = RegisteredProvider::from_settings(&settings).unwrap().unwrap();
        assert_eq!(provider.endpoints.token_uri, "http://127.0.0.1:9999/token");
        assert_eq!(
            provider.endpoints.authorization_uri,
            "https://accounts.google.com/o/oauth2/v2/auth"
        );
        assert_eq!(provider.endpoints.scopes, vec!["email"]);
    }

    #[test]
    fn test_registry_from_settings() {
        let mut settings = Settings::default();
        settings.application.public_base_url = "https://gateway.example.com/".to_string();
        settings.providers = vec![
            google_settings(),
            ProviderSettings {
                name: "github".to_string(),
                enabled: false,
                ..google_settings()
            },
        ];

        let registry = ProviderRegistry::from_settings(&settings).unwrap();
        assert_eq!(registry.provider_ids(), vec![AuthProvider::Google]);
        assert_eq!(
            registry.callback_uri(AuthProvider::Google),
            "https://gateway.example.com/login/oauth2/code/google"
        );
    }

    #[test]
    fn test_registry_requires_a_provider() {
        let settings = Settings::default();
        assert!(ProviderRegistry::from_settings(&settings).is_err());
    }

    #[test]
    fn test_authorization_request_runs_customizers_last() {
        let mut google_with_prompt = google_settings();
        google_with_prompt
            .extra_auth_params
            .insert("prompt".to_string(), "consent".to_string());
        google_with_prompt
            .extra_auth_params
            .insert("access_type".to_string(), "offline".to_string());

        let mut registry = ProviderRegistry::new("http://localhost:8080");
        registry.register(
            RegisteredProvider::from_settings(&google_with_prompt)
                .unwrap()
                .unwrap(),
        );

        let request = registry
            .authorization_request(AuthProvider::Google, "sealed-state")
            .unwrap();
        assert_eq!(
            request.additional_parameters.get("prompt").map(String::as_str),
            Some("select_account")
        );
        assert_eq!(
            request.additional_parameters.get("access_type").map(String::as_str),
            Some("offline")
        );
        assert_eq!(
            request.redirect_uri,
            "http://localhost:8080/login/oauth2/code/google"
        );

        assert!(matches!(
            registry.authorization_request(AuthProvider::Github, "s"),
            Err(OAuthError::UnknownProvider(_))
        ));
    }

    struct LoginHint(&'static str);

    impl AuthorizationRequestCustomizer for LoginHint {
        fn customize(&self, mut request: AuthorizationRequest) -> AuthorizationRequest {
            request
                .additional_parameters
                .insert("login_hint".to_string(), self.0.to_string());
            request
        }
    }

    #[test]
    fn test_additional_customizers_run_in_order() {
        let mut registry = ProviderRegistry::new("http://localhost:8080")
            .with_customizer(Arc::new(LoginHint("a@x.com")));
        registry.register(RegisteredProvider::from_settings(&google_settings()).unwrap().unwrap());

        let request = registry
            .authorization_request(AuthProvider::Google, "sealed-state")
            .unwrap();
        assert_eq!(
            request.additional_parameters.get("login_hint").map(String::as_str),
            Some("a@x.com")
        );
        assert_eq!(
            request.additional_parameters.get("prompt").map(String::as_str),
            Some("select_account")
        );
    }
}
