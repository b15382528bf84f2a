//! Test fixtures providing pre-built test objects

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Duration;

use crate::app::AppComponents;
use crate::directory::{MemoryUserDirectory, UserDirectory};
use crate::models::{AuthProvider, ProviderProfile, User};
use crate::oauth::ProviderRegistry;
use crate::settings::{AuthSettings, CookieSettings, OAuth2Settings, ProviderSettings, Settings};
use crate::token::TokenCodec;

use super::constants::{
    TEST_EMAIL, TEST_PROVIDER_ID, TEST_REDIRECT_URI, TEST_TOKEN_KEY, TEST_USER_NAME,
};
use super::mock::StaticProfileResolver;

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    /// Authorization code the fixture resolver answers with [`Self::google_profile`]
    pub const GOOGLE_CODE: &'static str = "google-code";

    /// Authorization code the fixture resolver answers with [`Self::github_profile`]
    pub const GITHUB_CODE: &'static str = "github-code";

    /// Settings with both providers configured and one allowed redirect URI
    #[must_use]
    pub fn settings() -> Settings {
        Settings {
            auth: AuthSettings {
                token_secret: STANDARD.encode(TEST_TOKEN_KEY),
                ..AuthSettings::default()
            },
            oauth2: OAuth2Settings {
                authorized_redirect_uris: vec![TEST_REDIRECT_URI.to_string()],
                ..OAuth2Settings::default()
            },
            cookies: CookieSettings { secure: false },
            providers: vec![
                Self::provider_settings("google"),
                Self::provider_settings("github"),
            ],
            ..Settings::default()
        }
    }

    #[must_use]
    pub fn provider_settings(name: &str) -> ProviderSettings {
        ProviderSettings {
            name: name.to_string(),
            client_id: Some(format!("{name}-client-id")),
            client_secret: Some(format!("{name}-client-secret")),
            ..ProviderSettings::default()
        }
    }

    /// Codec matching the secret in [`Self::settings`]
    ///
    /// # Panics
    ///
    /// Panics if the fixture key is rejected
    #[must_use]
    pub fn codec() -> TokenCodec {
        TokenCodec::new(TEST_TOKEN_KEY, Duration::days(1)).expect("fixture key is valid")
    }

    /// # Panics
    ///
    /// Panics if the fixture settings configure no provider
    #[must_use]
    pub fn registry() -> ProviderRegistry {
        ProviderRegistry::from_settings(&Self::settings()).expect("fixture providers are valid")
    }

    #[must_use]
    pub fn google_profile() -> ProviderProfile {
        ProviderProfile {
            provider: AuthProvider::Google,
            subject: TEST_PROVIDER_ID.to_string(),
            email: Some(TEST_EMAIL.to_string()),
            name: Some(TEST_USER_NAME.to_string()),
            picture: Some("https://lh3.googleusercontent.com/a/test".to_string()),
        }
    }

    /// GitHub profile asserting the same email as [`Self::google_profile`]
    #[must_use]
    pub fn github_profile() -> ProviderProfile {
        ProviderProfile {
            provider: AuthProvider::Github,
            subject: "583231".to_string(),
            email: Some(TEST_EMAIL.to_string()),
            name: Some("octocat".to_string()),
            picture: None,
        }
    }

    #[must_use]
    pub fn user() -> User {
        User::from_profile(TEST_EMAIL, &Self::google_profile())
    }

    /// Resolver answering [`Self::GOOGLE_CODE`] and [`Self::GITHUB_CODE`]
    #[must_use]
    pub fn profile_resolver() -> StaticProfileResolver {
        StaticProfileResolver::new()
            .with_code(Self::GOOGLE_CODE, Self::google_profile())
            .with_code(Self::GITHUB_CODE, Self::github_profile())
    }

    /// Fully wired components over an empty in-memory directory
    ///
    /// # Panics
    ///
    /// Panics if the fixture settings cannot be assembled
    #[must_use]
    pub fn components() -> AppComponents {
        Self::components_with(Self::settings())
    }

    /// # Panics
    ///
    /// Panics if `settings` cannot be assembled
    #[must_use]
    pub fn components_with(settings: Settings) -> AppComponents {
        let directory: Arc<dyn UserDirectory> = Arc::new(MemoryUserDirectory::new());
        AppComponents::assemble(settings, directory, Arc::new(Self::profile_resolver()))
            .expect("fixture components assemble")
    }
}
