//! Mock objects and fake implementations for testing

use std::collections::HashMap;

use async_trait::async_trait;

use crate::models::ProviderProfile;
use crate::oauth::{OAuthError, ProfileResolver, RegisteredProvider};

/// Resolves authorization codes to canned profiles
///
/// A code is only accepted by the provider its profile belongs to, the way a
/// real provider rejects codes it did not issue.
#[derive(Debug, Clone, Default)]
pub struct StaticProfileResolver {
    profiles: HashMap<String, ProviderProfile>,
}

impl StaticProfileResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `code` and answer it with `profile`
    #[must_use]
    pub fn with_code(mut self, code: &str, profile: ProviderProfile) -> Self {
        self.profiles.insert(code.to_string(), profile);
        self
    }
}

#[async_trait]
impl ProfileResolver for StaticProfileResolver {
    async fn resolve(
        &self,
        provider: &RegisteredProvider,
        code: &str,
        _redirect_uri: &str,
    ) -> Result<ProviderProfile, OAuthError> {
        self.profiles
            .get(code)
            .filter(|profile| profile.provider == provider.provider)
            .cloned()
            .ok_or_else(|| OAuthError::TokenExchange("invalid_grant".to_string()))
    }
}
