//! Authorization code exchange and user info retrieval

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::providers::RegisteredProvider;
use super::OAuthError;
use crate::models::{AuthProvider, ProviderProfile};
use crate::utils::logging::LoggingHelper;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Turns an authorization code into a provider profile
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    async fn resolve(
        &self,
        provider: &RegisteredProvider,
        code: &str,
        redirect_uri: &str,
    ) -> Result<ProviderProfile, OAuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

/// Resolver that talks to the provider over HTTPS
#[derive(Debug, Clone)]
pub struct HttpProfileResolver {
    client: reqwest::Client,
}

impl HttpProfileResolver {
    /// # Errors
    ///
    /// Returns `OAuthError::Configuration` if the HTTP client cannot be built
    pub fn new() -> Result<Self, OAuthError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("streamgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OAuthError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn exchange_code(
        &self,
        provider: &RegisteredProvider,
        code: &str,
        redirect_uri: &str,
    ) -> Result<String, OAuthError> {
        LoggingHelper::log_token_exchange_start(provider.provider);

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", provider.client_id.as_str()),
            ("client_secret", provider.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&provider.endpoints.token_uri)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| OAuthError::TokenExchange(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(OAuthError::TokenExchange(format!(
                "status {status}: {error_text}"
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::TokenExchange(format!("invalid token response: {e}")))?;

        LoggingHelper::log_token_exchange_summary(
            provider.provider,
            token_response.token_type.as_deref(),
            token_response.scope.as_deref(),
        );
        Ok(token_response.access_token)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        uri: &str,
        access_token: &str,
    ) -> Result<T, OAuthError> {
        let response = self
            .client
            .get(uri)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| OAuthError::UserInfo(format!("request to {uri} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OAuthError::UserInfo(format!("{uri} returned status {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| OAuthError::UserInfo(format!("invalid JSON from {uri}: {e}")))
    }

    async fn primary_github_email(
        &self,
        emails_uri: &str,
        access_token: &str,
    ) -> Result<Option<String>, OAuthError> {
        let emails: Vec<GithubEmail> = self.get_json(emails_uri, access_token).await?;
        Ok(emails
            .into_iter()
            .find(|e| e.primary && e.verified)
            .map(|e| e.email))
    }
}

#[async_trait]
impl ProfileResolver for HttpProfileResolver {
    async fn resolve(
        &self,
        provider: &RegisteredProvider,
        code: &str,
        redirect_uri: &str,
    ) -> Result<ProviderProfile, OAuthError> {
        let access_token = self.exchange_code(provider, code, redirect_uri).await?;
        let user_info: Value = self
            .get_json(&provider.endpoints.user_info_uri, &access_token)
            .await?;

        let mut profile = normalize_profile(provider.provider, &user_info)?;
        if profile.email().is_none() {
            if let Some(emails_uri) = &provider.endpoints.emails_uri {
                profile.email = self.primary_github_email(emails_uri, &access_token).await?;
            }
        }
        Ok(profile)
    }
}

/// Map provider-specific user info JSON onto a [`ProviderProfile`]
///
/// An email the provider marks as unverified is treated as absent.
///
/// # Errors
///
/// Returns `OAuthError::UserInfo` if the stable subject id is missing
pub fn normalize_profile(
    provider: AuthProvider,
    user_info: &Value,
) -> Result<ProviderProfile, OAuthError> {
    let text = |key: &str| {
        user_info
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
    };

    match provider {
        AuthProvider::Google => {
            let subject = text("sub")
                .ok_or_else(|| OAuthError::UserInfo("Google profile has no sub".to_string()))?;
            let verified = user_info
                .get("email_verified")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            Ok(ProviderProfile {
                provider,
                subject,
                email: text("email").filter(|_| verified),
                name: text("name"),
                picture: text("picture"),
            })
        }
        AuthProvider::Github => {
            let subject = match user_info.get("id") {
                Some(Value::Number(id)) => id.to_string(),
                Some(Value::String(id)) if !id.is_empty() => id.clone(),
                _ => {
                    return Err(OAuthError::UserInfo(
                        "GitHub profile has no id".to_string(),
                    ))
                }
            };
            Ok(ProviderProfile {
                provider,
                subject,
                email: text("email"),
                name: text("name").or_else(|| text("login")),
                picture: text("avatar_url"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_google_profile() {
        let profile = normalize_profile(
            AuthProvider::Google,
            &json!({
                "sub": "1234567890",
                "email": "a@x.com",
                "email_verified": true,
                "name": "A",
                "picture": "https://lh3.googleusercontent.com/a/p1"
            }),
        )
        .unwrap();

        assert_eq!(profile.subject, "1234567890");
        assert_eq!(profile.email(), Some("a@x.com"));
        assert_eq!(profile.name.as_deref(), Some("A"));
        assert_eq!(
            profile.picture.as_deref(),
            Some("https://lh3.googleusercontent.com/a/p1")
        );
    }

    #[test]
    fn test_google_unverified_email_dropped() {
        let profile = normalize_profile(
            AuthProvider::Google,
            &json!({"sub": "1", "email": "a@x.com", "email_verified": false}),
        )
        .unwrap();
        assert_eq!(profile.email(), None);
    }

    #[test]
    fn test_github_profile_falls_back_to_login() {
        let profile = normalize_profile(
            AuthProvider::Github,
            &json!({
                "id": 583231,
                "login": "octocat",
                "name": null,
                "email": null,
                "avatar_url": "https://avatars.githubusercontent.com/u/583231"
            }),
        )
        .unwrap();

        assert_eq!(profile.subject, "583231");
        assert_eq!(profile.name.as_deref(), Some("octocat"));
        assert_eq!(profile.email(), None);
    }

    #[test]
    fn test_missing_subject_is_error() {
        assert!(matches!(
            normalize_profile(AuthProvider::Google, &json!({"email": "a@x.com"})),
            Err(OAuthError::UserInfo(_))
        ));
        assert!(normalize_profile(AuthProvider::Github, &json!({"login": "x"})).is_err());
    }
}
