use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity providers the gateway can log users in through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthProvider {
    Google,
    Github,
}

impl AuthProvider {
    pub const ALL: [Self; 2] = [Self::Google, Self::Github];

    /// Registration id used in URLs and configuration (`google`, `github`)
    #[must_use]
    pub const fn registration_id(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Github => "github",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Google => "Google",
            Self::Github => "GitHub",
        }
    }

    /// Parse a registration id, ignoring ASCII case
    #[must_use]
    pub fn from_registration_id(id: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|provider| provider.registration_id().eq_ignore_ascii_case(id.trim()))
    }
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Google => "GOOGLE",
            Self::Github => "GITHUB",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// A locally registered user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Stored as supplied, compared case-insensitively
    pub email: String,
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub provider: AuthProvider,
    pub provider_id: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build an unsaved user from a provider profile
    ///
    /// The id stays nil until the directory assigns one on first save.
    #[must_use]
    pub fn from_profile(email: &str, profile: &ProviderProfile) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::nil(),
            email: email.to_string(),
            name: profile.name.clone(),
            image_url: profile.picture.clone(),
            provider: profile.provider,
            provider_id: profile.subject.clone(),
            role: Role::User,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Identity attributes returned by a provider after a successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider: AuthProvider,
    /// Provider-scoped stable user id
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl ProviderProfile {
    /// The email attribute, if present and not blank
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}

/// Body of `GET /user/me`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub picture_url: String,
}

impl From<&User> for CurrentUserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email.clone(),
            name: user
                .name
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| user.email.clone()),
            picture_url: user.image_url.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}
