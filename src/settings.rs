use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::utils::crypto::generate_secret;

/// Minimum decoded length of the token signing secret (256 bits)
pub const MIN_SECRET_BYTES: usize = 32;

/// Environment variable naming a directory whose `Settings.toml` overrides the local one
pub const SECRETS_DIR_ENV: &str = "STREAMGATE_SECRETS_DIR";

/// Upper bound on token validity (ten years)
const MAX_TOKEN_EXPIRATION_MSEC: u64 = 315_360_000_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Parse(#[from] basic_toml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to initialize logging: {0}")]
    Logger(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub auth: AuthSettings,
    pub oauth2: OAuth2Settings,
    pub cors: CorsSettings,
    pub proxy: ProxySettings,
    pub directory: DirectorySettings,
    pub cookies: CookieSettings,
    pub logging: LoggingSettings,
    pub providers: Vec<ProviderSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    /// Externally visible base URL, used to build provider callback URLs
    pub public_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Base64 encoded HMAC secret; generated at start-up when empty
    pub token_secret: String,
    pub token_expiration_msec: u64,
    pub clock_skew_msec: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuth2Settings {
    pub authorized_redirect_uris: Vec<String>,
    pub default_redirect_uri: Option<String>,
    /// Refuse to log a user in through a provider other than the one that created the account
    pub require_provider_match: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsSettings {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProxySettings {
    /// Protected requests outside the gateway's own routes are forwarded here when set
    pub upstream_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DirectorySettings {
    /// JSON file the in-memory user directory is loaded from and written back to
    pub snapshot_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSettings {
    pub secure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Registration id, `google` or `github`
    pub name: String,
    pub display_name: Option<String>,
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    pub userinfo_endpoint: Option<String>,
    pub scopes: Vec<String>,

    // Direct values (can be overridden by environment variables)
    pub client_id: Option<String>,
    pub client_secret: Option<String>,

    // Environment variable names for overrides
    pub client_id_env: Option<String>,
    pub client_secret_env: Option<String>,

    pub enabled: bool,
    pub extra_auth_params: BTreeMap<String, String>,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_base_url: "http://localhost:8080".to_string(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            token_secret: String::new(), // Will be generated if empty
            token_expiration_msec: 86_400_000,
            clock_skew_msec: 0,
        }
    }
}

impl Default for OAuth2Settings {
    fn default() -> Self {
        Self {
            authorized_redirect_uris: vec!["http://localhost:3000/oauth2/redirect".to_string()],
            default_redirect_uri: None,
            require_provider_match: true,
        }
    }
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:80".to_string(),
            ],
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            allowed_headers: vec!["*".to_string()],
            allow_credentials: true,
            max_age_secs: 3600,
        }
    }
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            secure: true, // Default to secure cookies
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            display_name: None,
            authorization_endpoint: None,
            token_endpoint: None,
            userinfo_endpoint: None,
            scopes: Vec::new(),
            client_id: None,
            client_secret: None,
            client_id_env: None,
            client_secret_env: None,
            enabled: true,
            extra_auth_params: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from configuration files and environment variables
    ///
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Settings.toml in `STREAMGATE_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    ///
    /// The logger is initialized once the effective log level is known.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A settings file cannot be read or parsed
    /// - Logger initialization fails
    /// - The resulting configuration is invalid
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_env_file();

        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);

        Self::initialize_logging(&settings.logging)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from TOML text without touching files or the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML cannot be parsed
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(basic_toml::from_str(content)?)
    }

    fn initialize_logging(logging: &LoggingSettings) -> Result<(), ConfigError> {
        env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(logging.level.as_str()),
        )
        .try_init()
        .map_err(|e| ConfigError::Logger(e.to_string()))
    }

    fn load_base_settings() -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        let default_config_path = PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            settings = Self::read_settings_file(&default_config_path)?;
            println!(
                "✓ Loaded base settings from {}",
                default_config_path.display()
            );
        }

        if let Ok(secrets_dir) = std::env::var(SECRETS_DIR_ENV) {
            let secrets_path = Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                settings = Self::read_settings_file(&secrets_path)?;
                println!("✓ Overriding settings from {}", secrets_path.display());
            } else {
                println!(
                    "ℹ {SECRETS_DIR_ENV} set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    fn read_settings_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_auth_env_overrides(&mut settings.auth);
        Self::apply_oauth2_env_overrides(&mut settings.oauth2);
        Self::apply_cors_env_overrides(&mut settings.cors);
        if let Some(upstream_url) = non_empty_env("UPSTREAM_URL") {
            settings.proxy.upstream_url = Some(upstream_url);
        }
        if let Some(snapshot) = non_empty_env("USER_DIRECTORY_SNAPSHOT") {
            settings.directory.snapshot_path = Some(snapshot);
        }
        if let Ok(cookie_secure) = std::env::var("COOKIE_SECURE") {
            if let Ok(secure) = cookie_secure.parse::<bool>() {
                settings.cookies.secure = secure;
            }
        }
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            settings.logging.level = log_level;
        }
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        if let Ok(host) = std::env::var("HOST") {
            app_settings.host = host;
        }
        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                app_settings.port = port;
            }
        }
        if let Ok(public_base_url) = std::env::var("PUBLIC_BASE_URL") {
            app_settings.public_base_url = public_base_url;
        }
    }

    /// Apply environment overrides for token settings, generating a secret when none is configured
    pub fn apply_auth_env_overrides(auth_settings: &mut AuthSettings) {
        apply_numeric_env_override(
            "AUTH_TOKEN_EXPIRATION_MSEC",
            &mut auth_settings.token_expiration_msec,
        );
        apply_numeric_env_override("AUTH_CLOCK_SKEW_MSEC", &mut auth_settings.clock_skew_msec);

        if let Some(secret) = non_empty_env("AUTH_TOKEN_SECRET") {
            auth_settings.token_secret = secret;
        } else if auth_settings.token_secret.is_empty() {
            auth_settings.token_secret = generate_secret();
            Self::warn_about_generated_secret();
        }
    }

    fn warn_about_generated_secret() {
        eprintln!("⚠️  WARNING: Using auto-generated token secret");
        eprintln!("🔒 For production use, set the AUTH_TOKEN_SECRET environment variable");
        eprintln!("   or configure auth.token_secret in Settings.toml");
        eprintln!("💡 Issued tokens stop verifying after a restart unless the secret is configured");
    }

    fn apply_oauth2_env_overrides(oauth2_settings: &mut OAuth2Settings) {
        if let Some(uris) = non_empty_env("OAUTH2_AUTHORIZED_REDIRECT_URIS") {
            oauth2_settings.authorized_redirect_uris = split_list(&uris);
        }
        if let Some(default_uri) = non_empty_env("OAUTH2_DEFAULT_REDIRECT_URI") {
            oauth2_settings.default_redirect_uri = Some(default_uri);
        }
    }

    fn apply_cors_env_overrides(cors_settings: &mut CorsSettings) {
        if let Some(origins) = non_empty_env("CORS_ALLOWED_ORIGINS") {
            cors_settings.allowed_origins = split_list(&origins);
        }
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    /// Check the cross-field invariants the rest of the gateway relies on
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` describing the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.auth.token_key()?;
        if self.auth.token_expiration_msec == 0
            || self.auth.token_expiration_msec > MAX_TOKEN_EXPIRATION_MSEC
        {
            return Err(ConfigError::Invalid(format!(
                "auth.token_expiration_msec must be between 1 and {MAX_TOKEN_EXPIRATION_MSEC}"
            )));
        }

        for uri in &self.oauth2.authorized_redirect_uris {
            parse_redirect_uri(uri)?;
        }

        if let Some(default_uri) = &self.oauth2.default_redirect_uri {
            let default_url = parse_redirect_uri(default_uri)?;
            let listed = self
                .oauth2
                .authorized_redirect_uris
                .iter()
                .filter_map(|uri| Url::parse(uri).ok())
                .any(|allowed| allowed == default_url);
            if !listed {
                return Err(ConfigError::Invalid(format!(
                    "oauth2.default_redirect_uri {default_uri} is not one of oauth2.authorized_redirect_uris"
                )));
            }
        }

        Url::parse(&self.application.public_base_url).map_err(|e| {
            ConfigError::Invalid(format!(
                "application.public_base_url {} is not a valid URL: {e}",
                self.application.public_base_url
            ))
        })?;

        if let Some(upstream) = &self.proxy.upstream_url {
            Url::parse(upstream).map_err(|e| {
                ConfigError::Invalid(format!("proxy.upstream_url {upstream} is not a valid URL: {e}"))
            })?;
        }

        Ok(())
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }
}

impl AuthSettings {
    /// Decode the configured Base64 secret
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is not Base64 or decodes to fewer than 32 bytes
    pub fn token_key(&self) -> Result<Vec<u8>, ConfigError> {
        let key = general_purpose::STANDARD
            .decode(self.token_secret.trim())
            .map_err(|e| ConfigError::Invalid(format!("auth.token_secret is not valid Base64: {e}")))?;
        if key.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::Invalid(format!(
                "auth.token_secret must decode to at least {MIN_SECRET_BYTES} bytes, got {}",
                key.len()
            )));
        }
        Ok(key)
    }

    #[must_use]
    pub fn token_validity(&self) -> Duration {
        Duration::milliseconds(
            i64::try_from(self.token_expiration_msec.min(MAX_TOKEN_EXPIRATION_MSEC)).unwrap_or(0),
        )
    }

    #[must_use]
    pub fn clock_skew(&self) -> Duration {
        Duration::milliseconds(
            i64::try_from(self.clock_skew_msec.min(MAX_TOKEN_EXPIRATION_MSEC)).unwrap_or(0),
        )
    }
}

impl ProviderSettings {
    /// Get the client ID, checking environment variable first, then falling back to direct value
    #[must_use]
    pub fn get_client_id(&self) -> Option<String> {
        resolve_with_env(self.client_id_env.as_deref(), self.client_id.as_ref())
    }

    /// Get the client secret, checking environment variable first, then falling back to direct value
    #[must_use]
    pub fn get_client_secret(&self) -> Option<String> {
        resolve_with_env(self.client_secret_env.as_deref(), self.client_secret.as_ref())
    }
}

fn resolve_with_env(env_var: Option<&str>, direct: Option<&String>) -> Option<String> {
    env_var
        .and_then(non_empty_env)
        .or_else(|| direct.filter(|v| !v.is_empty()).cloned())
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn apply_numeric_env_override(env_var: &str, target: &mut u64) {
    if let Ok(value_str) = std::env::var(env_var) {
        if let Ok(value) = value_str.trim().parse::<u64>() {
            *target = value;
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_redirect_uri(uri: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(uri)
        .map_err(|e| ConfigError::Invalid(format!("redirect URI {uri} is not a valid URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ConfigError::Invalid(format!(
            "redirect URI {uri} must be an absolute http(s) URL"
        )));
    }
    if url.fragment().is_some() {
        return Err(ConfigError::Invalid(format!(
            "redirect URI {uri} must not contain a fragment"
        )));
    }
    Ok(url)
}
