//! Completing a login: reconcile the user, mint a token, redirect the browser

use chrono::Utc;
use log::{info, warn};
use thiserror::Error;
use url::Url;

use crate::models::{ProviderProfile, User};
use crate::oauth::{OAuthError, OAuthState};
use crate::reconcile::{IdentityReconciler, ReconcileError};
use crate::settings::OAuth2Settings;
use crate::token::{TokenCodec, TokenError};
use crate::utils::logging::LoggingHelper;

pub use crate::utils::redirect_validator::RedirectAllowList;

/// Query parameter carrying the session token to the frontend
pub const TOKEN_QUERY_PARAM: &str = "token";

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("redirect target is not authorized: {0}")]
    UnauthorizedRedirect(String),
    #[error("failed to issue session token: {0}")]
    Token(#[from] TokenError),
}

/// Where the browser goes after a successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRedirect {
    /// Allow-listed target with the `token` query parameter appended
    pub location: String,
    pub subject: String,
}

/// Delivers a fresh session token to an allow-listed frontend URI
#[derive(Debug, Clone)]
pub struct LoginSuccessHandler {
    codec: TokenCodec,
    allow_list: RedirectAllowList,
    default_redirect: Option<String>,
}

impl LoginSuccessHandler {
    /// Without an explicit default the first allow-list entry is used
    #[must_use]
    pub fn new(
        codec: TokenCodec,
        allow_list: RedirectAllowList,
        default_redirect: Option<String>,
    ) -> Self {
        let default_redirect =
            default_redirect.or_else(|| allow_list.first().map(ToString::to_string));
        Self {
            codec,
            allow_list,
            default_redirect,
        }
    }

    #[must_use]
    pub fn from_settings(codec: TokenCodec, oauth2: &OAuth2Settings) -> Self {
        Self::new(
            codec,
            RedirectAllowList::new(&oauth2.authorized_redirect_uris),
            oauth2.default_redirect_uri.clone(),
        )
    }

    /// Check a requested redirect before the provider round trip
    ///
    /// # Errors
    ///
    /// Returns `LoginError::UnauthorizedRedirect` for targets outside the allow-list
    pub fn check_redirect(&self, target: &str) -> Result<(), LoginError> {
        self.allow_list.check(target).map(|_| ()).map_err(|reason| {
            warn!("Refused redirect target {target}: {reason:?}");
            LoginError::UnauthorizedRedirect(target.to_string())
        })
    }

    /// Mint a session token for `user` and build the redirect carrying it
    ///
    /// The target is validated before the token is minted, so a refused
    /// target never sees a token.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The target (requested or default) is not on the allow-list
    /// - Token issuance fails
    pub fn on_authentication_success(
        &self,
        user: &User,
        requested_redirect: Option<&str>,
    ) -> Result<LoginRedirect, LoginError> {
        let target = requested_redirect
            .or(self.default_redirect.as_deref())
            .ok_or_else(|| {
                warn!("No redirect target requested and none configured");
                LoginError::UnauthorizedRedirect(String::new())
            })?;

        let mut url = self.allow_list.check(target).map_err(|reason| {
            warn!(
                "Refused post-login redirect to {target} for user {}: {reason:?}",
                user.id
            );
            LoginError::UnauthorizedRedirect(target.to_string())
        })?;

        let subject = user.id.to_string();
        let token = self.codec.issue(&subject)?;
        append_token(&mut url, &token);

        let jti = self
            .codec
            .decode_at(&token, Utc::now())
            .map(|claims| claims.jti)
            .unwrap_or_default();
        LoggingHelper::log_session_issued(&subject, &jti, url.host_str().unwrap_or_default());

        Ok(LoginRedirect {
            location: url.into(),
            subject,
        })
    }
}

/// Set the `token` query parameter, keeping every other pair
fn append_token(url: &mut Url, token: &str) {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| name != TOKEN_QUERY_PARAM)
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(TOKEN_QUERY_PARAM, token);
}

/// Any failure that ends a login attempt
#[derive(Debug, Error)]
pub enum LoginFailure {
    #[error(transparent)]
    OAuth(#[from] OAuthError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Login(#[from] LoginError),
}

impl LoginFailure {
    /// Error code shown on the login page
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::OAuth(e) => e.error_code(),
            Self::Reconcile(_) | Self::Login(LoginError::Token(_)) => "authentication_failed",
            Self::Login(LoginError::UnauthorizedRedirect(_)) => "unauthorized_redirect",
        }
    }
}

/// Second login phase: reconcile the profile and issue the session redirect
///
/// # Errors
///
/// Returns an error if reconciliation fails or the redirect is refused
pub async fn commit_session(
    reconciler: &IdentityReconciler,
    handler: &LoginSuccessHandler,
    profile: &ProviderProfile,
    state: &OAuthState,
) -> Result<LoginRedirect, LoginFailure> {
    // Refuse a bad target before touching the directory
    if let Some(target) = state.redirect_uri.as_deref() {
        handler.check_redirect(target)?;
    }

    let user = reconciler.reconcile(profile).await?;
    let redirect = handler.on_authentication_success(&user, state.redirect_uri.as_deref())?;
    info!("Login completed for user {} through {}", user.id, profile.provider);
    Ok(redirect)
}
