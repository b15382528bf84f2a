//! Sealed OAuth `state` parameter
//!
//! The state sent to the provider is an AES-GCM sealed [`OAuthState`]. The
//! CSRF token inside it must match the one stored in the browser's state
//! cookie, which ties the callback to the browser that started the login.

use std::fmt;

use chrono::{Duration, Utc};

use super::{OAuthError, OAuthState};
use crate::utils::crypto::{
    decrypt_data, derive_encryption_key, encrypt_data, secrets_match, ENCRYPTION_KEY_SIZE,
};
use crate::utils::logging::LoggingHelper;

const STATE_KEY_LABEL: &str = "streamgate-oauth-state";

/// How long a login may take between the authorization redirect and the callback
pub const STATE_MAX_AGE_MINUTES: i64 = 10;

#[derive(Clone)]
pub struct StateSealer {
    key: [u8; ENCRYPTION_KEY_SIZE],
}

impl fmt::Debug for StateSealer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSealer").finish_non_exhaustive()
    }
}

impl StateSealer {
    /// Derive the sealing key from the token signing secret
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: derive_encryption_key(STATE_KEY_LABEL, secret),
        }
    }

    /// Seal a state for the authorization redirect
    ///
    /// # Errors
    ///
    /// Returns `OAuthError::State` if encryption fails
    pub fn seal(&self, state: &OAuthState) -> Result<String, OAuthError> {
        encrypt_data(state, &self.key)
            .map_err(|e| OAuthError::State(format!("failed to seal state: {e}")))
    }

    /// Open a sealed state and check it against the CSRF token from the state cookie
    ///
    /// # Errors
    ///
    /// Returns `OAuthError::State` if:
    /// - The state cannot be decrypted (tampered or sealed under another secret)
    /// - No CSRF cookie was presented, or it does not match
    /// - The state is older than [`STATE_MAX_AGE_MINUTES`]
    pub fn unseal(&self, sealed: &str, csrf_cookie: Option<&str>) -> Result<OAuthState, OAuthError> {
        let state: OAuthState = decrypt_data(sealed, &self.key).map_err(|_| {
            LoggingHelper::log_state_rejected("undecryptable state parameter");
            OAuthError::State("invalid state parameter".to_string())
        })?;

        match csrf_cookie {
            Some(csrf) if secrets_match(state.csrf.as_bytes(), csrf.as_bytes(), &self.key) => {}
            Some(_) => {
                LoggingHelper::log_state_rejected("CSRF token mismatch");
                return Err(OAuthError::State("state does not match this browser".to_string()));
            }
            None => {
                LoggingHelper::log_state_rejected("missing state cookie");
                return Err(OAuthError::State("missing state cookie".to_string()));
            }
        }

        let age = Utc::now().signed_duration_since(state.issued_at);
        if age > Duration::minutes(STATE_MAX_AGE_MINUTES) || age < -Duration::minutes(1) {
            LoggingHelper::log_state_rejected("state expired");
            return Err(OAuthError::State("login attempt expired".to_string()));
        }

        Ok(state)
    }
}
