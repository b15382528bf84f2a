use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{numeric_date, TokenError};
use crate::settings::{AuthSettings, ConfigError};
use crate::utils::crypto::{generate_nonce, sign_hmac_sha256, verify_hmac_sha256};

const ALGORITHM: &str = "HS256";
const TOKEN_TYPE: &str = "JWT";

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// Claims carried by a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User id the token was issued for
    pub sub: String,
    #[serde(with = "numeric_date")]
    pub iat: DateTime<Utc>,
    #[serde(with = "numeric_date")]
    pub exp: DateTime<Utc>,
    /// Random token id, safe to log in place of the token
    pub jti: String,
}

/// Issues and verifies HS256 session tokens
#[derive(Clone)]
pub struct TokenCodec {
    secret: Arc<[u8]>,
    validity: Duration,
    clock_skew: Duration,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("secret", &"<redacted>")
            .field("validity", &self.validity)
            .field("clock_skew", &self.clock_skew)
            .finish()
    }
}

impl TokenCodec {
    /// Create a codec with zero clock skew tolerance
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is empty or the validity is not positive
    pub fn new(secret: &[u8], validity: Duration) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::Invalid(
                "token signing secret must not be empty".to_string(),
            ));
        }
        if validity <= Duration::zero() {
            return Err(ConfigError::Invalid(
                "token validity must be positive".to_string(),
            ));
        }

        Ok(Self {
            secret: Arc::from(secret),
            validity,
            clock_skew: Duration::zero(),
        })
    }

    /// Build the codec from validated auth settings
    ///
    /// # Errors
    ///
    /// Returns an error if the configured secret cannot be decoded or is too short
    pub fn from_settings(auth: &AuthSettings) -> Result<Self, ConfigError> {
        let secret = auth.token_key()?;
        Ok(Self::new(&secret, auth.token_validity())?.with_clock_skew(auth.clock_skew()))
    }

    /// Tolerate clocks that disagree by up to `skew` when checking expiry
    #[must_use]
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew.max(Duration::zero());
        self
    }

    #[must_use]
    pub const fn validity(&self) -> Duration {
        self.validity
    }

    /// Issue a token for `subject` valid from now
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Malformed` if the subject is empty or the token cannot be assembled
    pub fn issue(&self, subject: &str) -> Result<String, TokenError> {
        self.issue_at(subject, Utc::now())
    }

    /// Issue a token for `subject` as if the current time were `now`
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Malformed` if the subject is empty, the expiry is
    /// out of range, or the token cannot be assembled
    pub fn issue_at(&self, subject: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        if subject.is_empty() {
            return Err(TokenError::Malformed);
        }

        let header = TokenHeader {
            alg: ALGORITHM.to_string(),
            typ: Some(TOKEN_TYPE.to_string()),
        };
        let exp = now
            .checked_add_signed(self.validity)
            .ok_or(TokenError::Malformed)?;
        let claims = TokenClaims {
            sub: subject.to_string(),
            iat: now,
            exp,
            jti: generate_nonce(12),
        };

        let signing_input = format!("{}.{}", encode_segment(&header)?, encode_segment(&claims)?);
        let signature = sign_hmac_sha256(signing_input.as_bytes(), &self.secret)
            .map_err(|_| TokenError::Malformed)?;

        debug!("Issued session token {} for subject {}", claims.jti, claims.sub);
        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Verify a token and return its subject
    ///
    /// # Errors
    ///
    /// Returns the reason the token was rejected
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token against the clock value `now`
    ///
    /// # Errors
    ///
    /// Returns the reason the token was rejected
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        self.decode_at(token, now).map(|claims| claims.sub)
    }

    /// Verify a token and return all of its claims
    ///
    /// The header is checked first, then the signature, then the payload and
    /// expiry. A payload is never interpreted before its signature verifies.
    ///
    /// # Errors
    ///
    /// Returns the reason the token was rejected
    pub fn decode_at(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        let mut segments = token.splitn(3, '.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64)) =
            (segments.next(), segments.next(), segments.next())
        else {
            return Err(TokenError::Malformed);
        };
        if header_b64.is_empty() || payload_b64.is_empty() {
            return Err(TokenError::Malformed);
        }

        let header: TokenHeader = decode_segment(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::Malformed);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::InvalidSignature)?;
        let signing_input = &token[..header_b64.len() + 1 + payload_b64.len()];
        if !verify_hmac_sha256(signing_input.as_bytes(), &self.secret, &signature) {
            return Err(TokenError::InvalidSignature);
        }

        let claims: TokenClaims = decode_segment(payload_b64)?;
        if claims.sub.is_empty() {
            return Err(TokenError::Malformed);
        }
        // A deadline past the representable range never expires
        let deadline = claims.exp.checked_add_signed(self.clock_skew);
        if deadline.is_some_and(|deadline| now >= deadline) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value).map_err(|_| TokenError::Malformed)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}
