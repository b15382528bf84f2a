//! Session token codec
//!
//! Session tokens are compact HS256 JWTs carrying the user id as `sub`. They
//! are self-contained: nothing is stored server side and any holder of the
//! signing secret can verify them.

mod codec;
pub mod numeric_date;

pub use codec::{TokenClaims, TokenCodec};

use thiserror::Error;

/// Why a presented token was rejected
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token signature does not match")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is malformed")]
    Malformed,
}

impl TokenError {
    /// Short label used in debug logs
    #[must_use]
    pub const fn kind(self) -> &'static str {
        match self {
            Self::InvalidSignature => "invalid_signature",
            Self::Expired => "expired",
            Self::Malformed => "malformed",
        }
    }
}
