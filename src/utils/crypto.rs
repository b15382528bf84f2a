// Cryptographic primitives shared by the session token codec and the OAuth state sealer

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Nonce size for AES-256-GCM encryption (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Encryption key size for AES-256 (256 bits)
pub const ENCRYPTION_KEY_SIZE: usize = 32;

/// Generate a cryptographically secure CSRF token
///
/// 24 bytes (192 bits) of entropy, base64url encoded to 32 characters.
#[must_use]
pub fn generate_csrf_token() -> String {
    generate_nonce(24)
}

/// Generate a base64url-encoded random value of `length` bytes
#[must_use]
pub fn generate_nonce(length: usize) -> String {
    let mut nonce = vec![0u8; length];
    rand::rng().fill_bytes(&mut nonce);
    general_purpose::URL_SAFE_NO_PAD.encode(nonce)
}

/// Generate a standard-Base64 encoded 256-bit secret suitable for `auth.token_secret`
#[must_use]
pub fn generate_secret() -> String {
    let mut secret = [0u8; ENCRYPTION_KEY_SIZE];
    rand::rng().fill_bytes(&mut secret);
    general_purpose::STANDARD.encode(secret)
}

/// Sign a message using HMAC-SHA256
///
/// # Errors
///
/// Returns an error if the HMAC key is rejected
pub fn sign_hmac_sha256(message: &[u8], secret: &[u8]) -> Result<Vec<u8>> {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(secret).context("Invalid HMAC key length")?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Verify an HMAC-SHA256 signature in constant time
#[must_use]
pub fn verify_hmac_sha256(message: &[u8], secret: &[u8], signature: &[u8]) -> bool {
    let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(secret) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(signature).is_ok()
}

/// Compare a presented secret with the expected one in constant time
///
/// Both values are MACed under `key` and the tags are compared with
/// `verify_slice`, so neither the content nor the length leaks through timing.
#[must_use]
pub fn secrets_match(expected: &[u8], presented: &[u8], key: &[u8]) -> bool {
    sign_hmac_sha256(expected, key)
        .is_ok_and(|tag| verify_hmac_sha256(presented, key, &tag))
}

/// Derive a 32-byte AES key from the signing secret
///
/// The label keeps the sealing key distinct from the token signing key even
/// though both come from the same configured secret.
#[must_use]
pub fn derive_encryption_key(label: &str, input_key: &[u8]) -> [u8; ENCRYPTION_KEY_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(label.as_bytes());
    hasher.update([0u8]);
    hasher.update(input_key);
    hasher.finalize().into()
}

/// Encrypt any serializable value with AES-256-GCM
///
/// Output is base64url(nonce || ciphertext).
///
/// # Errors
///
/// Returns an error if:
/// - Serialization fails
/// - Key length is invalid
/// - AES encryption fails
pub fn encrypt_data<T: Serialize>(data: &T, key: &[u8]) -> Result<String> {
    if key.len() != ENCRYPTION_KEY_SIZE {
        return Err(anyhow!(
            "Invalid key length: expected {ENCRYPTION_KEY_SIZE} bytes, got {}",
            key.len()
        ));
    }

    let json_data = serde_json::to_vec(data).context("Failed to serialize data")?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let ciphertext = cipher
        .encrypt(nonce, json_data.as_slice())
        .map_err(|e| anyhow!("AES encryption failed: {e}"))?;

    let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(&combined))
}

/// Decrypt a value produced by [`encrypt_data`]
///
/// # Errors
///
/// Returns an error if:
/// - Key length is invalid
/// - Base64 decoding fails
/// - Data is shorter than a nonce
/// - AES decryption fails (wrong key or tampered data)
/// - Deserialization fails
pub fn decrypt_data<T: DeserializeOwned>(encrypted_data: &str, key: &[u8]) -> Result<T> {
    if key.len() != ENCRYPTION_KEY_SIZE {
        return Err(anyhow!(
            "Invalid key length: expected {ENCRYPTION_KEY_SIZE} bytes, got {}",
            key.len()
        ));
    }

    let combined = general_purpose::URL_SAFE_NO_PAD
        .decode(encrypted_data)
        .context("Failed to decode base64 data")?;

    if combined.len() < NONCE_SIZE {
        return Err(anyhow!("Invalid data length"));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| anyhow!("AES decryption failed: {e}"))?;

    serde_json::from_slice(&plaintext).context("Failed to deserialize data from decrypted JSON")
}
