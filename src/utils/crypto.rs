// Cryptographic utilities for session field encryption and cookie signing

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Nonce size for AES-256-GCM encryption (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Encryption key size for AES-256 (256 bits)
pub const ENCRYPTION_KEY_SIZE: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// Symmetric encryption of individual string fields
///
/// Implementations must fail cleanly on input that is not their own ciphertext,
/// never returning garbage. They must be callable from any number of threads.
pub trait FieldCipher: Send + Sync {
    /// Encrypt a plaintext value into an opaque transport-safe string
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails
    fn encrypt(&self, plaintext: &str) -> Result<String>;

    /// Decrypt a value previously produced by [`FieldCipher::encrypt`]
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid ciphertext for this key
    fn decrypt(&self, ciphertext: &str) -> Result<String>;
}

/// AES-256-GCM field cipher
///
/// Output format is `base64url(nonce || ciphertext)`. A fresh random nonce is used
/// for every call, so encrypting the same value twice yields different strings.
#[derive(Clone)]
pub struct Cipher {
    key: [u8; ENCRYPTION_KEY_SIZE],
}

impl Cipher {
    /// Create a cipher from raw secret material of any length
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: derive_encryption_key(secret),
        }
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Cipher { .. }")
    }
}

impl FieldCipher for Cipher {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| anyhow!("AES encryption failed: {e}"))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(general_purpose::URL_SAFE_NO_PAD.encode(&combined))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let combined = general_purpose::URL_SAFE_NO_PAD
            .decode(ciphertext)
            .context("Failed to decode base64 data")?;

        // Shorter than nonce + GCM tag can't be ours
        if combined.len() < NONCE_SIZE + 16 {
            return Err(anyhow!("Invalid data length"));
        }

        let (nonce_bytes, sealed) = combined.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(nonce, sealed)
            .map_err(|e| anyhow!("AES decryption failed: {e}"))?;

        String::from_utf8(plaintext).context("Decrypted value is not valid UTF-8")
    }
}

/// Derive a proper 32-byte encryption key from input key material
///
/// Keys of exactly 32 bytes are used as-is; anything else is hashed with SHA-256
/// so that short or long secrets still map onto the full key space.
#[must_use]
pub fn derive_encryption_key(input_key: &[u8]) -> [u8; ENCRYPTION_KEY_SIZE] {
    let mut encryption_key = [0u8; ENCRYPTION_KEY_SIZE];
    if input_key.len() == ENCRYPTION_KEY_SIZE {
        encryption_key.copy_from_slice(input_key);
    } else {
        encryption_key.copy_from_slice(&Sha256::digest(input_key));
    }
    encryption_key
}

/// Generate a cryptographically secure nonce of specified byte length
///
/// # Returns
///
/// A base64url-encoded string representing the specified bytes of random data
#[must_use]
pub fn generate_nonce(length: usize) -> String {
    let mut nonce = vec![0u8; length];
    rand::rng().fill_bytes(&mut nonce);
    general_purpose::URL_SAFE_NO_PAD.encode(nonce)
}

/// Hex-encoded SHA-256 digest of a value, used where a stable non-reversible
/// identifier for a secret is needed
#[must_use]
pub fn sha256_hex(value: &str) -> String {
    Sha256::digest(value.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Sign a cookie value with HMAC-SHA256
///
/// The MAC covers the cookie name, the value and the timestamp so that a valid
/// value can't be replayed under a different cookie name or with a newer time.
///
/// # Errors
///
/// Returns an error if the HMAC key is rejected
pub fn sign_cookie_value(secret: &[u8], name: &str, value: &str, timestamp: i64) -> Result<String> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
        .map_err(|e| anyhow!("Invalid HMAC key length: {e}"))?;
    mac.update(name.as_bytes());
    mac.update(b"|");
    mac.update(value.as_bytes());
    mac.update(b"|");
    mac.update(timestamp.to_string().as_bytes());
    Ok(general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

/// Verify a signature produced by [`sign_cookie_value`] in constant time
#[must_use]
pub fn verify_cookie_signature(
    secret: &[u8],
    name: &str,
    value: &str,
    timestamp: i64,
    signature: &str,
) -> bool {
    let Ok(expected) = general_purpose::URL_SAFE_NO_PAD.decode(signature) else {
        return false;
    };
    let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(secret) else {
        return false;
    };
    mac.update(name.as_bytes());
    mac.update(b"|");
    mac.update(value.as_bytes());
    mac.update(b"|");
    mac.update(timestamp.to_string().as_bytes());
    mac.verify_slice(&expected).is_ok()
}
