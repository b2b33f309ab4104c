use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use rsa::Oaep;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, Result};
use crate::keys::{parse_private_key, parse_public_key};

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes (96 bits).
pub const IV_LEN: usize = 12;

/// AES-GCM authentication tag length, carried as the ciphertext suffix.
pub const TAG_LEN: usize = 16;

/// Raw symmetric key for one payload. Wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ContentKey([u8; KEY_LEN]);

impl ContentKey {
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::MalformedInput(format!(
                "content key must be {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ContentKey(<redacted>)")
    }
}

/// Output of a single content encryption: ciphertext (tag appended), the
/// key it was sealed under, and its IV.
#[derive(Debug)]
pub struct EncryptedContent {
    pub ciphertext: Vec<u8>,
    pub key: ContentKey,
    pub iv: [u8; IV_LEN],
}

/// Encrypt a payload under a brand new key and IV.
/// Key/IV pairs are never reused across payloads.
pub fn encrypt_content(plaintext: &[u8]) -> Result<EncryptedContent> {
    let key = ContentKey::generate();
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| CryptoError::MalformedInput(format!("encryption failed: {}", e)))?;

    Ok(EncryptedContent {
        ciphertext,
        key,
        iv,
    })
}

/// Authenticated decryption. Fails closed: a tag mismatch never yields bytes.
pub fn decrypt_content(ciphertext: &[u8], key: &ContentKey, iv: &[u8]) -> Result<Vec<u8>> {
    if iv.len() != IV_LEN {
        return Err(CryptoError::MalformedInput(format!(
            "iv must be {} bytes, got {}",
            IV_LEN,
            iv.len()
        )));
    }
    if ciphertext.len() < TAG_LEN {
        return Err(CryptoError::MalformedInput(format!(
            "ciphertext shorter than the {}-byte tag",
            TAG_LEN
        )));
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CryptoError::AuthTagMismatch)
}

/// Wrap a content key for one recipient with RSA-OAEP(SHA-256).
pub fn wrap_key(key: &ContentKey, recipient_public_pem: &str) -> Result<Vec<u8>> {
    let public = parse_public_key(recipient_public_pem)?;

    public
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), key.as_bytes())
        .map_err(|e| CryptoError::WrapFailed(e.to_string()))
}

/// Recover a content key with the owner's private key.
pub fn unwrap_key(wrapped: &[u8], owner_private_pem: &str) -> Result<ContentKey> {
    let private = parse_private_key(owner_private_pem)?;

    let mut raw = private
        .decrypt(Oaep::new::<Sha256>(), wrapped)
        .map_err(|_| CryptoError::UnwrapFailed)?;

    let key = ContentKey::from_bytes(&raw).map_err(|_| CryptoError::UnwrapFailed);
    raw.zeroize();
    key
}
