//! Dual-recipient envelopes.
//!
//! One content key, wrapped twice: once for the receiver and once for the
//! sender, so both ends can decrypt the same stored ciphertext later.

#[cfg(feature = "client")]
use tracing::debug;

#[cfg(feature = "client")]
use crate::encrypt::{decrypt_content, encrypt_content, unwrap_key, wrap_key};
#[cfg(feature = "client")]
use crate::error::Result;

/// Length of the IV carried in every envelope.
pub const ENVELOPE_IV_LEN: usize = 12;

/// Which wrapped key the viewing identity should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerRole {
    Sender,
    Receiver,
}

/// Text or image payload sealed for both ends of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    pub encrypted_content: Vec<u8>,
    pub encrypted_key_for_receiver: Vec<u8>,
    pub encrypted_key_for_sender: Vec<u8>,
    pub iv: [u8; ENVELOPE_IV_LEN],
}

impl EncryptedEnvelope {
    pub fn wrapped_key_for(&self, role: ViewerRole) -> &[u8] {
        match role {
            ViewerRole::Sender => &self.encrypted_key_for_sender,
            ViewerRole::Receiver => &self.encrypted_key_for_receiver,
        }
    }
}

/// Key material for an attachment whose ciphertext lives in the file store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEnvelope {
    /// Opaque handle returned by the file store on upload.
    pub pointer: String,
    pub iv: [u8; ENVELOPE_IV_LEN],
    pub encrypted_key_for_receiver: Vec<u8>,
    pub encrypted_key_for_sender: Vec<u8>,
}

impl FileEnvelope {
    /// Attach the store handle to a sealed file body. The body's ciphertext
    /// must already have been uploaded; it is dropped here.
    pub fn from_sealed(pointer: String, sealed: EncryptedEnvelope) -> Self {
        Self {
            pointer,
            iv: sealed.iv,
            encrypted_key_for_receiver: sealed.encrypted_key_for_receiver,
            encrypted_key_for_sender: sealed.encrypted_key_for_sender,
        }
    }

    pub fn wrapped_key_for(&self, role: ViewerRole) -> &[u8] {
        match role {
            ViewerRole::Sender => &self.encrypted_key_for_sender,
            ViewerRole::Receiver => &self.encrypted_key_for_receiver,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub original_name: String,
    pub mime_type: String,
    pub byte_size: u64,
}

/// A decoded bundle. A message is either a sealed text/image payload or a
/// pointer to a sealed attachment, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptedPayload {
    TextOrImage(EncryptedEnvelope),
    FileAttachment {
        envelope: FileEnvelope,
        metadata: FileMetadata,
    },
}

impl EncryptedPayload {
    pub fn is_file(&self) -> bool {
        matches!(self, Self::FileAttachment { .. })
    }
}

/// Seal `plaintext` for both the receiver and the sender.
///
/// Either both wrapped keys are produced or nothing is: a half-sealed
/// envelope would leave one side unable to read the message.
#[cfg(feature = "client")]
pub fn seal(
    plaintext: &[u8],
    receiver_public_pem: &str,
    sender_public_pem: &str,
) -> Result<EncryptedEnvelope> {
    let content = encrypt_content(plaintext)?;

    let encrypted_key_for_receiver = wrap_key(&content.key, receiver_public_pem)?;
    let encrypted_key_for_sender = wrap_key(&content.key, sender_public_pem)?;

    debug!("Sealed {} byte payload for two recipients", plaintext.len());

    Ok(EncryptedEnvelope {
        encrypted_content: content.ciphertext,
        encrypted_key_for_receiver,
        encrypted_key_for_sender,
        iv: content.iv,
    })
}

/// Open an envelope as `role` using the viewer's private key.
#[cfg(feature = "client")]
pub fn open(
    envelope: &EncryptedEnvelope,
    viewer_private_pem: &str,
    role: ViewerRole,
) -> Result<Vec<u8>> {
    let key = unwrap_key(envelope.wrapped_key_for(role), viewer_private_pem)?;
    decrypt_content(&envelope.encrypted_content, &key, &envelope.iv)
}

/// Decrypt a downloaded attachment body.
#[cfg(feature = "client")]
pub fn open_file(
    envelope: &FileEnvelope,
    ciphertext: &[u8],
    viewer_private_pem: &str,
    role: ViewerRole,
) -> Result<Vec<u8>> {
    let key = unwrap_key(envelope.wrapped_key_for(role), viewer_private_pem)?;
    decrypt_content(ciphertext, &key, &envelope.iv)
}

#[cfg(all(test, feature = "client"))]
mod tests {
    use super::*;
    use crate::encrypt::unwrap_key;
    use crate::error::CryptoError;
    use crate::keys::fixtures::{ALICE, BOB, EVE};

    #[test]
    fn alice_sends_hello_to_bob() {
        let envelope = seal(b"hello", &BOB.public_key_pem, &ALICE.public_key_pem).unwrap();

        assert_eq!(
            open(&envelope, &BOB.private_key_pem, ViewerRole::Receiver).unwrap(),
            b"hello"
        );
        assert_eq!(
            open(&envelope, &ALICE.private_key_pem, ViewerRole::Sender).unwrap(),
            b"hello"
        );
        assert_eq!(
            open(&envelope, &BOB.private_key_pem, ViewerRole::Sender),
            Err(CryptoError::UnwrapFailed)
        );
    }

    #[test]
    fn both_wrapped_keys_hold_the_same_content_key() {
        let envelope = seal(b"same key", &BOB.public_key_pem, &ALICE.public_key_pem).unwrap();

        let for_receiver =
            unwrap_key(&envelope.encrypted_key_for_receiver, &BOB.private_key_pem).unwrap();
        let for_sender =
            unwrap_key(&envelope.encrypted_key_for_sender, &ALICE.private_key_pem).unwrap();
        assert_eq!(for_receiver, for_sender);
    }

    #[test]
    fn third_party_cannot_open() {
        let envelope = seal(b"private", &BOB.public_key_pem, &ALICE.public_key_pem).unwrap();

        for role in [ViewerRole::Sender, ViewerRole::Receiver] {
            assert!(open(&envelope, &EVE.private_key_pem, role).is_err());
        }
    }

    #[test]
    fn seal_fails_whole_when_sender_key_is_bad() {
        let result = seal(b"hello", &BOB.public_key_pem, "not a key");
        assert!(matches!(result, Err(CryptoError::InvalidKeyFormat(_))));
    }

    #[test]
    fn seal_fails_whole_when_receiver_key_is_missing() {
        let result = seal(b"hello", "", &ALICE.public_key_pem);
        assert!(matches!(result, Err(CryptoError::InvalidKeyFormat(_))));
    }

    #[test]
    fn file_envelope_opens_uploaded_body() {
        let body = vec![7u8; 4096];
        let sealed = seal(&body, &BOB.public_key_pem, &ALICE.public_key_pem).unwrap();
        let uploaded = sealed.encrypted_content.clone();

        let file = FileEnvelope::from_sealed("blob-1".into(), sealed);
        assert_eq!(file.pointer, "blob-1");

        let as_receiver =
            open_file(&file, &uploaded, &BOB.private_key_pem, ViewerRole::Receiver).unwrap();
        let as_sender =
            open_file(&file, &uploaded, &ALICE.private_key_pem, ViewerRole::Sender).unwrap();
        assert_eq!(as_receiver, body);
        assert_eq!(as_sender, body);
    }

    #[test]
    fn tampered_file_body_is_rejected() {
        let sealed = seal(b"attachment", &BOB.public_key_pem, &ALICE.public_key_pem).unwrap();
        let mut uploaded = sealed.encrypted_content.clone();
        uploaded[0] ^= 0x01;

        let file = FileEnvelope::from_sealed("blob-2".into(), sealed);
        assert_eq!(
            open_file(&file, &uploaded, &BOB.private_key_pem, ViewerRole::Receiver),
            Err(CryptoError::AuthTagMismatch)
        );
    }
}
