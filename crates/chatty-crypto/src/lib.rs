/// Chatty Crypto Library
///
/// Hybrid end-to-end encryption for direct messages and file attachments:
/// - AES-256-GCM content encryption with a fresh key and IV per payload
/// - RSA-OAEP (SHA-256) key wrapping, once for the receiver and once for the sender
/// - Wire bundle codec with schema validation at decode time
///
/// The `server` build only validates public keys and bundle shape; it never
/// holds a content key.

pub mod codec;
#[cfg(feature = "client")]
pub mod encrypt;
pub mod envelope;
pub mod error;
pub mod keys;

#[cfg(all(test, feature = "client"))]
mod proptests;

pub use envelope::{EncryptedEnvelope, EncryptedPayload, FileEnvelope, FileMetadata, ViewerRole};
pub use error::{CryptoError, Result};
pub use keys::KeyPair;
