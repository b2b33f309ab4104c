use thiserror::Error;

pub type Result<T> = std::result::Result<T, CryptoError>;

/// Failures of the cryptographic core. Every variant is recoverable at the
/// boundary of the single message or operation it affects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("no private key available for this identity")]
    MissingKey,

    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("failed to wrap content key: {0}")]
    WrapFailed(String),

    #[error("failed to unwrap content key")]
    UnwrapFailed,

    #[error("authentication tag mismatch")]
    AuthTagMismatch,

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),
}
