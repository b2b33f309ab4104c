//! Client side of Chatty: owns the device key pair, seals outgoing messages
//! and decrypts incoming ones for display.

pub mod config;
pub mod directory;
pub mod error;
pub mod key_manager;
pub mod key_store;
pub mod pipeline;
pub mod realtime;
pub mod session;

pub use config::ClientConfig;
pub use directory::{FileTransfer, HttpClient, PublicKeyDirectory};
pub use error::{ClientError, Result};
pub use key_manager::KeyManager;
pub use key_store::{KeyStore, MemoryKeyStore, SqliteKeyStore};
pub use pipeline::{DecryptionPipeline, DecryptionState, RenderedContent};
pub use realtime::RealtimeClient;
pub use session::Session;
