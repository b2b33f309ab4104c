use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use chatty_crypto::KeyPair;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::key_store::{KeyStore, SqliteKeyStore};

/// Generates, persists, retrieves and validates this device's key pairs.
///
/// Owned by the session; never global. Writes for one user id go through a
/// per-user critical section so concurrent persist/clear calls cannot
/// interleave, while different users never wait on each other.
pub struct KeyManager {
    store: Arc<dyn KeyStore>,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyManager {
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self {
            store,
            user_locks: DashMap::new(),
        }
    }

    /// Manager backed by the SQLite key store at `config.key_store_path`.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let store = SqliteKeyStore::open(&config.key_store_path)?;
        Ok(Self::new(Arc::new(store)))
    }

    /// Fresh key pair. Nothing is persisted.
    pub async fn generate(&self) -> Result<KeyPair> {
        let pair = tokio::task::spawn_blocking(KeyPair::generate).await??;
        Ok(pair)
    }

    pub async fn persist(&self, user_id: &str, pair: &KeyPair) -> Result<()> {
        let _guard = self.lock_user(user_id).await;
        self.save_unlocked(user_id, pair).await
    }

    /// `None` is the normal first-login-on-this-device case.
    pub async fn retrieve(&self, user_id: &str) -> Result<Option<KeyPair>> {
        let store = self.store.clone();
        let uid = user_id.to_string();
        tokio::task::spawn_blocking(move || store.load(&uid)).await?
    }

    /// Probe round trip through both halves.
    pub async fn validate(&self, pair: &KeyPair) -> bool {
        let pair = pair.clone();
        match tokio::task::spawn_blocking(move || pair.validate()).await {
            Ok(valid) => valid,
            Err(e) => {
                warn!("Key validation task failed: {}", e);
                false
            }
        }
    }

    /// Delete the stored pair and release the user's lock entry.
    pub async fn clear(&self, user_id: &str) -> Result<()> {
        let guard = self.lock_user(user_id).await;
        let result = self.delete_unlocked(user_id).await;
        drop(guard);

        // Keep the entry while another call still holds or waits on it
        self.user_locks.remove_if(user_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Return the stored pair if it validates, otherwise replace it with a
    /// freshly generated and persisted one. An unverified pair is never
    /// handed out.
    pub async fn load_or_generate(&self, user_id: &str) -> Result<KeyPair> {
        let _guard = self.lock_user(user_id).await;

        match self.retrieve(user_id).await? {
            Some(pair) if self.validate(&pair).await => {
                info!("Using stored key pair for user {}", user_id);
                return Ok(pair);
            }
            Some(_) => {
                warn!("Stored key pair for user {} failed validation, regenerating", user_id);
                self.delete_unlocked(user_id).await?;
            }
            None => {
                info!("No stored key pair for user {}, generating", user_id);
            }
        }

        let pair = self.generate().await?;
        self.save_unlocked(user_id, &pair).await?;
        info!("New key pair stored for user {}", user_id);
        Ok(pair)
    }

    async fn lock_user(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(&self.user_locks.entry(user_id.to_string()).or_default());
        lock.lock_owned().await
    }

    async fn save_unlocked(&self, user_id: &str, pair: &KeyPair) -> Result<()> {
        let store = self.store.clone();
        let uid = user_id.to_string();
        let pair = pair.clone();
        tokio::task::spawn_blocking(move || store.save(&uid, &pair)).await?
    }

    async fn delete_unlocked(&self, user_id: &str) -> Result<()> {
        let store = self.store.clone();
        let uid = user_id.to_string();
        tokio::task::spawn_blocking(move || store.delete(&uid)).await?
    }
}
