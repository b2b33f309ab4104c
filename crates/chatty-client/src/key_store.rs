use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use chatty_crypto::KeyPair;

use crate::error::{ClientError, Result};

/// Device-local persistence for key pairs, keyed by user id.
///
/// Implementations must write both halves of a pair in one step: a reader
/// never observes a private key next to someone else's public key.
pub trait KeyStore: Send + Sync {
    fn load(&self, user_id: &str) -> Result<Option<KeyPair>>;
    fn save(&self, user_id: &str, pair: &KeyPair) -> Result<()>;
    fn delete(&self, user_id: &str) -> Result<()>;
}

/// Process-lifetime store. Keys vanish with the process.
#[derive(Default)]
pub struct MemoryKeyStore {
    pairs: RwLock<HashMap<String, KeyPair>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn load(&self, user_id: &str) -> Result<Option<KeyPair>> {
        let pairs = self
            .pairs
            .read()
            .map_err(|e| ClientError::Storage(format!("key store lock poisoned: {}", e)))?;
        Ok(pairs.get(user_id).cloned())
    }

    fn save(&self, user_id: &str, pair: &KeyPair) -> Result<()> {
        let mut pairs = self
            .pairs
            .write()
            .map_err(|e| ClientError::Storage(format!("key store lock poisoned: {}", e)))?;
        pairs.insert(user_id.to_string(), pair.clone());
        Ok(())
    }

    fn delete(&self, user_id: &str) -> Result<()> {
        let mut pairs = self
            .pairs
            .write()
            .map_err(|e| ClientError::Storage(format!("key store lock poisoned: {}", e)))?;
        pairs.remove(user_id);
        Ok(())
    }
}

/// SQLite-backed store: one row per user holding both PEM halves.
pub struct SqliteKeyStore {
    conn: Mutex<Connection>,
}

impl SqliteKeyStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self::init(conn)?;
        info!("Key store opened at {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS device_keys (
                user_id     TEXT PRIMARY KEY,
                private_key TEXT NOT NULL,
                public_key  TEXT NOT NULL,
                updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ClientError::Storage(format!("key store lock poisoned: {}", e)))?;
        f(&conn)
    }
}

impl KeyStore for SqliteKeyStore {
    fn load(&self, user_id: &str) -> Result<Option<KeyPair>> {
        self.with_conn(|conn| {
            let pair = conn
                .query_row(
                    "SELECT private_key, public_key FROM device_keys WHERE user_id = ?1",
                    [user_id],
                    |row| {
                        Ok(KeyPair {
                            private_key_pem: row.get(0)?,
                            public_key_pem: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(pair)
        })
    }

    fn save(&self, user_id: &str, pair: &KeyPair) -> Result<()> {
        self.with_conn(|conn| {
            // Single upsert: both halves land together or not at all.
            conn.execute(
                "INSERT INTO device_keys (user_id, private_key, public_key)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET
                     private_key = excluded.private_key,
                     public_key  = excluded.public_key,
                     updated_at  = datetime('now')",
                (user_id, &pair.private_key_pem, &pair.public_key_pem),
            )?;
            Ok(())
        })
    }

    fn delete(&self, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM device_keys WHERE user_id = ?1", [user_id])?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(tag: &str) -> KeyPair {
        KeyPair {
            private_key_pem: format!("private-{}", tag),
            public_key_pem: format!("public-{}", tag),
        }
    }

    fn exercise(store: &dyn KeyStore) {
        assert_eq!(store.load("alice").unwrap(), None);

        store.save("alice", &pair("a1")).unwrap();
        store.save("bob", &pair("b1")).unwrap();
        assert_eq!(store.load("alice").unwrap(), Some(pair("a1")));

        // Replacing one user's pair swaps both halves and leaves others alone
        store.save("alice", &pair("a2")).unwrap();
        assert_eq!(store.load("alice").unwrap(), Some(pair("a2")));
        assert_eq!(store.load("bob").unwrap(), Some(pair("b1")));

        store.delete("alice").unwrap();
        assert_eq!(store.load("alice").unwrap(), None);
        assert_eq!(store.load("bob").unwrap(), Some(pair("b1")));

        // Deleting an absent user is not an error
        store.delete("carol").unwrap();
    }

    #[test]
    fn memory_store_contract() {
        exercise(&MemoryKeyStore::new());
    }

    #[test]
    fn sqlite_store_contract() {
        exercise(&SqliteKeyStore::open_in_memory().unwrap());
    }

    #[test]
    fn sqlite_store_persists_across_reopen() {
        let path = std::env::temp_dir().join(format!("chatty_keys_{}.db", uuid::Uuid::new_v4()));

        {
            let store = SqliteKeyStore::open(&path).unwrap();
            store.save("alice", &pair("a1")).unwrap();
        }

        let reopened = SqliteKeyStore::open(&path).unwrap();
        assert_eq!(reopened.load("alice").unwrap(), Some(pair("a1")));

        drop(reopened);
        let _ = std::fs::remove_file(&path);
    }
}
