use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            public_key  TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Bundles are stored exactly as the client encoded them. The server
        -- never holds a key that could open them.
        CREATE TABLE IF NOT EXISTS messages (
            id                          TEXT PRIMARY KEY,
            sender_id                   TEXT NOT NULL REFERENCES users(id),
            receiver_id                 TEXT NOT NULL REFERENCES users(id),
            is_file                     INTEGER NOT NULL,
            encrypted_content           TEXT,
            encrypted_key               TEXT,
            encrypted_key_sender        TEXT,
            iv                          TEXT,
            original_file_name          TEXT,
            file_type                   TEXT,
            file_size                   INTEGER,
            file_path                   TEXT,
            file_iv                     TEXT,
            file_encrypted_key          TEXT,
            file_encrypted_key_sender   TEXT,
            created_at                  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(sender_id, receiver_id, created_at);

        CREATE TABLE IF NOT EXISTS files (
            id          TEXT PRIMARY KEY,
            uploader_id TEXT NOT NULL REFERENCES users(id),
            size        INTEGER NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
