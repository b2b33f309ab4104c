use crate::Database;
use crate::models::{FileRow, MessageRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, is_file, encrypted_content, encrypted_key,
     encrypted_key_sender, iv, original_file_name, file_type, file_size, file_path, file_iv,
     file_encrypted_key, file_encrypted_key_sender, created_at";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
        public_key: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, public_key) VALUES (?1, ?2, ?3, ?4)",
                (id, username, password_hash, public_key),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Everyone except `id`, ordered by username.
    pub fn list_users_except(&self, id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, password, public_key, created_at
                 FROM users WHERE id != ?1 ORDER BY username",
            )?;
            let rows = stmt
                .query_map([id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Public keys --

    /// Returns false when no such user exists.
    pub fn set_public_key(&self, user_id: &str, public_key: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE users SET public_key = ?2 WHERE id = ?1",
                (user_id, public_key),
            )?;
            Ok(updated == 1)
        })
    }

    /// `None` for an unknown user and for a user who never published a key.
    pub fn get_public_key(&self, user_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let key: Option<Option<String>> = conn
                .query_row("SELECT public_key FROM users WHERE id = ?1", [user_id], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(key.flatten().filter(|k| !k.is_empty()))
        })
    }

    // -- Messages --

    pub fn insert_message(&self, message: &MessageRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO messages ({}) VALUES
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                    MESSAGE_COLUMNS
                ),
                rusqlite::params![
                    message.id,
                    message.sender_id,
                    message.receiver_id,
                    message.is_file,
                    message.encrypted_content,
                    message.encrypted_key,
                    message.encrypted_key_sender,
                    message.iv,
                    message.original_file_name,
                    message.file_type,
                    message.file_size,
                    message.file_path,
                    message.file_iv,
                    message.file_encrypted_key,
                    message.file_encrypted_key_sender,
                    message.created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// The most recent `limit` messages between two users, in either
    /// direction, returned oldest first.
    pub fn get_conversation(&self, user_a: &str, user_b: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_conversation(conn, user_a, user_b, limit))
    }

    // -- Files --

    pub fn insert_file(&self, id: &str, uploader_id: &str, size: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO files (id, uploader_id, size) VALUES (?1, ?2, ?3)",
                (id, uploader_id, size),
            )?;
            Ok(())
        })
    }

    pub fn get_file(&self, id: &str) -> Result<Option<FileRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, uploader_id, size, created_at FROM files WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(FileRow {
                            id: row.get(0)?,
                            uploader_id: row.get(1)?,
                            size: row.get(2)?,
                            created_at: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, username, password, public_key, created_at FROM users WHERE {} = ?1",
        column
    ))?;

    let row = stmt.query_row([value], user_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        public_key: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn query_conversation(
    conn: &Connection,
    user_a: &str,
    user_b: &str,
    limit: u32,
) -> Result<Vec<MessageRow>> {
    // Newest `limit` rows, flipped back to chronological order
    let mut stmt = conn.prepare(&format!(
        "SELECT * FROM (
             SELECT {columns}, rowid AS seq FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY created_at DESC, seq DESC
             LIMIT ?3
         ) ORDER BY created_at ASC, seq ASC",
        columns = MESSAGE_COLUMNS
    ))?;

    let rows = stmt
        .query_map(rusqlite::params![user_a, user_b, limit], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        is_file: row.get(3)?,
        encrypted_content: row.get(4)?,
        encrypted_key: row.get(5)?,
        encrypted_key_sender: row.get(6)?,
        iv: row.get(7)?,
        original_file_name: row.get(8)?,
        file_type: row.get(9)?,
        file_size: row.get(10)?,
        file_path: row.get(11)?,
        file_iv: row.get(12)?,
        file_encrypted_key: row.get(13)?,
        file_encrypted_key_sender: row.get(14)?,
        created_at: row.get(15)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_users() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("alice", "alice", "hash", None).unwrap();
        db.create_user("bob", "bob", "hash", Some("bob-pem")).unwrap();
        db.create_user("carol", "carol", "hash", None).unwrap();
        db
    }

    fn text_row(id: &str, from: &str, to: &str, created_at: &str) -> MessageRow {
        MessageRow {
            id: id.into(),
            sender_id: from.into(),
            receiver_id: to.into(),
            is_file: false,
            encrypted_content: Some("Y3Q=".into()),
            encrypted_key: Some("a3I=".into()),
            encrypted_key_sender: Some("a3M=".into()),
            iv: Some("aXY=".into()),
            original_file_name: None,
            file_type: None,
            file_size: None,
            file_path: None,
            file_iv: None,
            file_encrypted_key: None,
            file_encrypted_key_sender: None,
            created_at: created_at.into(),
        }
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let db = db_with_users();
        assert!(db.create_user("alice-2", "alice", "hash", None).is_err());
    }

    #[test]
    fn public_key_lookup() {
        let db = db_with_users();

        assert_eq!(db.get_public_key("bob").unwrap().as_deref(), Some("bob-pem"));
        assert_eq!(db.get_public_key("alice").unwrap(), None);
        assert_eq!(db.get_public_key("nobody").unwrap(), None);

        assert!(db.set_public_key("alice", "alice-pem").unwrap());
        assert_eq!(db.get_public_key("alice").unwrap().as_deref(), Some("alice-pem"));
        assert!(!db.set_public_key("nobody", "pem").unwrap());
    }

    #[test]
    fn list_users_excludes_caller() {
        let db = db_with_users();
        let names: Vec<String> = db
            .list_users_except("alice")
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["bob", "carol"]);
    }

    #[test]
    fn conversation_covers_both_directions_oldest_first() {
        let db = db_with_users();
        db.insert_message(&text_row("m2", "bob", "alice", "2026-01-01T10:00:02.000000Z")).unwrap();
        db.insert_message(&text_row("m1", "alice", "bob", "2026-01-01T10:00:01.000000Z")).unwrap();
        db.insert_message(&text_row("m3", "alice", "bob", "2026-01-01T10:00:03.000000Z")).unwrap();
        db.insert_message(&text_row("other", "alice", "carol", "2026-01-01T10:00:04.000000Z")).unwrap();

        let ids: Vec<String> = db
            .get_conversation("alice", "bob", 100)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);

        // Same thread from the other side
        assert_eq!(db.get_conversation("bob", "alice", 100).unwrap().len(), 3);
    }

    #[test]
    fn conversation_limit_keeps_newest() {
        let db = db_with_users();
        for i in 0..5 {
            let ts = format!("2026-01-01T10:00:0{}.000000Z", i);
            db.insert_message(&text_row(&format!("m{}", i), "alice", "bob", &ts)).unwrap();
        }

        let ids: Vec<String> = db
            .get_conversation("alice", "bob", 2)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["m3", "m4"]);
    }

    #[test]
    fn file_message_round_trips_nulls() {
        let db = db_with_users();
        let mut row = text_row("f1", "alice", "bob", "2026-01-01T10:00:00.000000Z");
        row.is_file = true;
        row.encrypted_content = None;
        row.encrypted_key = None;
        row.encrypted_key_sender = None;
        row.iv = None;
        row.original_file_name = Some("a.pdf".into());
        row.file_type = Some("application/pdf".into());
        row.file_size = Some(42);
        row.file_path = Some("blob".into());
        row.file_iv = Some("aXY=".into());
        row.file_encrypted_key = Some("a3I=".into());
        row.file_encrypted_key_sender = Some("a3M=".into());
        db.insert_message(&row).unwrap();

        let stored = db.get_conversation("bob", "alice", 10).unwrap();
        assert_eq!(stored, vec![row]);
    }

    #[test]
    fn message_to_unknown_user_violates_foreign_key() {
        let db = db_with_users();
        let row = text_row("m", "alice", "ghost", "2026-01-01T10:00:00.000000Z");
        assert!(db.insert_message(&row).is_err());
    }

    #[test]
    fn file_records() {
        let db = db_with_users();
        db.insert_file("blob-1", "alice", 1024).unwrap();

        let file = db.get_file("blob-1").unwrap().unwrap();
        assert_eq!(file.uploader_id, "alice");
        assert_eq!(file.size, 1024);
        assert!(db.get_file("blob-2").unwrap().is_none());
    }
}
