/// Database row types. These map directly to SQLite rows and stay
/// independent of the chatty-types API models.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub public_key: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub is_file: bool,
    pub encrypted_content: Option<String>,
    pub encrypted_key: Option<String>,
    pub encrypted_key_sender: Option<String>,
    pub iv: Option<String>,
    pub original_file_name: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub file_path: Option<String>,
    pub file_iv: Option<String>,
    pub file_encrypted_key: Option<String>,
    pub file_encrypted_key_sender: Option<String>,
    /// RFC 3339, microsecond precision, so text order is time order.
    pub created_at: String,
}

pub struct FileRow {
    pub id: String,
    pub uploader_id: String,
    pub size: i64,
    pub created_at: String,
}
