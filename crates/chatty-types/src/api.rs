use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// JWT claims shared across chatty-api (REST middleware) and chatty-gateway
/// (WebSocket authentication).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    /// PEM public key generated on the device before signup.
    #[serde(default)]
    pub public_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

/// Identity behind a bearer token, as returned by `GET /auth/me`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub username: String,
}

// -- Public key directory --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePublicKeyRequest {
    pub public_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    pub user_id: Uuid,
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub public_key: Option<String>,
}

// -- Messages --

/// Encrypted message bundle as it crosses the wire and sits in storage.
///
/// Binary fields are standard base64. `is_file` selects which group of fields
/// is meaningful; the other group is always serialized as explicit `null`
/// so a reader can tell "not applicable" apart from a truncated bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireBundle {
    pub is_file: bool,

    #[serde(rename = "encryptedContent")]
    pub encrypted_content: Option<String>,
    /// Content key wrapped for the receiver.
    #[serde(rename = "encryptedKey")]
    pub encrypted_key: Option<String>,
    #[serde(rename = "encryptedKeySender")]
    pub encrypted_key_sender: Option<String>,
    pub iv: Option<String>,

    pub original_file_name: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<u64>,
    /// Opaque handle assigned by the file store.
    pub file_path: Option<String>,
    pub file_iv: Option<String>,
    pub file_encrypted_key: Option<String>,
    pub file_encrypted_key_sender: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    pub bundle: WireBundle,
}

// -- Files --

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub file_id: String,
    pub size: u64,
}
