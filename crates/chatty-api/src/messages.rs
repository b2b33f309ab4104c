use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use chatty_crypto::codec;
use chatty_db::models::MessageRow;
use chatty_types::api::{Claims, MessageResponse, WireBundle};
use chatty_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::run_db;

const MAX_PAGE: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    100
}

/// POST /messages/{receiver_id} — store an encrypted bundle and push it to
/// the receiver if they are connected. The bundle is schema-checked here;
/// its content is opaque to the server.
pub async fn send_message(
    State(state): State<AppState>,
    Path(receiver_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(bundle): Json<WireBundle>,
) -> Result<impl IntoResponse, StatusCode> {
    codec::decode(&bundle).map_err(|e| {
        warn!("{} sent a malformed bundle: {}", claims.sub, e);
        StatusCode::BAD_REQUEST
    })?;

    let rid = receiver_id.to_string();
    if run_db(&state, move |db| db.get_user_by_id(&rid)).await?.is_none() {
        return Err(StatusCode::NOT_FOUND);
    }

    let message = MessageResponse {
        id: Uuid::new_v4(),
        sender_id: claims.sub,
        receiver_id,
        created_at: Utc::now(),
        bundle,
    };

    let row = to_row(&message).ok_or(StatusCode::BAD_REQUEST)?;
    run_db(&state, move |db| db.insert_message(&row)).await?;

    let pushed = state
        .dispatcher
        .send_to_user(
            receiver_id,
            GatewayEvent::NewMessage {
                message: message.clone(),
            },
        )
        .await;
    debug!(
        "Message {} stored ({} -> {}, pushed: {})",
        message.id, claims.sub, receiver_id, pushed
    );

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /messages/{other_id} — the conversation between the caller and
/// `other_id`, oldest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(other_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let me = claims.sub.to_string();
    let other = other_id.to_string();
    let limit = query.limit.min(MAX_PAGE);

    let rows = run_db(&state, move |db| db.get_conversation(&me, &other, limit)).await?;
    let messages: Vec<MessageResponse> = rows.into_iter().filter_map(from_row).collect();

    Ok(Json(messages))
}

fn to_row(message: &MessageResponse) -> Option<MessageRow> {
    let bundle = &message.bundle;
    let file_size = match bundle.file_size {
        Some(size) => Some(i64::try_from(size).ok()?),
        None => None,
    };

    Some(MessageRow {
        id: message.id.to_string(),
        sender_id: message.sender_id.to_string(),
        receiver_id: message.receiver_id.to_string(),
        is_file: bundle.is_file,
        encrypted_content: bundle.encrypted_content.clone(),
        encrypted_key: bundle.encrypted_key.clone(),
        encrypted_key_sender: bundle.encrypted_key_sender.clone(),
        iv: bundle.iv.clone(),
        original_file_name: bundle.original_file_name.clone(),
        file_type: bundle.file_type.clone(),
        file_size,
        file_path: bundle.file_path.clone(),
        file_iv: bundle.file_iv.clone(),
        file_encrypted_key: bundle.file_encrypted_key.clone(),
        file_encrypted_key_sender: bundle.file_encrypted_key_sender.clone(),
        created_at: message.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
    })
}

fn from_row(row: MessageRow) -> Option<MessageResponse> {
    let parse_id = |value: &str, field: &str| match value.parse::<Uuid>() {
        Ok(id) => Some(id),
        Err(e) => {
            warn!("Corrupt {} '{}' on message '{}': {}", field, value, row.id, e);
            None
        }
    };

    let id = parse_id(&row.id, "id")?;
    let sender_id = parse_id(&row.sender_id, "sender_id")?;
    let receiver_id = parse_id(&row.receiver_id, "receiver_id")?;
    let created_at = DateTime::parse_from_rfc3339(&row.created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on message '{}': {}", row.created_at, row.id, e);
            DateTime::default()
        });

    Some(MessageResponse {
        id,
        sender_id,
        receiver_id,
        created_at,
        bundle: WireBundle {
            is_file: row.is_file,
            encrypted_content: row.encrypted_content,
            encrypted_key: row.encrypted_key,
            encrypted_key_sender: row.encrypted_key_sender,
            iv: row.iv,
            original_file_name: row.original_file_name,
            file_type: row.file_type,
            file_size: row.file_size.and_then(|s| u64::try_from(s).ok()),
            file_path: row.file_path,
            file_iv: row.file_iv,
            file_encrypted_key: row.file_encrypted_key,
            file_encrypted_key_sender: row.file_encrypted_key_sender,
        },
    })
}
