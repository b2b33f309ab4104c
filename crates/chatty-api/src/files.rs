use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};
use uuid::Uuid;

use chatty_types::api::{Claims, UploadResponse};

use crate::auth::AppState;
use crate::run_db;

/// 50 MB upload limit for files
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// POST /files — accepts raw encrypted bytes (application/octet-stream),
/// saves them under the upload dir, inserts a DB row, returns { file_id, size }.
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    bytes: Bytes,
) -> Result<impl IntoResponse, StatusCode> {
    if bytes.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    if bytes.len() > MAX_FILE_SIZE {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }

    let file_id = Uuid::new_v4().to_string();
    let size = bytes.len() as i64;

    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(|e| {
            error!("Failed to create upload directory: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    // Write encrypted blob to disk
    let file_path = state.upload_dir.join(&file_id);
    let mut file = tokio::fs::File::create(&file_path).await.map_err(|e| {
        error!("Failed to create file {}: {}", file_path.display(), e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    file.write_all(&bytes).await.map_err(|e| {
        error!("Failed to write file {}: {}", file_path.display(), e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    file.flush().await.map_err(|e| {
        error!("Failed to flush file {}: {}", file_path.display(), e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let fid = file_id.clone();
    let uid = claims.sub.to_string();
    run_db(&state, move |db| db.insert_file(&fid, &uid, size)).await?;

    debug!("{} uploaded {} bytes as {}", claims.sub, size, file_id);
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            file_id,
            size: size as u64,
        }),
    ))
}

/// GET /files/{file_id} — returns the encrypted blob as stored.
pub async fn download_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    // Only ids we minted; anything else could walk out of the upload dir
    file_id
        .parse::<Uuid>()
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let fid = file_id.clone();
    if run_db(&state, move |db| db.get_file(&fid)).await?.is_none() {
        return Err(StatusCode::NOT_FOUND);
    }

    let file_path = state.upload_dir.join(&file_id);
    let bytes = tokio::fs::read(&file_path).await.map_err(|e| {
        error!("Failed to read file {}: {}", file_path.display(), e);
        StatusCode::NOT_FOUND
    })?;

    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes))
}
