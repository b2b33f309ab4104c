use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use chatty_crypto::keys::parse_public_key;
use chatty_types::api::{Claims, PublicKeyResponse, UpdatePublicKeyRequest, UserSummary};

use crate::auth::AppState;
use crate::run_db;

/// PUT /keys — replace the caller's published public key.
pub async fn update_public_key(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdatePublicKeyRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    parse_public_key(&req.public_key).map_err(|e| {
        warn!("Rejected public key from {}: {}", claims.sub, e);
        StatusCode::BAD_REQUEST
    })?;

    let uid = claims.sub.to_string();
    let pem = req.public_key.trim().to_string();
    let updated = run_db(&state, move |db| db.set_public_key(&uid, &pem)).await?;
    if !updated {
        return Err(StatusCode::NOT_FOUND);
    }

    info!("{} ({}) published a new public key", claims.username, claims.sub);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /keys/{user_id} — a user with no key is 404, never an empty string.
pub async fn get_public_key(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let uid = user_id.to_string();
    let public_key = run_db(&state, move |db| db.get_public_key(&uid))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(PublicKeyResponse {
        user_id,
        public_key,
    }))
}

/// GET /users — everyone but the caller, with their published keys.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let uid = claims.sub.to_string();
    let rows = run_db(&state, move |db| db.list_users_except(&uid)).await?;

    let users: Vec<UserSummary> = rows
        .into_iter()
        .filter_map(|row| match row.id.parse() {
            Ok(id) => Some(UserSummary {
                id,
                username: row.username,
                public_key: row.public_key,
            }),
            Err(e) => {
                warn!("Corrupt user id '{}': {}", row.id, e);
                None
            }
        })
        .collect();

    Ok(Json(users))
}
