use std::path::PathBuf;
use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info, warn};
use uuid::Uuid;

use chatty_crypto::keys::parse_public_key;
use chatty_db::Database;
use chatty_gateway::dispatcher::Dispatcher;
use chatty_types::api::{
    Claims, LoginRequest, LoginResponse, MeResponse, RegisterRequest, RegisterResponse,
};

use crate::run_db;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    /// Directory holding encrypted attachment blobs, one file per id.
    pub upload_dir: PathBuf,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    // Validate input
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.password.len() < 8 {
        return Err(StatusCode::BAD_REQUEST);
    }
    if let Some(pem) = &req.public_key {
        parse_public_key(pem).map_err(|e| {
            warn!("Rejected public key at signup for {}: {}", req.username, e);
            StatusCode::BAD_REQUEST
        })?;
    }

    // Check if username is taken
    let username = req.username.clone();
    if run_db(&state, move |db| db.get_user_by_username(&username))
        .await?
        .is_some()
    {
        return Err(StatusCode::CONFLICT);
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Password hashing failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .to_string();

    let user_id = Uuid::new_v4();

    let uid = user_id.to_string();
    let username = req.username.clone();
    let public_key = req.public_key.clone();
    run_db(&state, move |db| {
        db.create_user(&uid, &username, &password_hash, public_key.as_deref())
    })
    .await?;

    let token = create_token(&state.jwt_secret, user_id, &req.username).map_err(|e| {
        error!("Token creation failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    info!("Registered {} ({})", req.username, user_id);
    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let username = req.username.clone();
    let user = run_db(&state, move |db| db.get_user_by_username(&username))
        .await?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // Verify password
    let parsed_hash =
        PasswordHash::new(&user.password).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let user_id: Uuid = user.id.parse().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let token = create_token(&state.jwt_secret, user_id, &user.username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
    }))
}

/// GET /auth/me — confirms a stored token still maps to a live account.
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let uid = claims.sub.to_string();
    let user = run_db(&state, move |db| db.get_user_by_id(&uid))
        .await?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    Ok(Json(MeResponse {
        user_id: claims.sub,
        username: user.username,
    }))
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
