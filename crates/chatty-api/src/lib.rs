pub mod auth;
pub mod files;
pub mod keys;
pub mod messages;
pub mod middleware;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    routing::{get, post, put},
};
use tracing::error;

use chatty_db::Database;

pub use auth::{AppState, AppStateInner};

/// All REST routes. Everything but register and login requires a bearer token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/keys", put(keys::update_public_key))
        .route("/keys/{user_id}", get(keys::get_public_key))
        .route("/users", get(keys::list_users))
        .route(
            "/messages/{user_id}",
            get(messages::get_messages).post(messages::send_message),
        )
        .route(
            "/files",
            post(files::upload_file).layer(DefaultBodyLimit::max(files::MAX_FILE_SIZE)),
        )
        .route("/files/{file_id}", get(files::download_file))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

/// Run a blocking DB call off the async runtime, mapping any failure to 500.
pub(crate) async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("DB error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
