//! Remote object store credential and listing endpoints.

use crate::{errors::AppError, handlers::admin_handlers::RequireAdmin, state::AppState};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStatus {
    pub credential_set: bool,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListFilesQuery {
    pub path: Option<String>,
}

/// GET /remote/status
pub async fn status(State(state): State<AppState>) -> Result<Json<RemoteStatus>, AppError> {
    Ok(Json(RemoteStatus {
        credential_set: state.remote.is_credential_set().await?,
    }))
}

/// PUT /remote/token
pub async fn save_token(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Json(req): Json<TokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.remote.save_credential(req.token.trim()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /remote/files?path=docs/markdown
pub async fn list_files(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Query(q): Query<ListFilesQuery>,
) -> Result<Json<Vec<String>>, AppError> {
    let files = state.remote.list(q.path.as_deref().unwrap_or("")).await?;
    Ok(Json(files))
}
