//! Administrator session endpoints and the extractors that read the session
//! token from `Authorization: Bearer <token>`.

use crate::{errors::AppError, services::admin_auth::AdminSession, state::AppState};
use axum::{
    Json,
    extract::{FromRequestParts, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStatus {
    pub logged_in: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub logged_in: bool,
    #[serde(flatten)]
    pub session: AdminSession,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// The bearer token sent with the request, if any. Never rejects.
pub struct AdminToken(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for AdminToken {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(bearer_token(&parts.headers)))
    }
}

/// Whether the request carries a live administrator session.
pub struct IsAdmin(pub bool);

impl FromRequestParts<AppState> for IsAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers);
        Ok(Self(state.auth.is_logged_in(token.as_deref()).await?))
    }
}

/// Gate for mutating endpoints: rejects with 401 unless the request carries
/// a live administrator session.
pub struct RequireAdmin;

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers);
        state.auth.ensure_logged_in(token.as_deref()).await?;
        Ok(Self)
    }
}

/// POST /admin/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    match state.auth.login(&req.password).await? {
        Some(session) => Ok(Json(LoginResponse {
            logged_in: true,
            session,
        })),
        None => Err(AppError::unauthorized("incorrect password")),
    }
}

/// POST /admin/logout
pub async fn logout(
    State(state): State<AppState>,
    AdminToken(token): AdminToken,
) -> Result<Json<AdminStatus>, AppError> {
    if let Some(token) = token {
        state.auth.logout(&token).await?;
    }
    Ok(Json(AdminStatus { logged_in: false }))
}

/// POST /admin/password
pub async fn change_password(
    State(state): State<AppState>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth
        .change_password(&req.old_password, &req.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /admin/status
pub async fn status(IsAdmin(logged_in): IsAdmin) -> Json<AdminStatus> {
    Json(AdminStatus { logged_in })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc123"));
    }
}
