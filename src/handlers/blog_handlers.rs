//! Blog post and blog settings endpoints.
//!
//! Anonymous callers only see published posts. Every mutation requires an
//! administrator session.

use crate::{
    errors::AppError,
    handlers::admin_handlers::{IsAdmin, RequireAdmin},
    models::blog::{BlogPostMetadata, BlogSettingsMetadata},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct ListPostsQuery {
    pub tag: Option<String>,
    pub category: Option<String>,
}

/// GET /posts, newest first.
pub async fn list_posts(
    State(state): State<AppState>,
    IsAdmin(admin): IsAdmin,
    Query(q): Query<ListPostsQuery>,
) -> Json<Vec<BlogPostMetadata>> {
    let mut posts: Vec<_> = state
        .posts
        .get_all()
        .await
        .into_iter()
        .filter(|p| admin || p.is_published)
        .filter(|p| q.tag.as_ref().is_none_or(|tag| p.tags.contains(tag)))
        .filter(|p| {
            q.category
                .as_ref()
                .is_none_or(|category| &p.category == category)
        })
        .collect();
    posts.sort_by(|a, b| b.meta.created_at.cmp(&a.meta.created_at));
    Json(posts)
}

/// GET /posts/{id}. Counts a view for anonymous readers.
pub async fn get_post(
    State(state): State<AppState>,
    IsAdmin(admin): IsAdmin,
    Path(id): Path<String>,
) -> Result<Json<BlogPostMetadata>, AppError> {
    let post = state
        .posts
        .transaction(|posts| -> Result<BlogPostMetadata, AppError> {
            let post = posts
                .get(&id)
                .filter(|p| admin || p.is_published)
                .cloned()
                .ok_or_else(|| AppError::not_found(format!("post `{}` not found", id)))?;
            if admin {
                return Ok(post);
            }
            Ok(posts.modify(&id, |p| p.view_count += 1)?)
        })
        .await?;
    Ok(Json(post))
}

/// POST /posts
pub async fn create_post(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Json(mut post): Json<BlogPostMetadata>,
) -> Result<impl IntoResponse, AppError> {
    if post.title.trim().is_empty() {
        return Err(AppError::bad_request("post title must not be empty"));
    }
    post.view_count = 0;
    let created = state.posts.add(post).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /posts/{id}
///
/// Replaces the editable fields. The view count is whatever is stored at
/// the time of the write.
pub async fn update_post(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<String>,
    Json(post): Json<BlogPostMetadata>,
) -> Result<Json<BlogPostMetadata>, AppError> {
    let updated = state
        .posts
        .modify(&id, |stored| {
            *stored = BlogPostMetadata {
                meta: stored.meta.clone(),
                view_count: stored.view_count,
                ..post
            };
        })
        .await?;
    Ok(Json(updated))
}

/// DELETE /posts/{id}
pub async fn delete_post(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.posts.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /settings. Defaults when nothing has been saved yet.
pub async fn get_settings(State(state): State<AppState>) -> Json<BlogSettingsMetadata> {
    Json(
        state
            .settings
            .get_all()
            .await
            .into_iter()
            .next()
            .unwrap_or_default(),
    )
}

/// PUT /settings
pub async fn put_settings(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Json(mut settings): Json<BlogSettingsMetadata>,
) -> Result<Json<BlogSettingsMetadata>, AppError> {
    if settings.posts_per_page == 0 {
        return Err(AppError::bad_request("postsPerPage must be at least 1"));
    }

    let saved = state
        .settings
        .transaction(|stored| match stored.all().first().map(|s| s.meta.id.clone()) {
            Some(id) => {
                settings.meta.id = id;
                stored.replace(settings)
            }
            None => {
                settings.meta.id.clear();
                stored.insert(settings)
            }
        })
        .await?;
    Ok(Json(saved))
}
