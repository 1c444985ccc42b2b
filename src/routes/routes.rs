//! Defines routes for the blog and document API.
//!
//! ## Structure
//! - **Documents**
//!   - `GET    /documents`: current documents (`?all=true` adds history,
//!     `?q=` keyword search, `?tag=`)
//!   - `POST   /documents`: multipart upload
//!   - `GET|PUT|DELETE /documents/{id}`
//!   - `GET    /documents/{id}/html`: rendered content
//!   - `GET    /documents/{id}/content`: raw file
//!   - `GET    /documents/types`: accepted extensions and size limit
//!   - `GET|POST /documents/{id}/versions`: lineage / new version
//!   - `POST   /documents/versions/{version_id}/restore`
//!   - `GET    /documents/compare?a=&b=`
//!
//! - **Blog**: `/posts`, `/posts/{id}`, `/settings`
//! - **Remote store**: `/remote/status`, `/remote/token`, `/remote/files`
//! - **Admin**: `/admin/login`, `/admin/logout`, `/admin/password`, `/admin/status`

use crate::{
    handlers::{
        admin_handlers, blog_handlers, document_handlers,
        health_handlers::{healthz, readyz},
        remote_handlers,
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

/// Room for multipart boundaries and text fields on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build and return the router for the whole API.
///
/// `max_upload_bytes` bounds request bodies; oversized files that fit under
/// the transport limit are still rejected by the document processor.
pub fn routes(max_upload_bytes: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Documents
        .route(
            "/documents",
            get(document_handlers::list_documents).post(document_handlers::upload_document),
        )
        .route("/documents/types", get(document_handlers::supported_types))
        .route("/documents/compare", get(document_handlers::compare_versions))
        .route(
            "/documents/versions/{version_id}/restore",
            post(document_handlers::restore_version),
        )
        .route(
            "/documents/{id}",
            get(document_handlers::get_document)
                .put(document_handlers::update_document)
                .delete(document_handlers::delete_document),
        )
        .route("/documents/{id}/html", get(document_handlers::document_html))
        .route(
            "/documents/{id}/content",
            get(document_handlers::download_document),
        )
        .route(
            "/documents/{id}/versions",
            get(document_handlers::list_versions).post(document_handlers::create_version),
        )
        // Blog
        .route(
            "/posts",
            get(blog_handlers::list_posts).post(blog_handlers::create_post),
        )
        .route(
            "/posts/{id}",
            get(blog_handlers::get_post)
                .put(blog_handlers::update_post)
                .delete(blog_handlers::delete_post),
        )
        .route(
            "/settings",
            get(blog_handlers::get_settings).put(blog_handlers::put_settings),
        )
        // Remote store
        .route("/remote/status", get(remote_handlers::status))
        .route("/remote/token", put(remote_handlers::save_token))
        .route("/remote/files", get(remote_handlers::list_files))
        // Admin
        .route("/admin/login", post(admin_handlers::login))
        .route("/admin/logout", post(admin_handlers::logout))
        .route("/admin/password", post(admin_handlers::change_password))
        .route("/admin/status", get(admin_handlers::status))
        .layer(DefaultBodyLimit::max(body_limit))
}
