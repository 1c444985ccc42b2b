//! HTTP handlers for documents and their versions.
//! Uploads arrive as multipart forms; content is processed by
//! `DocumentProcessor` and lineage changes go through `VersionManager`.

use crate::{
    errors::AppError,
    handlers::admin_handlers::RequireAdmin,
    models::document::DocumentMetadata,
    services::{github_store::RemoteObjectStore, versioning::VersionDiff},
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Default, Deserialize)]
pub struct ListDocumentsQuery {
    /// Include historical versions.
    #[serde(default)]
    pub all: bool,
    /// Whitespace-separated search terms, all of which must match a keyword.
    pub q: Option<String>,
    pub tag: Option<String>,
}

/// A document as listed: inline content omitted, display fields added.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentListing {
    #[serde(flatten)]
    pub document: DocumentMetadata,
    pub formatted_size: String,
    pub type_folder: &'static str,
}

impl From<DocumentMetadata> for DocumentListing {
    fn from(mut document: DocumentMetadata) -> Self {
        document.content_base64 = None;
        Self {
            formatted_size: document.formatted_size(),
            type_folder: document.type_folder(),
            document,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedTypes {
    pub supported_file_types: &'static [&'static str],
    pub max_file_size: u64,
}

/// Comparison result with change counts.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareResponse {
    #[serde(flatten)]
    pub diff: VersionDiff,
    pub additions: usize,
    pub deletions: usize,
    pub identical: bool,
}

#[derive(Debug, Deserialize)]
pub struct CompareQuery {
    pub a: String,
    pub b: String,
    pub format: Option<String>,
}

/// Editable document fields for `PUT /documents/{id}`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub category: Option<String>,
    pub author: Option<String>,
    pub is_public: Option<bool>,
}

/// Parsed upload form.
#[derive(Debug, Default)]
struct UploadForm {
    file_name: Option<String>,
    content: Bytes,
    title: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
    category: Option<String>,
    author: Option<String>,
    note: String,
    is_public: bool,
    upload: bool,
    extract_text: bool,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = UploadForm {
            extract_text: true,
            ..Default::default()
        };

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::bad_request(e.to_string()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                form.file_name = field.file_name().map(str::to_string);
                form.content = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::bad_request(e.to_string()))?;
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| AppError::bad_request(e.to_string()))?;
            match name.as_str() {
                "title" => form.title = Some(value),
                "description" => form.description = Some(value),
                "tags" => form.tags = split_tags(&value),
                "category" => form.category = Some(value),
                "author" => form.author = Some(value),
                "note" => form.note = value,
                "isPublic" | "is_public" => form.is_public = parse_flag(&value),
                "upload" => form.upload = parse_flag(&value),
                "extractText" | "extract_text" => form.extract_text = parse_flag(&value),
                other => warn!("ignoring unknown upload field `{}`", other),
            }
        }

        Ok(form)
    }

    fn file_name(&self) -> Result<&str, AppError> {
        self.file_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| AppError::bad_request("multipart field `file` with a file name is required"))
    }
}

fn split_tags(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim(), "true" | "1" | "on" | "yes")
}

fn matches_search(doc: &DocumentMetadata, terms: &[String]) -> bool {
    if terms.is_empty() {
        return true;
    }
    let keywords = doc.keywords();
    terms
        .iter()
        .all(|term| keywords.iter().any(|keyword| keyword.contains(term.as_str())))
}

/// GET /documents
pub async fn list_documents(
    State(state): State<AppState>,
    Query(q): Query<ListDocumentsQuery>,
) -> Json<Vec<DocumentListing>> {
    let terms: Vec<String> = q
        .q
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();

    let docs = state
        .documents
        .get_all()
        .await
        .into_iter()
        .filter(|doc| q.all || doc.is_current())
        .filter(|doc| q.tag.as_ref().is_none_or(|tag| doc.tags.contains(tag)))
        .filter(|doc| matches_search(doc, &terms))
        .map(DocumentListing::from)
        .collect();
    Json(docs)
}

/// GET /documents/types
pub async fn supported_types(State(state): State<AppState>) -> Json<SupportedTypes> {
    Json(SupportedTypes {
        supported_file_types: state.processor.supported_file_types(),
        max_file_size: state.processor.max_file_size(),
    })
}

/// POST /documents
pub async fn upload_document(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = UploadForm::read(multipart).await?;
    let file_name = form.file_name()?.to_string();

    let mut doc = state
        .processor
        .process_file(&file_name, &form.content, form.extract_text)?;
    if let Some(title) = form.title.filter(|t| !t.trim().is_empty()) {
        doc.title = title;
    }
    if let Some(description) = form.description {
        doc.description = description;
    }
    doc.tags = form.tags;
    doc.category = form.category.unwrap_or_default();
    doc.author = form.author.unwrap_or_default();
    doc.is_public = form.is_public;
    doc.version_note = form.note;

    if form.upload {
        let url = state
            .remote
            .upload(&form.content, &file_name, &format!("Upload {}", file_name))
            .await?;
        doc.remote_url = Some(url);
    }

    let remote_url = doc.remote_url.clone();
    let doc = match state.documents.add(doc).await {
        Ok(doc) => doc,
        Err(err) => {
            if let Some(url) = remote_url.as_deref() {
                warn!("removing remote copy of {} after failed save", file_name);
                delete_remote_copy(state.remote.as_ref(), url, &file_name).await;
            }
            return Err(err.into());
        }
    };
    info!("stored document {} ({})", doc.meta.id, doc.file_name);
    Ok((StatusCode::CREATED, Json(doc)))
}

/// GET /documents/{id}
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentMetadata>, AppError> {
    Ok(Json(load_document(&state, &id).await?))
}

/// PUT /documents/{id}
///
/// Only the fields present in the body are changed.
pub async fn update_document(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<String>,
    Json(changes): Json<DocumentUpdate>,
) -> Result<Json<DocumentMetadata>, AppError> {
    let updated = state
        .documents
        .modify(&id, |doc| {
            if let Some(title) = changes.title {
                doc.title = title;
            }
            if let Some(description) = changes.description {
                doc.description = description;
            }
            if let Some(tags) = changes.tags {
                doc.tags = tags;
            }
            if let Some(category) = changes.category {
                doc.category = category;
            }
            if let Some(author) = changes.author {
                doc.author = author;
            }
            if let Some(is_public) = changes.is_public {
                doc.is_public = is_public;
            }
        })
        .await?;
    Ok(Json(updated))
}

/// DELETE /documents/{id}
///
/// Removes the whole lineage the document belongs to in one write. Remote
/// copies are removed afterwards on a best-effort basis.
pub async fn delete_document(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let removed = state.versions.delete_lineage(&id).await?;
    for doc in removed {
        if let Some(url) = doc.remote_url.as_deref() {
            delete_remote_copy(state.remote.as_ref(), url, &doc.file_name).await;
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_remote_copy(remote: &dyn RemoteObjectStore, url: &str, file_name: &str) {
    let Some(path) = remote.path_from_url(url) else {
        return;
    };
    if let Err(err) = remote.delete(&path, &format!("Delete {}", file_name)).await {
        warn!("could not delete remote copy {}: {}", path, err);
    }
}

async fn load_document(state: &AppState, id: &str) -> Result<DocumentMetadata, AppError> {
    state
        .documents
        .get_by_id(id)
        .await
        .ok_or_else(|| AppError::not_found(format!("document `{}` not found", id)))
}

/// Document bytes, from inline storage or else from the remote store.
async fn document_content(state: &AppState, doc: &DocumentMetadata) -> Result<Vec<u8>, AppError> {
    if let Some(content) = state.processor.inline_content(doc)? {
        return Ok(content);
    }
    let path = doc
        .remote_url
        .as_deref()
        .and_then(|url| state.remote.path_from_url(url))
        .ok_or_else(|| {
            AppError::not_found(format!("document `{}` has no stored content", doc.meta.id))
        })?;
    Ok(state.remote.download(&path).await?)
}

/// GET /documents/{id}/content
pub async fn download_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let doc = load_document(&state, &id).await?;
    let content = document_content(&state, &doc).await?;

    let mut response = Response::new(Body::from(content));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(doc.mime_type()),
    );
    if let Ok(value) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", doc.file_name))
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// GET /documents/{id}/html
pub async fn document_html(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Html<String>, AppError> {
    let doc = load_document(&state, &id).await?;
    let content = document_content(&state, &doc).await?;
    Ok(Html(state.processor.convert_to_html(&content, &doc.file_type)?))
}

/// GET /documents/{id}/versions
pub async fn list_versions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<DocumentListing>>, AppError> {
    let versions = state.versions.list_versions(&id).await?;
    Ok(Json(versions.into_iter().map(DocumentListing::from).collect()))
}

/// POST /documents/{id}/versions
pub async fn create_version(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = UploadForm::read(multipart).await?;
    let file_name = form.file_name()?;

    let doc = state
        .versions
        .commit_version(&id, &form.content, file_name, &form.note)
        .await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

/// POST /documents/versions/{version_id}/restore
pub async fn restore_version(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(version_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let doc = state.versions.restore_by_id(&version_id).await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

/// GET /documents/compare?a=&b=[&format=html]
pub async fn compare_versions(
    State(state): State<AppState>,
    Query(q): Query<CompareQuery>,
) -> Result<Response, AppError> {
    let diff = state.versions.compare_versions(&q.a, &q.b).await?;
    if q.format.as_deref() == Some("html") {
        return Ok(Html(diff.to_html()).into_response());
    }
    Ok(Json(CompareResponse {
        additions: diff.additions(),
        deletions: diff.deletions(),
        identical: diff.is_identical(),
        diff,
    })
    .into_response())
}
