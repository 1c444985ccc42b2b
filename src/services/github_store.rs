//! src/services/github_store.rs
//!
//! Remote object store backed by a GitHub repository.
//!
//! Files are committed through the REST contents API under
//! `docs/{typeFolder}/{yyyyMMdd}/{uuid}/{fileName}` and served from the raw
//! content host. The personal access token lives in the key-value store, so
//! every call re-reads it and fails with `Unauthorized` while it is unset.

use crate::models::file_type::{extension_of, type_folder};
use crate::services::kv_store::{KeyValueStore, KvError, get_item, set_item};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url, header};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

const USER_AGENT: &str = concat!("blog-store/", env!("CARGO_PKG_VERSION"));
const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_RAW: &str = "application/vnd.github.raw";

#[derive(Debug, Error)]
pub enum RemoteStoreError {
    #[error("remote store credential is missing or was rejected")]
    Unauthorized,
    #[error("remote path `{0}` not found")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("remote store returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("remote store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Storage(#[from] KvError),
}

pub type RemoteResult<T> = Result<T, RemoteStoreError>;

/// Durable blob storage for uploaded documents.
#[async_trait]
pub trait RemoteObjectStore: Send + Sync {
    /// Commit `content` as a new file and return its public URL.
    async fn upload(&self, content: &[u8], file_name: &str, commit_message: &str)
    -> RemoteResult<String>;

    async fn download(&self, path: &str) -> RemoteResult<Vec<u8>>;

    async fn delete(&self, path: &str, commit_message: &str) -> RemoteResult<()>;

    /// Paths of the entries under `path` (repository root when empty).
    async fn list(&self, path: &str) -> RemoteResult<Vec<String>>;

    async fn is_credential_set(&self) -> RemoteResult<bool>;

    async fn save_credential(&self, token: &str) -> RemoteResult<()>;

    /// Repository path for a URL returned by `upload`, if it belongs to this store.
    fn path_from_url(&self, url: &str) -> Option<String>;
}

/// Repository coordinates and endpoints for [`GitHubFileStore`].
#[derive(Clone, Debug)]
pub struct GitHubSettings {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Key-value key holding the access token.
    pub token_key: String,
    pub api_base: String,
    pub raw_base: String,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            branch: "main".into(),
            token_key: "github_personal_access_token".into(),
            api_base: "https://api.github.com".into(),
            raw_base: "https://raw.githubusercontent.com".into(),
        }
    }
}

/// Layout path for a new upload.
pub fn remote_path(file_name: &str, at: DateTime<Utc>, id: Uuid) -> String {
    format!(
        "docs/{}/{}/{}/{}",
        type_folder(&extension_of(file_name)),
        at.format("%Y%m%d"),
        id,
        file_name
    )
}

#[derive(Serialize)]
struct PutContentRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
}

#[derive(Serialize)]
struct DeleteContentRequest<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
}

#[derive(Deserialize)]
struct ContentEntry {
    path: String,
    sha: String,
}

/// A contents response is an array for directories and an object for files.
#[derive(Deserialize)]
#[serde(untagged)]
enum ContentListing {
    Directory(Vec<ContentEntry>),
    File(ContentEntry),
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

#[derive(Clone)]
pub struct GitHubFileStore {
    http: Client,
    store: Arc<dyn KeyValueStore>,
    settings: GitHubSettings,
}

impl GitHubFileStore {
    pub fn new(store: Arc<dyn KeyValueStore>, settings: GitHubSettings) -> RemoteResult<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;
        info!(
            "GitHub file store for {}/{} on branch {}",
            settings.owner, settings.repo, settings.branch
        );
        Ok(Self {
            http,
            store,
            settings,
        })
    }

    async fn token(&self) -> RemoteResult<String> {
        match get_item::<String>(self.store.as_ref(), &self.settings.token_key).await? {
            Some(token) if !token.trim().is_empty() => Ok(token),
            _ => {
                warn!("GitHub access token is not set");
                Err(RemoteStoreError::Unauthorized)
            }
        }
    }

    fn contents_url(&self, path: &str) -> RemoteResult<Url> {
        let mut url = Url::parse(&self.settings.api_base)
            .map_err(|err| RemoteStoreError::InvalidArgument(format!("api base: {}", err)))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                RemoteStoreError::InvalidArgument("api base cannot hold a path".into())
            })?;
            segments
                .pop_if_empty()
                .extend([
                    "repos",
                    self.settings.owner.as_str(),
                    self.settings.repo.as_str(),
                    "contents",
                ])
                .extend(path.split('/').filter(|s| !s.is_empty()));
        }
        url.query_pairs_mut()
            .append_pair("ref", &self.settings.branch);
        Ok(url)
    }

    /// Public URL of `path`, every segment percent-encoded.
    fn raw_url(&self, path: &str) -> String {
        let mut url = self.settings.raw_base.trim_end_matches('/').to_string();
        let segments = [self.settings.owner.as_str(), self.settings.repo.as_str()]
            .into_iter()
            .chain(self.settings.branch.split('/'))
            .chain(path.split('/'))
            .filter(|segment| !segment.is_empty());
        for segment in segments {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        url
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        accept: &'static str,
    ) -> RemoteResult<RequestBuilder> {
        let token = self.token().await?;
        Ok(self
            .http
            .request(method, self.contents_url(path)?)
            .bearer_auth(token)
            .header(header::ACCEPT, accept))
    }

    /// Sha of an existing file, needed to delete it.
    async fn file_sha(&self, path: &str) -> RemoteResult<String> {
        let response = self.request(Method::GET, path, ACCEPT_JSON).await?.send().await?;
        let response = check_status(response, path).await?;
        match response.json::<ContentListing>().await? {
            ContentListing::File(entry) => Ok(entry.sha),
            ContentListing::Directory(_) => Err(RemoteStoreError::InvalidArgument(format!(
                "`{}` is a directory",
                path
            ))),
        }
    }
}

/// Map non-success statuses onto store errors.
async fn check_status(response: Response, path: &str) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            error!("GitHub rejected the access token ({})", status);
            Err(RemoteStoreError::Unauthorized)
        }
        StatusCode::NOT_FOUND => Err(RemoteStoreError::NotFound(path.to_string())),
        _ => {
            let message = response
                .json::<ApiErrorBody>()
                .await
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
            Err(RemoteStoreError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl RemoteObjectStore for GitHubFileStore {
    async fn upload(
        &self,
        content: &[u8],
        file_name: &str,
        commit_message: &str,
    ) -> RemoteResult<String> {
        if file_name.is_empty() || file_name.contains('/') {
            return Err(RemoteStoreError::InvalidArgument(format!(
                "invalid file name `{}`",
                file_name
            )));
        }
        let path = remote_path(file_name, Utc::now(), Uuid::new_v4());
        info!("uploading {} to {}", file_name, path);

        let body = PutContentRequest {
            message: commit_message,
            content: general_purpose::STANDARD.encode(content),
            branch: &self.settings.branch,
        };
        let response = self
            .request(Method::PUT, &path, ACCEPT_JSON)
            .await?
            .json(&body)
            .send()
            .await
            .inspect_err(|err| error!("upload of {} failed: {}", file_name, err))?;
        check_status(response, &path).await?;

        let url = self.raw_url(&path);
        info!("uploaded {} -> {}", file_name, url);
        Ok(url)
    }

    async fn download(&self, path: &str) -> RemoteResult<Vec<u8>> {
        info!("downloading {}", path);
        let response = self
            .request(Method::GET, path, ACCEPT_RAW)
            .await?
            .send()
            .await?;
        let response = check_status(response, path).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn delete(&self, path: &str, commit_message: &str) -> RemoteResult<()> {
        info!("deleting {}", path);
        let sha = self.file_sha(path).await?;
        let body = DeleteContentRequest {
            message: commit_message,
            sha: &sha,
            branch: &self.settings.branch,
        };
        let response = self
            .request(Method::DELETE, path, ACCEPT_JSON)
            .await?
            .json(&body)
            .send()
            .await?;
        check_status(response, path).await?;
        info!("deleted {}", path);
        Ok(())
    }

    async fn list(&self, path: &str) -> RemoteResult<Vec<String>> {
        let response = self.request(Method::GET, path, ACCEPT_JSON).await?.send().await?;
        let response = check_status(response, path).await?;
        let paths = match response.json::<ContentListing>().await? {
            ContentListing::Directory(entries) => entries.into_iter().map(|e| e.path).collect(),
            ContentListing::File(entry) => vec![entry.path],
        };
        info!("listed {} entries under `{}`", paths.len(), path);
        Ok(paths)
    }

    async fn is_credential_set(&self) -> RemoteResult<bool> {
        let token = get_item::<String>(self.store.as_ref(), &self.settings.token_key).await?;
        Ok(token.is_some_and(|t| !t.trim().is_empty()))
    }

    async fn save_credential(&self, token: &str) -> RemoteResult<()> {
        if token.trim().is_empty() {
            warn!("refusing to save an empty GitHub access token");
            return Err(RemoteStoreError::InvalidArgument(
                "access token must not be empty".into(),
            ));
        }
        set_item(self.store.as_ref(), &self.settings.token_key, token.trim()).await?;
        info!("GitHub access token saved");
        Ok(())
    }

    fn path_from_url(&self, url: &str) -> Option<String> {
        let prefix = self.raw_url("");
        let encoded = url.strip_prefix(&prefix)?.strip_prefix('/')?;
        if encoded.is_empty() {
            return None;
        }
        let segments = encoded
            .split('/')
            .map(|segment| urlencoding::decode(segment).ok())
            .collect::<Option<Vec<_>>>()?;
        Some(segments.join("/"))
    }
}
