//! Shared handler state.

use crate::models::{
    blog::{BlogPostMetadata, BlogSettingsMetadata},
    document::DocumentMetadata,
};
use crate::services::{
    admin_auth::AdminAuthService,
    content_processor::DocumentProcessor,
    github_store::RemoteObjectStore,
    kv_store::KeyValueStore,
    metadata_repository::{MetadataRepository, MetadataServices},
    versioning::VersionManager,
};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Probed by `/readyz`.
    pub db: Arc<SqlitePool>,
    pub documents: MetadataRepository<DocumentMetadata>,
    pub posts: MetadataRepository<BlogPostMetadata>,
    pub settings: MetadataRepository<BlogSettingsMetadata>,
    pub processor: DocumentProcessor,
    pub versions: VersionManager,
    pub remote: Arc<dyn RemoteObjectStore>,
    pub auth: AdminAuthService,
}

impl AppState {
    pub fn new(
        db: Arc<SqlitePool>,
        store: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteObjectStore>,
        processor: DocumentProcessor,
        auth: AdminAuthService,
    ) -> Self {
        let services = MetadataServices::new(store);
        let documents = services.repository::<DocumentMetadata>();
        Self {
            db,
            versions: VersionManager::new(documents.clone(), processor.clone()),
            documents,
            posts: services.repository(),
            settings: services.repository(),
            processor,
            remote,
            auth,
        }
    }
}
