pub mod admin_auth;
pub mod content_processor;
pub mod github_store;
pub mod kv_store;
pub mod metadata_repository;
pub mod ooxml;
pub mod versioning;
