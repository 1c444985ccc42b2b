//! Core data models for the blog and document store.
//!
//! Every persisted entity flattens a [`record::RecordMeta`] and implements
//! [`record::MetadataRecord`], which is all the metadata repository needs to
//! store it. Records serialize as camelCase JSON.

pub mod blog;
pub mod document;
pub mod file_type;
pub mod record;
