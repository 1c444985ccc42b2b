//! Represents an uploaded document and its place in a version lineage.

use crate::models::{
    file_type,
    record::{MetadataRecord, RecordMeta},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Version assigned to new documents and to malformed version strings.
pub const INITIAL_VERSION: &str = "1.0";

/// Metadata for a single stored document version.
///
/// A document is either the *current* version (`is_history_version == false`,
/// `parent_document_id == None`) or a *historical* one whose
/// `parent_document_id` names the version that superseded it. The current
/// version's `version_history` lists every ancestor id, most recent first.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentMetadata {
    #[serde(flatten)]
    pub meta: RecordMeta,

    /// Display title.
    pub title: String,

    /// Original file name as uploaded.
    pub file_name: String,

    /// Lower-cased extension including the dot (e.g. `.md`).
    pub file_type: String,

    /// Size in bytes.
    pub file_size: u64,

    /// Free text, usually the start of the extracted text.
    pub description: String,

    pub tags: Vec<String>,

    /// When the file content last changed.
    pub modified_date: DateTime<Utc>,

    /// Raw-content URL in the remote store, if the file was uploaded.
    pub remote_url: Option<String>,

    pub is_public: bool,

    /// Inline content for files kept without a remote upload.
    pub content_base64: Option<String>,

    pub category: String,

    pub author: String,

    pub has_html_version: bool,

    pub html_url: Option<String>,

    /// `MAJOR.MINOR`.
    pub version: String,

    /// Ancestor version ids, most recent first.
    pub version_history: Vec<String>,

    pub is_history_version: bool,

    /// For historical versions, the id of the version that replaced it.
    pub parent_document_id: Option<String>,

    /// What changed in this version.
    pub version_note: String,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            meta: RecordMeta::new(),
            title: String::new(),
            file_name: String::new(),
            file_type: String::new(),
            file_size: 0,
            description: String::new(),
            tags: Vec::new(),
            modified_date: Utc::now(),
            remote_url: None,
            is_public: true,
            content_base64: None,
            category: String::new(),
            author: String::new(),
            has_html_version: false,
            html_url: None,
            version: INITIAL_VERSION.to_string(),
            version_history: Vec::new(),
            is_history_version: false,
            parent_document_id: None,
            version_note: String::new(),
        }
    }
}

impl MetadataRecord for DocumentMetadata {
    const TYPE_NAME: &'static str = "DocumentMetadata";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}

impl DocumentMetadata {
    /// True for the head of a lineage.
    pub fn is_current(&self) -> bool {
        !self.is_history_version && self.parent_document_id.is_none()
    }

    /// Mark this version as superseded by `successor_id`.
    pub fn supersede(&mut self, successor_id: &str) {
        self.is_history_version = true;
        self.parent_document_id = Some(successor_id.to_string());
    }

    /// Lineage a successor of this version inherits: this id, then our ancestors.
    pub fn lineage_for_successor(&self) -> Vec<String> {
        let mut history = Vec::with_capacity(self.version_history.len() + 1);
        history.push(self.meta.id.clone());
        history.extend(self.version_history.iter().cloned());
        history
    }

    /// Remote store folder for this document's file type.
    pub fn type_folder(&self) -> &'static str {
        file_type::type_folder(&self.file_type)
    }

    pub fn mime_type(&self) -> &'static str {
        file_type::mime_type(&self.file_type)
    }

    pub fn formatted_size(&self) -> String {
        file_type::format_file_size(self.file_size)
    }

    /// Lower-cased search keywords drawn from title words, tags, category and
    /// file type.
    pub fn keywords(&self) -> BTreeSet<String> {
        const SEPARATORS: &[char] = &[
            ' ', '.', ',', ';', ':', '(', ')', '[', ']', '{', '}', '-', '_', '/',
        ];

        let mut keywords = BTreeSet::new();
        for word in self.title.split(SEPARATORS) {
            if word.chars().count() >= 2 {
                keywords.insert(word.to_lowercase());
            }
        }
        for tag in &self.tags {
            keywords.insert(tag.to_lowercase());
        }
        if !self.category.is_empty() {
            keywords.insert(self.category.to_lowercase());
        }
        if !self.file_type.is_empty() {
            keywords.insert(self.file_type.trim_start_matches('.').to_lowercase());
        }
        keywords
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_documents_are_current_at_initial_version() {
        let doc = DocumentMetadata::default();
        assert!(doc.is_current());
        assert_eq!(doc.version, INITIAL_VERSION);
        assert!(doc.is_public);
        assert!(!doc.meta.id.is_empty());
    }

    #[test]
    fn supersede_marks_history() {
        let mut doc = DocumentMetadata::default();
        doc.supersede("next");
        assert!(!doc.is_current());
        assert!(doc.is_history_version);
        assert_eq!(doc.parent_document_id.as_deref(), Some("next"));
    }

    #[test]
    fn successor_lineage_is_most_recent_first() {
        let doc = DocumentMetadata {
            meta: RecordMeta::with_id("d2"),
            version_history: vec!["d1".into(), "d0".into()],
            ..Default::default()
        };
        assert_eq!(doc.lineage_for_successor(), vec!["d2", "d1", "d0"]);
    }

    #[test]
    fn keywords_cover_title_tags_category_and_type() {
        let doc = DocumentMetadata {
            title: "Rust async-guide (v2)".into(),
            tags: vec!["Tokio".into()],
            category: "Tutorials".into(),
            file_type: ".md".into(),
            ..Default::default()
        };
        let keywords = doc.keywords();
        for expected in ["rust", "async", "guide", "v2", "tokio", "tutorials", "md"] {
            assert!(keywords.contains(expected), "missing {expected}");
        }
    }

    #[test]
    fn serializes_camel_case_with_flattened_identity() {
        let doc = DocumentMetadata {
            meta: RecordMeta::with_id("d1"),
            file_type: ".md".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["id"], "d1");
        assert_eq!(json["fileType"], ".md");
        assert!(json.get("createdAt").is_some());
        assert_eq!(json["isHistoryVersion"], false);

        let back: DocumentMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }
}
