//! src/services/versioning.rs
//!
//! VersionManager: document version lineage.
//!
//! `create_version` and `restore_version` are pure: they build the new head
//! record and mark the old head as historical, leaving persistence to the
//! caller. The `commit_version`, `list_versions`, `compare_versions` and
//! `restore_by_id` operations wire those rules to the document repository.

use crate::models::{
    document::{DocumentMetadata, INITIAL_VERSION},
    file_type::extension_of,
    record::{RecordMeta, new_record_id},
};
use crate::services::{
    content_processor::{DocumentProcessor, ProcessingError, html_escape},
    metadata_repository::{MetadataRepository, RepositoryError},
};
use chrono::Utc;
use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("new version file type ({actual}) does not match the document type ({expected})")]
    TypeMismatch { expected: String, actual: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("document `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Processing(#[from] ProcessingError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type VersionResult<T> = Result<T, VersionError>;

/// Next minor version: `X.Y` becomes `X.(Y+1)`; anything else, including a
/// minor number at `u32::MAX`, becomes `1.0`.
pub fn increment_version(version: &str) -> String {
    let mut parts = version.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(major), Some(minor), None) if !major.is_empty() => match minor.parse::<u32>() {
            Ok(minor) => match minor.checked_add(1) {
                Some(next) => format!("{}.{}", major, next),
                None => INITIAL_VERSION.to_string(),
            },
            Err(_) => INITIAL_VERSION.to_string(),
        },
        _ => INITIAL_VERSION.to_string(),
    }
}

/// One line of a version comparison.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "lowercase")]
pub enum DiffLine {
    Unchanged(String),
    Added(String),
    Removed(String),
}

/// Line-level difference between two document versions.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDiff {
    pub old_id: String,
    pub new_id: String,
    pub old_version: String,
    pub new_version: String,
    pub lines: Vec<DiffLine>,
}

impl VersionDiff {
    pub fn additions(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| matches!(l, DiffLine::Added(_)))
            .count()
    }

    pub fn deletions(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| matches!(l, DiffLine::Removed(_)))
            .count()
    }

    pub fn is_identical(&self) -> bool {
        self.additions() == 0 && self.deletions() == 0
    }

    pub fn to_html(&self) -> String {
        let mut out = String::from("<div class=\"diff-container\">");
        for line in &self.lines {
            let (class, text) = match line {
                DiffLine::Unchanged(text) => ("diff-unchanged", text),
                DiffLine::Added(text) => ("diff-new", text),
                DiffLine::Removed(text) => ("diff-old", text),
            };
            out.push_str(&format!(
                "<div class=\"{}\">{}</div>",
                class,
                html_escape(text)
            ));
        }
        out.push_str("</div>");
        out
    }
}

/// Lines of `new` compared against `old`.
pub fn diff_text(old: &str, new: &str) -> Vec<DiffLine> {
    TextDiff::from_lines(old, new)
        .iter_all_changes()
        .map(|change| {
            let text = change.value().trim_end_matches(['\r', '\n']).to_string();
            match change.tag() {
                ChangeTag::Equal => DiffLine::Unchanged(text),
                ChangeTag::Insert => DiffLine::Added(text),
                ChangeTag::Delete => DiffLine::Removed(text),
            }
        })
        .collect()
}

#[derive(Clone)]
pub struct VersionManager {
    documents: MetadataRepository<DocumentMetadata>,
    processor: DocumentProcessor,
}

impl VersionManager {
    pub fn new(documents: MetadataRepository<DocumentMetadata>, processor: DocumentProcessor) -> Self {
        Self {
            documents,
            processor,
        }
    }

    /// Build the successor of `original` from a replacement file.
    ///
    /// `original` is marked historical and pointed at the new record. The
    /// caller persists both.
    pub fn create_version(
        &self,
        original: &mut DocumentMetadata,
        content: &[u8],
        file_name: &str,
        version_note: &str,
    ) -> VersionResult<DocumentMetadata> {
        let extension = extension_of(file_name);
        if extension != original.file_type {
            return Err(VersionError::TypeMismatch {
                expected: original.file_type.clone(),
                actual: extension,
            });
        }

        let mut next = self.processor.process_file(file_name, content, true)?;
        next.title = original.title.clone();
        next.tags = original.tags.clone();
        next.category = original.category.clone();
        next.author = original.author.clone();
        next.is_public = original.is_public;
        next.version = increment_version(&original.version);
        next.version_note = version_note.to_string();
        next.version_history = original.lineage_for_successor();
        next.is_history_version = false;
        next.parent_document_id = None;

        original.supersede(&next.meta.id);
        Ok(next)
    }

    /// Build a new head whose content is taken from `version_to_restore`.
    ///
    /// The restored version must be an ancestor of `current`. `current` is
    /// marked historical and pointed at the new record. The caller persists
    /// both.
    pub fn restore_version(
        &self,
        current: Option<&mut DocumentMetadata>,
        version_to_restore: Option<&DocumentMetadata>,
    ) -> VersionResult<DocumentMetadata> {
        let (Some(current), Some(target)) = (current, version_to_restore) else {
            return Err(VersionError::InvalidArgument(
                "current document and version to restore are both required".into(),
            ));
        };

        let is_ancestor = target.parent_document_id.as_deref() == Some(current.meta.id.as_str())
            || current.version_history.contains(&target.meta.id);
        if !is_ancestor {
            return Err(VersionError::InvalidOperation(format!(
                "`{}` is not a version of document `{}`",
                target.meta.id, current.meta.id
            )));
        }

        let restored = DocumentMetadata {
            meta: RecordMeta::with_id(new_record_id()),
            title: current.title.clone(),
            file_name: target.file_name.clone(),
            file_type: target.file_type.clone(),
            file_size: target.file_size,
            content_base64: target.content_base64.clone(),
            description: target.description.clone(),
            author: current.author.clone(),
            category: current.category.clone(),
            tags: current.tags.clone(),
            is_public: current.is_public,
            modified_date: Utc::now(),
            version_note: format!("Restored from version {}", target.version),
            version: increment_version(&current.version),
            version_history: current.lineage_for_successor(),
            is_history_version: false,
            parent_document_id: None,
            ..Default::default()
        };

        current.supersede(&restored.meta.id);
        Ok(restored)
    }

    /// Create and persist a new version of the stored document `document_id`.
    ///
    /// The head check and both writes happen in one repository transaction,
    /// so two commits against the same head cannot both succeed.
    pub async fn commit_version(
        &self,
        document_id: &str,
        content: &[u8],
        file_name: &str,
        version_note: &str,
    ) -> VersionResult<DocumentMetadata> {
        let next = self
            .documents
            .transaction(|records| -> VersionResult<DocumentMetadata> {
                let mut original = find(records.all(), document_id)?.clone();
                if !original.is_current() {
                    return Err(VersionError::InvalidOperation(format!(
                        "document `{}` is a historical version",
                        document_id
                    )));
                }

                let next = self.create_version(&mut original, content, file_name, version_note)?;
                let next = records.insert(next)?;
                records.replace(original)?;
                Ok(next)
            })
            .await?;
        info!(
            "created version {} of document {} as {}",
            next.version,
            document_id,
            next.meta.id
        );
        Ok(next)
    }

    /// Every version in the lineage of `document_id`, newest first.
    ///
    /// Any member of a lineage may be given; the chain is resolved from its
    /// current head.
    pub async fn list_versions(&self, document_id: &str) -> VersionResult<Vec<DocumentMetadata>> {
        let all = self.documents.get_all().await;
        let head = resolve_head(&all, document_id)?;

        let mut versions = Vec::with_capacity(head.version_history.len() + 1);
        versions.push(head.clone());
        for ancestor_id in &head.version_history {
            match all.iter().find(|doc| &doc.meta.id == ancestor_id) {
                Some(doc) => versions.push(doc.clone()),
                None => warn!(
                    "version {} of document {} is missing from storage",
                    ancestor_id, head.meta.id
                ),
            }
        }
        Ok(versions)
    }

    /// Line-level comparison of two versions of the same document.
    pub async fn compare_versions(&self, old_id: &str, new_id: &str) -> VersionResult<VersionDiff> {
        let all = self.documents.get_all().await;
        let old_head = resolve_head(&all, old_id)?;
        let new_head = resolve_head(&all, new_id)?;
        if old_head.meta.id != new_head.meta.id {
            return Err(VersionError::InvalidOperation(format!(
                "`{}` and `{}` belong to different documents",
                old_id, new_id
            )));
        }

        let old = find(&all, old_id)?;
        let new = find(&all, new_id)?;
        let old_text = self.inline_text(old)?;
        let new_text = self.inline_text(new)?;

        Ok(VersionDiff {
            old_id: old.meta.id.clone(),
            new_id: new.meta.id.clone(),
            old_version: old.version.clone(),
            new_version: new.version.clone(),
            lines: diff_text(&old_text, &new_text),
        })
    }

    /// Restore a historical version as the new head of its lineage.
    pub async fn restore_by_id(&self, version_id: &str) -> VersionResult<DocumentMetadata> {
        let restored = self
            .documents
            .transaction(|records| -> VersionResult<DocumentMetadata> {
                let target = find(records.all(), version_id)?.clone();
                let mut current = resolve_head(records.all(), version_id)?.clone();
                if current.meta.id == target.meta.id {
                    return Err(VersionError::InvalidOperation(format!(
                        "`{}` is already the current version",
                        version_id
                    )));
                }

                let restored = self.restore_version(Some(&mut current), Some(&target))?;
                let restored = records.insert(restored)?;
                records.replace(current)?;
                Ok(restored)
            })
            .await?;
        info!(
            "restored version {} as {} ({})",
            version_id, restored.meta.id, restored.version
        );
        Ok(restored)
    }

    /// Remove every stored version in the lineage of `document_id` in a
    /// single write. Returns the removed records, head first.
    pub async fn delete_lineage(&self, document_id: &str) -> VersionResult<Vec<DocumentMetadata>> {
        let removed = self
            .documents
            .transaction(|records| -> VersionResult<Vec<DocumentMetadata>> {
                let head = resolve_head(records.all(), document_id)?.clone();
                let mut removed = vec![records.remove(&head.meta.id)?];
                for ancestor_id in &head.version_history {
                    if records.get(ancestor_id).is_none() {
                        warn!(
                            "version {} of document {} is missing from storage",
                            ancestor_id, head.meta.id
                        );
                        continue;
                    }
                    removed.push(records.remove(ancestor_id)?);
                }
                Ok(removed)
            })
            .await?;
        info!(
            "deleted {} version(s) of document {}",
            removed.len(),
            document_id
        );
        Ok(removed)
    }

    fn inline_text(&self, document: &DocumentMetadata) -> VersionResult<String> {
        let content = self.processor.inline_content(document)?.ok_or_else(|| {
            VersionError::InvalidOperation(format!(
                "document `{}` has no inline content to compare",
                document.meta.id
            ))
        })?;
        Ok(self.processor.extract_text(&content, &document.file_type)?)
    }
}

fn find<'a>(all: &'a [DocumentMetadata], id: &str) -> VersionResult<&'a DocumentMetadata> {
    all.iter()
        .find(|doc| doc.meta.id == id)
        .ok_or_else(|| VersionError::NotFound(id.to_string()))
}

/// Follow `parent_document_id` links from `id` to the current version.
fn resolve_head<'a>(all: &'a [DocumentMetadata], id: &str) -> VersionResult<&'a DocumentMetadata> {
    let mut current = find(all, id)?;
    let mut seen = HashSet::new();
    while let Some(parent_id) = current.parent_document_id.as_deref() {
        if !seen.insert(current.meta.id.as_str()) {
            return Err(VersionError::InvalidOperation(format!(
                "version chain of `{}` contains a cycle",
                id
            )));
        }
        current = find(all, parent_id)?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        kv_store::{InMemoryKeyValueStore, tests::YieldingStore},
        metadata_repository::MetadataServices,
    };
    use base64::{Engine as _, engine::general_purpose};
    use std::sync::Arc;

    fn manager() -> VersionManager {
        let services = MetadataServices::new(Arc::new(InMemoryKeyValueStore::new()));
        VersionManager::new(services.repository(), DocumentProcessor::default())
    }

    fn markdown_doc(id: &str, body: &str) -> DocumentMetadata {
        DocumentMetadata {
            meta: RecordMeta::with_id(id),
            title: "Notes".into(),
            file_name: "notes.md".into(),
            file_type: ".md".into(),
            file_size: body.len() as u64,
            content_base64: Some(general_purpose::STANDARD.encode(body)),
            tags: vec!["rust".into()],
            category: "Tutorials".into(),
            author: "ada".into(),
            is_public: false,
            ..Default::default()
        }
    }

    #[test]
    fn version_increment_law() {
        assert_eq!(increment_version("1.3"), "1.4");
        assert_eq!(increment_version("2.9"), "2.10");
        assert_eq!(increment_version("abc"), "1.0");
        assert_eq!(increment_version("1.x"), "1.0");
        assert_eq!(increment_version("1.2.3"), "1.0");
        assert_eq!(increment_version(""), "1.0");
        assert_eq!(increment_version("1.4294967295"), "1.0");
        assert_eq!(increment_version("3.4294967294"), "3.4294967295");
    }

    #[test]
    fn create_version_scenario() {
        let manager = manager();
        let mut original = markdown_doc("d1", "helo");

        let next = manager
            .create_version(&mut original, b"hello", "v2.md", "fixed typo")
            .unwrap();

        assert_eq!(next.version, "1.1");
        assert_eq!(next.version_history, vec!["d1"]);
        assert_eq!(next.version_note, "fixed typo");
        assert_eq!(next.file_name, "v2.md");
        assert_eq!(next.title, "Notes");
        assert_eq!(next.tags, vec!["rust"]);
        assert_eq!(next.author, "ada");
        assert!(!next.is_public);
        assert!(next.is_current());
        assert!(original.is_history_version);
        assert_eq!(original.parent_document_id.as_deref(), Some(next.meta.id.as_str()));
    }

    #[test]
    fn create_version_extends_history() {
        let manager = manager();
        let mut original = markdown_doc("d1", "a");
        original.version_history = vec!["v0".into()];

        let next = manager
            .create_version(&mut original, b"b", "notes.md", "")
            .unwrap();

        assert_eq!(next.version_history, vec!["d1", "v0"]);
        assert!(original.is_history_version);
    }

    #[test]
    fn create_version_rejects_other_type() {
        let manager = manager();
        let mut original = markdown_doc("d1", "a");

        let err = manager
            .create_version(&mut original, b"b", "notes.txt", "")
            .unwrap_err();

        assert!(matches!(err, VersionError::TypeMismatch { .. }));
        assert!(original.is_current());
    }

    #[test]
    fn restore_requires_both_documents() {
        let manager = manager();
        let mut current = markdown_doc("d2", "b");
        assert!(matches!(
            manager.restore_version(Some(&mut current), None),
            Err(VersionError::InvalidArgument(_))
        ));
        assert!(matches!(
            manager.restore_version(None, Some(&markdown_doc("d1", "a"))),
            Err(VersionError::InvalidArgument(_))
        ));
    }

    #[test]
    fn restore_rejects_unrelated_version() {
        let manager = manager();
        let mut current = markdown_doc("d2", "b");
        current.version_history = vec!["d1".into()];
        let stranger = markdown_doc("x9", "zzz");

        let err = manager
            .restore_version(Some(&mut current), Some(&stranger))
            .unwrap_err();

        assert!(matches!(err, VersionError::InvalidOperation(_)));
        assert!(current.is_current());
    }

    #[test]
    fn restore_copies_content_and_attribution() {
        let manager = manager();
        let mut old = markdown_doc("d1", "old body");
        old.description = "old".into();
        old.supersede("d2");
        let mut current = markdown_doc("d2", "new body");
        current.title = "Renamed".into();
        current.version = "1.1".into();
        current.version_history = vec!["d1".into()];

        let restored = manager
            .restore_version(Some(&mut current), Some(&old))
            .unwrap();

        assert_ne!(restored.meta.id, "d1");
        assert_ne!(restored.meta.id, "d2");
        assert_eq!(restored.content_base64, old.content_base64);
        assert_eq!(restored.description, "old");
        assert_eq!(restored.title, "Renamed");
        assert_eq!(restored.version, "1.2");
        assert_eq!(restored.version_history, vec!["d2", "d1"]);
        assert_eq!(restored.version_note, "Restored from version 1.0");
        assert!(current.is_history_version);
        assert_eq!(current.parent_document_id.as_deref(), Some(restored.meta.id.as_str()));
    }

    #[tokio::test]
    async fn commit_list_compare_and_restore() {
        let manager = manager();
        manager
            .documents
            .add(markdown_doc("d1", "line one\nline two\n"))
            .await
            .unwrap();

        let v2 = manager
            .commit_version("d1", b"line one\nline 2\n", "notes.md", "edit")
            .await
            .unwrap();
        let v3 = manager
            .commit_version(&v2.meta.id, b"line one\nline 2\nline three\n", "notes.md", "more")
            .await
            .unwrap();

        let stored_d1 = manager.documents.get_by_id("d1").await.unwrap();
        assert_eq!(stored_d1.parent_document_id.as_deref(), Some(v2.meta.id.as_str()));

        let versions = manager.list_versions("d1").await.unwrap();
        let ids: Vec<_> = versions.iter().map(|d| d.meta.id.as_str()).collect();
        assert_eq!(ids, vec![v3.meta.id.as_str(), v2.meta.id.as_str(), "d1"]);
        assert_eq!(versions[0].version, "1.2");

        let diff = manager.compare_versions("d1", &v3.meta.id).await.unwrap();
        assert_eq!(diff.additions(), 2);
        assert_eq!(diff.deletions(), 1);
        assert!(diff.to_html().contains("<div class=\"diff-old\">line two</div>"));

        let restored = manager.restore_by_id("d1").await.unwrap();
        assert_eq!(restored.version, "1.3");
        assert_eq!(restored.content_base64, stored_d1.content_base64);
        assert_eq!(restored.version_history[0], v3.meta.id);
        assert_eq!(manager.list_versions(&v3.meta.id).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn commit_rejects_historical_and_missing_documents() {
        let manager = manager();
        manager.documents.add(markdown_doc("d1", "a")).await.unwrap();
        manager
            .commit_version("d1", b"b", "notes.md", "")
            .await
            .unwrap();

        assert!(matches!(
            manager.commit_version("d1", b"c", "notes.md", "").await,
            Err(VersionError::InvalidOperation(_))
        ));
        assert!(matches!(
            manager.commit_version("nope", b"c", "notes.md", "").await,
            Err(VersionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn compare_rejects_different_documents() {
        let manager = manager();
        manager.documents.add(markdown_doc("a", "x")).await.unwrap();
        manager.documents.add(markdown_doc("b", "y")).await.unwrap();

        assert!(matches!(
            manager.compare_versions("a", "b").await,
            Err(VersionError::InvalidOperation(_))
        ));
    }

    #[tokio::test]
    async fn restoring_the_head_is_rejected() {
        let manager = manager();
        manager.documents.add(markdown_doc("d1", "x")).await.unwrap();

        assert!(matches!(
            manager.restore_by_id("d1").await,
            Err(VersionError::InvalidOperation(_))
        ));
    }

    #[tokio::test]
    async fn cyclic_chains_are_reported() {
        let manager = manager();
        let mut a = markdown_doc("a", "x");
        a.supersede("b");
        let mut b = markdown_doc("b", "y");
        b.supersede("a");
        manager.documents.add(a).await.unwrap();
        manager.documents.add(b).await.unwrap();

        assert!(matches!(
            manager.list_versions("a").await,
            Err(VersionError::InvalidOperation(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_commits_keep_a_single_head() {
        let services = MetadataServices::new(Arc::new(YieldingStore::default()));
        let manager = VersionManager::new(services.repository(), DocumentProcessor::default());
        manager.documents.add(markdown_doc("d1", "base")).await.unwrap();

        let (first, second) = tokio::join!(
            manager.commit_version("d1", b"left", "notes.md", "left"),
            manager.commit_version("d1", b"right", "notes.md", "right"),
        );

        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(VersionError::InvalidOperation(_)))));

        let all = manager.documents.get_all().await;
        let heads: Vec<_> = all.iter().filter(|d| d.is_current()).collect();
        assert_eq!(all.len(), 2);
        assert_eq!(heads.len(), 1);
        assert_eq!(heads[0].version_history, vec!["d1"]);
    }

    #[tokio::test]
    async fn concurrent_restores_keep_a_single_head() {
        let services = MetadataServices::new(Arc::new(YieldingStore::default()));
        let manager = VersionManager::new(services.repository(), DocumentProcessor::default());
        manager.documents.add(markdown_doc("d1", "base")).await.unwrap();
        manager
            .commit_version("d1", b"next", "notes.md", "")
            .await
            .unwrap();

        let (first, second) = tokio::join!(manager.restore_by_id("d1"), manager.restore_by_id("d1"));
        first.unwrap();
        second.unwrap();

        let versions = manager.list_versions("d1").await.unwrap();
        let all = manager.documents.get_all().await;
        assert_eq!(all.iter().filter(|d| d.is_current()).count(), 1);
        assert_eq!(versions.len(), 4);
        assert_eq!(versions[0].version, "1.3");
    }

    #[tokio::test]
    async fn delete_lineage_removes_every_version_at_once() {
        let manager = manager();
        manager.documents.add(markdown_doc("d1", "a")).await.unwrap();
        manager.documents.add(markdown_doc("other", "z")).await.unwrap();
        let v2 = manager
            .commit_version("d1", b"b", "notes.md", "")
            .await
            .unwrap();
        let v3 = manager
            .commit_version(&v2.meta.id, b"c", "notes.md", "")
            .await
            .unwrap();

        let removed = manager.delete_lineage(&v2.meta.id).await.unwrap();

        let ids: Vec<_> = removed.iter().map(|d| d.meta.id.as_str()).collect();
        assert_eq!(ids, vec![v3.meta.id.as_str(), v2.meta.id.as_str(), "d1"]);
        let left: Vec<_> = manager
            .documents
            .get_all()
            .await
            .into_iter()
            .map(|d| d.meta.id)
            .collect();
        assert_eq!(left, vec!["other"]);
        assert!(matches!(
            manager.delete_lineage("d1").await,
            Err(VersionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_lineage_leaves_storage_untouched_on_error() {
        let manager = manager();
        let mut a = markdown_doc("a", "x");
        a.supersede("b");
        let mut b = markdown_doc("b", "y");
        b.supersede("a");
        manager.documents.add(a).await.unwrap();
        manager.documents.add(b).await.unwrap();

        assert!(manager.delete_lineage("a").await.is_err());
        assert_eq!(manager.documents.get_all().await.len(), 2);
    }
}
