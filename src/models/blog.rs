//! Blog posts and blog-wide settings.

use crate::models::record::{MetadataRecord, RecordMeta};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single blog article.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BlogPostMetadata {
    #[serde(flatten)]
    pub meta: RecordMeta,

    pub title: String,

    pub summary: String,

    /// Markdown body.
    pub content: String,

    pub author: String,

    pub tags: Vec<String>,

    pub category: String,

    pub is_published: bool,

    pub view_count: u64,
}

impl MetadataRecord for BlogPostMetadata {
    const TYPE_NAME: &'static str = "BlogPostMetadata";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}

/// Display settings for the whole blog. Normally a single record exists.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BlogSettingsMetadata {
    #[serde(flatten)]
    pub meta: RecordMeta,

    pub blog_name: String,

    pub description: String,

    pub author_name: String,

    pub posts_per_page: u32,

    pub show_summary: bool,

    pub theme: String,

    /// Social network name to profile URL.
    pub social_links: BTreeMap<String, String>,
}

impl Default for BlogSettingsMetadata {
    fn default() -> Self {
        Self {
            meta: RecordMeta::new(),
            blog_name: "My Blog".into(),
            description: String::new(),
            author_name: String::new(),
            posts_per_page: 10,
            show_summary: true,
            theme: "Default".into(),
            social_links: BTreeMap::new(),
        }
    }
}

impl MetadataRecord for BlogSettingsMetadata {
    const TYPE_NAME: &'static str = "BlogSettingsMetadata";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}
