//! Base shape shared by every persisted metadata record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

/// Identity and timestamps common to all records.
///
/// `id` and `created_at` never change once a record has been stored;
/// `updated_at` is refreshed on every successful update and never precedes
/// `created_at`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordMeta {
    /// Globally unique identifier (UUIDv4 text unless supplied by the caller).
    #[serde(default)]
    pub id: String,

    /// When the record was first stored.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// When the record was last stored.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl RecordMeta {
    /// Fresh identity stamped with the current time.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: new_record_id(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Identity with a caller-chosen id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::new()
        }
    }
}

impl Default for RecordMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a new record id.
pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// A type that can be persisted by [`MetadataRepository`].
///
/// `TYPE_NAME` is the explicit tag the collection key is derived from, so
/// renaming the Rust type never moves existing data.
///
/// [`MetadataRepository`]: crate::services::metadata_repository::MetadataRepository
pub trait MetadataRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TYPE_NAME: &'static str;

    fn meta(&self) -> &RecordMeta;

    fn meta_mut(&mut self) -> &mut RecordMeta;

    fn id(&self) -> &str {
        &self.meta().id
    }
}

/// Key-value key under which all records of `T` are stored as one list.
pub fn collection_key<T: MetadataRecord>() -> String {
    format!("{}_Collection", T::TYPE_NAME)
}
