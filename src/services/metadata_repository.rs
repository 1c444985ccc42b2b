//! src/services/metadata_repository.rs
//!
//! MetadataRepository: CRUD over one record type, persisted as a single
//! JSON list under `"{TypeName}_Collection"` in a [`KeyValueStore`].
//!
//! Every mutation is a read-modify-write of the whole collection. Writers of
//! the same collection are serialized through a per-key mutex shared by all
//! repositories handed out by one [`MetadataServices`], so two concurrent
//! adds can never drop each other's record.

use crate::models::record::{MetadataRecord, collection_key, new_record_id};
use crate::services::kv_store::{KeyValueStore, KvError, get_item, set_item};
use chrono::Utc;
use std::{collections::HashMap, marker::PhantomData, sync::Arc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record id must not be empty")]
    EmptyId,
    #[error("{type_name} `{id}` not found")]
    NotFound { type_name: &'static str, id: String },
    #[error("{type_name} `{id}` already exists")]
    Conflict { type_name: &'static str, id: String },
    #[error("storage failure: {0}")]
    Storage(#[from] KvError),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

type CollectionLock = Arc<Mutex<()>>;

/// Hands out repositories that share one store and one set of write locks.
#[derive(Clone)]
pub struct MetadataServices {
    store: Arc<dyn KeyValueStore>,
    locks: Arc<std::sync::Mutex<HashMap<String, CollectionLock>>>,
}

impl MetadataServices {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            locks: Arc::default(),
        }
    }

    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        self.store.clone()
    }

    /// Repository for record type `T`.
    pub fn repository<T: MetadataRecord>(&self) -> MetadataRepository<T> {
        let storage_key = collection_key::<T>();
        let write_lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            locks.entry(storage_key.clone()).or_default().clone()
        };
        MetadataRepository {
            store: self.store.clone(),
            storage_key,
            write_lock,
            _record: PhantomData,
        }
    }
}

/// CRUD operations for one record type.
pub struct MetadataRepository<T> {
    store: Arc<dyn KeyValueStore>,
    storage_key: String,
    write_lock: CollectionLock,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for MetadataRepository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            storage_key: self.storage_key.clone(),
            write_lock: self.write_lock.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: MetadataRecord> MetadataRepository<T> {
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Every stored record, in insertion order.
    ///
    /// Never fails: a missing key yields an empty list, and unreadable or
    /// corrupt data is logged and also yields an empty list.
    pub async fn get_all(&self) -> Vec<T> {
        match self.load().await {
            Ok(items) => items,
            Err(err) => {
                warn!(
                    "failed to read {} collection `{}`: {}",
                    T::TYPE_NAME,
                    self.storage_key,
                    err
                );
                Vec::new()
            }
        }
    }

    /// First record whose id equals `id`.
    pub async fn get_by_id(&self, id: &str) -> Option<T> {
        let found = self.get_all().await.into_iter().find(|item| item.id() == id);
        if found.is_none() {
            warn!("{} `{}` not found", T::TYPE_NAME, id);
        }
        found
    }

    /// Store a new record.
    ///
    /// An empty id is replaced by a fresh one. Both timestamps are set to now.
    /// Fails with `Conflict` if the id is already taken, leaving storage as is.
    pub async fn add(&self, item: T) -> RepositoryResult<T> {
        let added = self.transaction(|records| records.insert(item)).await?;
        info!("added {} `{}`", T::TYPE_NAME, added.id());
        Ok(added)
    }

    /// Replace an existing record, keeping its original `created_at`.
    pub async fn update(&self, item: T) -> RepositoryResult<T> {
        let updated = self.transaction(|records| records.replace(item)).await?;
        info!("updated {} `{}`", T::TYPE_NAME, updated.id());
        Ok(updated)
    }

    /// Apply `change` to the stored record `id` and persist it.
    ///
    /// The closure sees the current stored value, so concurrent writers of
    /// other fields are not overwritten.
    pub async fn modify<F>(&self, id: &str, change: F) -> RepositoryResult<T>
    where
        F: FnOnce(&mut T),
    {
        let updated = self.transaction(|records| records.modify(id, change)).await?;
        info!("updated {} `{}`", T::TYPE_NAME, updated.id());
        Ok(updated)
    }

    /// Remove a record. Returns the removed value.
    pub async fn delete(&self, id: &str) -> RepositoryResult<T> {
        let removed = self.transaction(|records| records.remove(id)).await?;
        info!("deleted {} `{}`", T::TYPE_NAME, id);
        Ok(removed)
    }

    /// Run `body` against the stored collection while holding the write lock.
    ///
    /// Changes are persisted in a single write when `body` succeeds and
    /// discarded when it fails.
    pub async fn transaction<R, E, F>(&self, body: F) -> Result<R, E>
    where
        F: FnOnce(&mut Records<T>) -> Result<R, E>,
        E: From<RepositoryError>,
    {
        let _guard = self.write_lock.lock().await;
        let mut records = Records {
            items: self.load().await?,
            changed: false,
        };

        let out = body(&mut records)?;
        if records.changed {
            self.persist(&records.items).await?;
        }
        Ok(out)
    }

    /// Strict read used by mutations: storage errors propagate so a corrupt
    /// collection is never overwritten.
    async fn load(&self) -> RepositoryResult<Vec<T>> {
        let items = get_item::<Vec<T>>(self.store.as_ref(), &self.storage_key).await?;
        Ok(items.unwrap_or_default())
    }

    async fn persist(&self, items: &[T]) -> RepositoryResult<()> {
        set_item(self.store.as_ref(), &self.storage_key, items).await?;
        Ok(())
    }
}

/// A loaded collection being changed inside [`MetadataRepository::transaction`].
pub struct Records<T> {
    items: Vec<T>,
    changed: bool,
}

impl<T: MetadataRecord> Records<T> {
    pub fn all(&self) -> &[T] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    /// Same rules as [`MetadataRepository::add`].
    pub fn insert(&mut self, mut item: T) -> RepositoryResult<T> {
        if item.id().is_empty() {
            item.meta_mut().id = new_record_id();
            debug!("assigned id {} to new {}", item.id(), T::TYPE_NAME);
        }
        if self.get(item.id()).is_some() {
            warn!("{} `{}` already exists", T::TYPE_NAME, item.id());
            return Err(RepositoryError::Conflict {
                type_name: T::TYPE_NAME,
                id: item.id().to_string(),
            });
        }

        let now = Utc::now();
        let meta = item.meta_mut();
        meta.created_at = now;
        meta.updated_at = now;

        self.items.push(item.clone());
        self.changed = true;
        Ok(item)
    }

    /// Same rules as [`MetadataRepository::update`].
    pub fn replace(&mut self, mut item: T) -> RepositoryResult<T> {
        if item.id().is_empty() {
            warn!("refusing to update {} without id", T::TYPE_NAME);
            return Err(RepositoryError::EmptyId);
        }
        let position = self.position(item.id())?;

        let created_at = self.items[position].meta().created_at;
        let meta = item.meta_mut();
        meta.created_at = created_at;
        meta.updated_at = Utc::now().max(created_at);

        self.items[position] = item.clone();
        self.changed = true;
        Ok(item)
    }

    /// Change a stored record in place. Identity and `created_at` survive
    /// whatever `change` does to them.
    pub fn modify<F>(&mut self, id: &str, change: F) -> RepositoryResult<T>
    where
        F: FnOnce(&mut T),
    {
        if id.is_empty() {
            return Err(RepositoryError::EmptyId);
        }
        let position = self.position(id)?;

        let mut item = self.items[position].clone();
        change(&mut item);
        item.meta_mut().id = id.to_string();
        self.replace(item)
    }

    pub fn remove(&mut self, id: &str) -> RepositoryResult<T> {
        if id.is_empty() {
            warn!("refusing to delete {} without id", T::TYPE_NAME);
            return Err(RepositoryError::EmptyId);
        }
        let position = self.position(id)?;
        self.changed = true;
        Ok(self.items.remove(position))
    }

    fn position(&self, id: &str) -> RepositoryResult<usize> {
        self.items
            .iter()
            .position(|existing| existing.id() == id)
            .ok_or_else(|| {
                warn!("{} `{}` not found", T::TYPE_NAME, id);
                RepositoryError::NotFound {
                    type_name: T::TYPE_NAME,
                    id: id.to_string(),
                }
            })
    }
}
