//! In-memory document store

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::{document_id, Document, DocumentStore};
use crate::{Result, StorageError};

type Collections = BTreeMap<String, Vec<Document>>;

/// Process-local store. Cloning shares the underlying collections.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every collection (test helper and JSON export)
    pub fn dump(&self) -> BTreeMap<String, Vec<Document>> {
        self.collections.read().clone()
    }

}

/// Reject batches with missing or duplicate ids before touching `existing`.
pub(crate) fn check_insert(existing: &[Document], docs: &[Document], collection: &str) -> Result<()> {
    let mut seen: HashSet<&str> = existing
        .iter()
        .filter_map(|d| document_id(d).ok())
        .collect();
    for doc in docs {
        let id = document_id(doc)?;
        if !seen.insert(id) {
            return Err(StorageError::database(format!(
                "duplicate key {} in collection {}",
                id, collection
            )));
        }
    }
    Ok(())
}

/// Unset `fields` on each document; returns how many documents changed.
pub(crate) fn unset_fields(docs: &mut [Document], fields: &[&str]) -> usize {
    let mut modified = 0;
    for doc in docs.iter_mut() {
        let mut touched = false;
        for field in fields {
            touched |= doc.remove(*field).is_some();
        }
        if touched {
            modified += 1;
        }
    }
    modified
}

/// Insert or replace by id, keeping the original position on replace.
pub(crate) fn upsert_into(docs: &mut Vec<Document>, doc: Document) -> Result<()> {
    let id = document_id(&doc)?.to_string();
    match docs
        .iter_mut()
        .find(|d| document_id(d).map(|d| d == id).unwrap_or(false))
    {
        Some(slot) => *slot = doc,
        None => docs.push(doc),
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.collections.read().keys().cloned().collect())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().contains_key(name))
    }

    async fn find(&self, collection: &str) -> Result<Vec<Document>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_one(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let collections = self.collections.read();
        Ok(collections.get(collection).and_then(|docs| {
            docs.iter()
                .find(|d| document_id(d).map(|d| d == id).unwrap_or(false))
                .cloned()
        }))
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<()> {
        let mut collections = self.collections.write();
        let existing = collections.get(collection).map(Vec::as_slice).unwrap_or(&[]);
        check_insert(existing, &docs, collection)?;
        collections
            .entry(collection.to_string())
            .or_default()
            .extend(docs);
        Ok(())
    }

    async fn replace_collection(&self, collection: &str, docs: Vec<Document>) -> Result<()> {
        check_insert(&[], &docs, collection)?;
        self.collections.write().insert(collection.to_string(), docs);
        Ok(())
    }

    async fn upsert(&self, collection: &str, doc: Document) -> Result<()> {
        let mut collections = self.collections.write();
        upsert_into(collections.entry(collection.to_string()).or_default(), doc)
    }

    async fn update_many_unset(&self, collection: &str, fields: &[&str]) -> Result<usize> {
        let mut collections = self.collections.write();
        Ok(collections
            .get_mut(collection)
            .map(|docs| unset_fields(docs, fields))
            .unwrap_or(0))
    }

    async fn rename_collection(&self, from: &str, to: &str) -> Result<()> {
        let mut collections = self.collections.write();
        if collections.contains_key(to) {
            return Err(StorageError::collection_exists(to));
        }
        let docs = collections
            .remove(from)
            .ok_or_else(|| StorageError::collection_not_found(from))?;
        collections.insert(to.to_string(), docs);
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<bool> {
        Ok(self.collections.write().remove(name).is_some())
    }
}
