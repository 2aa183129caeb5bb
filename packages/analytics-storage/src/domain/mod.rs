//! Domain layer for the document store port
//!
//! # Domain Models
//!
//! - `Document`: a JSON object keyed by `_id` (string)
//!
//! # Port Trait
//!
//! - `DocumentStore`: the subset of document-database operations the upgrade
//!   controllers need (collection listing, bulk unset, rename, copy, upsert)
//!
//! # Examples
//!
//! ```rust,ignore
//! use analytics_storage::{DocumentStore, MemoryStore, document};
//!
//! let store = MemoryStore::new();
//! store.insert_many("sessions", vec![document("s1", json!({"gameId": "g1"}))?]).await?;
//! store.rename_collection("sessions", "activities").await?;
//! assert!(store.collection_exists("activities").await?);
//! ```

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{Result, StorageError};

/// Field holding the document identity
pub const ID_FIELD: &str = "_id";

/// A stored document: a JSON object with a string `_id`
pub type Document = Map<String, Value>;

/// Build a document from an id and a JSON object body.
///
/// The body must be an object; `_id` is overwritten with `id`.
pub fn document(id: impl Into<String>, body: Value) -> Result<Document> {
    let mut doc = match body {
        Value::Object(map) => map,
        other => {
            return Err(StorageError::invalid_document(format!(
                "document body must be an object, got {}",
                other
            )))
        }
    };
    doc.insert(ID_FIELD.to_string(), Value::String(id.into()));
    Ok(doc)
}

/// Read the `_id` of a document
pub fn document_id(doc: &Document) -> Result<&str> {
    doc.get(ID_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| StorageError::invalid_document("document has no string _id"))
}

/// Document store abstraction
///
/// Semantics follow the document database the analytics backend runs on:
///
/// - reading a missing collection yields no documents, not an error
/// - inserting into a missing collection creates it
/// - `rename_collection` fails if the source is missing or the target exists
///
/// # Implementations
///
/// - `MemoryStore`: process-local, used by tests and dry runs
/// - `JsonDirStore`: one JSON array file per collection under a directory
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Names of all existing collections, sorted
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Does a collection exist?
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.list_collections().await?.iter().any(|c| c == name))
    }

    /// All documents of a collection (empty if the collection is missing)
    async fn find(&self, collection: &str) -> Result<Vec<Document>>;

    /// A single document by `_id`
    async fn find_one(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Insert documents, creating the collection if needed (even for an
    /// empty batch)
    ///
    /// # Errors
    ///
    /// Fails on a document without `_id` or on a duplicate `_id`; nothing is
    /// written in that case.
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<()>;

    /// Replace every document of a collection in one write, creating it if
    /// needed
    ///
    /// # Errors
    ///
    /// Same as `insert_many`; the old documents stay in place on error.
    async fn replace_collection(&self, collection: &str, docs: Vec<Document>) -> Result<()>;

    /// Insert or replace a document by `_id`
    async fn upsert(&self, collection: &str, doc: Document) -> Result<()>;

    /// Remove `fields` from every document of a collection
    ///
    /// # Returns
    ///
    /// Number of documents that had at least one of the fields
    async fn update_many_unset(&self, collection: &str, fields: &[&str]) -> Result<usize>;

    /// Rename a collection
    async fn rename_collection(&self, from: &str, to: &str) -> Result<()>;

    /// Drop a collection. Returns whether it existed.
    async fn drop_collection(&self, name: &str) -> Result<bool>;

    /// Copy every document of `from` into a new collection `to`
    async fn copy_collection(&self, from: &str, to: &str) -> Result<()> {
        if !self.collection_exists(from).await? {
            return Err(StorageError::collection_not_found(from));
        }
        if self.collection_exists(to).await? {
            return Err(StorageError::collection_exists(to));
        }
        let docs = self.find(from).await?;
        self.insert_many(to, docs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_document_sets_id() {
        let doc = document("abc", json!({"gameId": "g1"})).unwrap();
        assert_eq!(document_id(&doc).unwrap(), "abc");
        assert_eq!(doc["gameId"], "g1");
    }

    #[test]
    fn test_document_overrides_existing_id() {
        let doc = document("new", json!({"_id": "old"})).unwrap();
        assert_eq!(document_id(&doc).unwrap(), "new");
    }

    #[test]
    fn test_document_rejects_non_object() {
        let err = document("abc", json!([1, 2])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidDocument);
    }

    #[test]
    fn test_document_id_missing() {
        let doc = Document::new();
        assert!(document_id(&doc).is_err());
    }
}
