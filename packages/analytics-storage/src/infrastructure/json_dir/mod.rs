//! Directory-backed document store
//!
//! Layout: `<root>/<collection>.json`, each file a JSON array of documents.
//! Writes go to a temporary file first and are renamed into place, so a
//! crashed write never leaves a half-written collection behind. The root
//! directory is created by the first write; until then the store reads as
//! empty.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::memory::{check_insert, unset_fields, upsert_into};
use crate::domain::{document_id, Document, DocumentStore};
use crate::{Result, StorageError};

const EXTENSION: &str = "json";

pub struct JsonDirStore {
    root: PathBuf,
    // Serializes read-modify-write cycles on the directory.
    lock: Mutex<()>,
}

impl JsonDirStore {
    /// Open a store rooted at `root`. Nothing is created on disk.
    ///
    /// # Errors
    ///
    /// Fails if `root` exists but is not a directory.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        match tokio::fs::metadata(&root).await {
            Ok(meta) if !meta.is_dir() => {
                return Err(StorageError::database(format!(
                    "store root {} is not a directory",
                    root.display()
                )));
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, collection: &str) -> Result<PathBuf> {
        if collection.is_empty()
            || collection.contains(['/', '\\'])
            || collection.starts_with('.')
        {
            return Err(StorageError::database(format!(
                "invalid collection name: {:?}",
                collection
            )));
        }
        Ok(self.root.join(format!("{}.{}", collection, EXTENSION)))
    }

    async fn read(&self, collection: &str) -> Result<Option<Vec<Document>>> {
        let path = self.path_of(collection)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let docs: Vec<Document> = serde_json::from_slice(&bytes)?;
                Ok(Some(docs))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, collection: &str, docs: &[Document]) -> Result<()> {
        let path = self.path_of(collection)?;
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            StorageError::database(format!("cannot create store dir {}", self.root.display()))
                .with_source(e)
        })?;
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(docs)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("wrote {} documents to {}", docs.len(), path.display());
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonDirStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_of(name)?).await?)
    }

    async fn find(&self, collection: &str) -> Result<Vec<Document>> {
        Ok(self.read(collection).await?.unwrap_or_default())
    }

    async fn find_one(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self.find(collection).await?.into_iter().find(|d| {
            document_id(d).map(|d| d == id).unwrap_or(false)
        }))
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut existing = self.read(collection).await?.unwrap_or_default();
        check_insert(&existing, &docs, collection)?;
        existing.extend(docs);
        self.write(collection, &existing).await
    }

    async fn replace_collection(&self, collection: &str, docs: Vec<Document>) -> Result<()> {
        check_insert(&[], &docs, collection)?;
        let _guard = self.lock.lock().await;
        self.write(collection, &docs).await
    }

    async fn upsert(&self, collection: &str, doc: Document) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut existing = self.read(collection).await?.unwrap_or_default();
        upsert_into(&mut existing, doc)?;
        self.write(collection, &existing).await
    }

    async fn update_many_unset(&self, collection: &str, fields: &[&str]) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let Some(mut docs) = self.read(collection).await? else {
            return Ok(0);
        };
        let modified = unset_fields(&mut docs, fields);
        if modified > 0 {
            self.write(collection, &docs).await?;
        }
        Ok(modified)
    }

    async fn rename_collection(&self, from: &str, to: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let source = self.path_of(from)?;
        let target = self.path_of(to)?;
        if tokio::fs::try_exists(&target).await? {
            return Err(StorageError::collection_exists(to));
        }
        if !tokio::fs::try_exists(&source).await? {
            return Err(StorageError::collection_not_found(from));
        }
        tokio::fs::rename(&source, &target).await?;
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(self.path_of(name)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
