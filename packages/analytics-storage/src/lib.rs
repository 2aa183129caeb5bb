//! Document storage for the analytics backend
//!
//! The backend keeps games, classes, sessions/activities in a document
//! database and traces in a search index. Both are reached through the
//! `DocumentStore` port so upgrade controllers can be written and tested
//! without the real drivers.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use analytics_storage::{DocumentStore, JsonDirStore};
//!
//! let store = JsonDirStore::open("./data/mongo").await?;
//! let removed = store.update_many_unset("classes", &["gameId", "versionId"]).await?;
//! store.rename_collection("sessions", "activities").await?;
//! ```

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};

pub use domain::{document, document_id, Document, DocumentStore, ID_FIELD};
pub use infrastructure::MemoryStore;

#[cfg(feature = "json-dir")]
pub use infrastructure::JsonDirStore;
