//! Error types for analytics-storage

use std::fmt;
use thiserror::Error;

/// Storage error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Backend errors (driver, file layout)
    Database,
    /// Serialization/deserialization errors
    Serialization,
    /// Collection not found
    CollectionNotFound,
    /// Collection already exists (rename/copy target)
    CollectionExists,
    /// Document is not a JSON object or has no `_id`
    InvalidDocument,
    /// I/O errors
    IO,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Database => "database",
            ErrorKind::Serialization => "serialization",
            ErrorKind::CollectionNotFound => "collection_not_found",
            ErrorKind::CollectionExists => "collection_exists",
            ErrorKind::InvalidDocument => "invalid_document",
            ErrorKind::IO => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage error type
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct StorageError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: ErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialization, message)
    }

    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::CollectionNotFound,
            format!("Collection not found: {}", name.into()),
        )
    }

    pub fn collection_exists(name: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::CollectionExists,
            format!("Collection already exists: {}", name.into()),
        )
    }

    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidDocument, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::CollectionNotFound
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::new(ErrorKind::IO, format!("IO error: {}", err)).with_source(err)
    }
}

// JSON error conversions
impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::serialization(format!("JSON error: {}", err)).with_source(err)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let err = StorageError::collection_not_found("sessions");
        let msg = format!("{}", err);
        assert!(msg.contains("collection_not_found"));
        assert!(msg.contains("sessions"));
    }

    #[test]
    fn test_database_error() {
        let err = StorageError::database("Connection failed");
        assert_eq!(err.kind, ErrorKind::Database);
        assert_eq!(err.message, "Connection failed");
        assert!(err.source.is_none());

        let msg = format!("{}", err);
        assert_eq!(msg, "[database] Connection failed");
    }

    #[test]
    fn test_collection_exists_is_not_a_miss() {
        let err = StorageError::collection_exists("activities");
        assert_eq!(err.kind, ErrorKind::CollectionExists);
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_with_source() {
        use std::io;

        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err = StorageError::database("collection file missing").with_source(io_err);

        assert_eq!(err.kind, ErrorKind::Database);
        assert!(err.source.is_some());

        let source = err.source().unwrap();
        assert!(source.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_kind_as_str() {
        assert_eq!(ErrorKind::Database.as_str(), "database");
        assert_eq!(ErrorKind::Serialization.as_str(), "serialization");
        assert_eq!(
            ErrorKind::CollectionNotFound.as_str(),
            "collection_not_found"
        );
        assert_eq!(ErrorKind::CollectionExists.as_str(), "collection_exists");
        assert_eq!(ErrorKind::InvalidDocument.as_str(), "invalid_document");
        assert_eq!(ErrorKind::IO.as_str(), "io");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json")
            .err()
            .unwrap();
        let err: StorageError = json_err.into();

        assert_eq!(err.kind, ErrorKind::Serialization);
        assert!(err.message.contains("JSON error"));
        assert!(err.source.is_some());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StorageError = io_err.into();
        assert_eq!(err.kind, ErrorKind::IO);
        assert!(err.message.contains("denied"));
    }

    #[test]
    fn test_result_propagation() {
        fn inner() -> Result<()> {
            Err(StorageError::collection_not_found("classes"))
        }

        fn outer() -> Result<()> {
            inner()?;
            Ok(())
        }

        let err = outer().unwrap_err();
        assert_eq!(err.kind, ErrorKind::CollectionNotFound);
    }
}
