use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AclError>;

#[derive(Error, Debug)]
pub enum AclError {
    #[error("Invalid resource pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Unknown permission '{0}' (expected an HTTP verb or '*')")]
    UnknownVerb(String),

    #[error("Grant #{0} names no roles")]
    EmptyGrant(usize),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl AclError {
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            AclError::invalid_pattern("games", "must start with '/'").to_string(),
            "Invalid resource pattern 'games': must start with '/'"
        );
        assert_eq!(
            AclError::UnknownVerb("fetch".to_string()).to_string(),
            "Unknown permission 'fetch' (expected an HTTP verb or '*')"
        );
    }
}
