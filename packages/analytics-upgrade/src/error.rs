use analytics_storage::StorageError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::version::{Version, VersionStep};

pub type Result<T> = std::result::Result<T, UpgradeError>;

#[derive(Error, Debug)]
pub enum UpgradeError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Connect failed for controller '{controller}': {source}")]
    Connect {
        controller: String,
        #[source]
        source: Box<UpgradeError>,
    },

    #[error("Refresh failed for controller '{controller}': {source}")]
    Refresh {
        controller: String,
        #[source]
        source: Box<UpgradeError>,
    },

    #[error("Controller '{controller}' reported a fatal status: {detail}")]
    FatalStatus { controller: String, detail: String },

    #[error("Transform failed for controller '{controller}': {source}")]
    Transform {
        controller: String,
        #[source]
        source: Box<UpgradeError>,
    },

    #[error("Upgrade {step} failed for controller '{controller}': {source}")]
    Upgrade {
        controller: String,
        step: VersionStep,
        #[source]
        source: Box<UpgradeError>,
    },

    #[error("Check after {step} failed for controller '{controller}': {source}")]
    Check {
        controller: String,
        step: VersionStep,
        #[source]
        source: Box<UpgradeError>,
    },

    #[error("{hook} hook for {step} failed in controller '{controller}': {source}")]
    Hook {
        controller: String,
        hook: &'static str,
        step: VersionStep,
        #[source]
        source: Box<UpgradeError>,
    },

    #[error("Restore failed for controller '{controller}': {source}")]
    Restore {
        controller: String,
        #[source]
        source: Box<UpgradeError>,
    },

    #[error("Controller does not support restore")]
    RestoreUnsupported,

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("No migration step from version {version} in controller '{controller}'")]
    NoSuchStep { controller: String, version: Version },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Unknown controller: {0}")]
    UnknownController(String),

    #[error("Store not connected: {0}")]
    StoreNotConnected(String),

    #[error("No convergence after {0} rounds")]
    RoundLimitExceeded(u32),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl UpgradeError {
    pub fn parse<E: std::fmt::Display>(e: E) -> Self {
        Self::Parse(e.to_string())
    }

    pub fn invariant<E: std::fmt::Display>(e: E) -> Self {
        Self::Invariant(e.to_string())
    }

    /// Name of the controller the error is attributed to, if any
    pub fn controller(&self) -> Option<&str> {
        match self {
            Self::Connect { controller, .. }
            | Self::Refresh { controller, .. }
            | Self::FatalStatus { controller, .. }
            | Self::Transform { controller, .. }
            | Self::Upgrade { controller, .. }
            | Self::Check { controller, .. }
            | Self::Hook { controller, .. }
            | Self::Restore { controller, .. }
            | Self::NoSuchStep { controller, .. } => Some(controller),
            Self::UnknownController(name) => Some(name),
            _ => None,
        }
    }

    /// Upgrade and check failures are told apart so operators know whether
    /// the data was transformed at all.
    pub fn is_check_failure(&self) -> bool {
        matches!(self, Self::Check { .. })
    }
}
