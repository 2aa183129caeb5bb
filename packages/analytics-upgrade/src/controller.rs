use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

use crate::context::UpgradeContext;
use crate::error::{Result, UpgradeError};
use crate::version::{Requirements, Version, VersionStep};

/// Outcome of a controller's refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    /// Data is at the latest version
    UpToDate,
    /// A migration step is pending
    NeedsTransform,
    /// The controller found its data in a state it cannot migrate
    Fatal,
}

impl RefreshStatus {
    /// Numeric status code (0, 1, 2) as printed by the CLI
    pub fn code(&self) -> u8 {
        match self {
            RefreshStatus::UpToDate => 0,
            RefreshStatus::NeedsTransform => 1,
            RefreshStatus::Fatal => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshStatus::UpToDate => "up_to_date",
            RefreshStatus::NeedsTransform => "needs_transform",
            RefreshStatus::Fatal => "fatal",
        }
    }
}

impl fmt::Display for RefreshStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-controller snapshot taken at the start of a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshResult {
    pub status: RefreshStatus,
    pub version: VersionStep,
    pub requirements: Requirements,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RefreshResult {
    pub fn up_to_date(at: Version) -> Self {
        Self {
            status: RefreshStatus::UpToDate,
            version: VersionStep::stay(at),
            requirements: Requirements::new(),
            detail: None,
        }
    }

    pub fn needs_transform(step: VersionStep, requirements: Requirements) -> Self {
        Self {
            status: RefreshStatus::NeedsTransform,
            version: step,
            requirements,
            detail: None,
        }
    }

    pub fn fatal(at: Version, detail: impl Into<String>) -> Self {
        Self {
            status: RefreshStatus::Fatal,
            version: VersionStep::stay(at),
            requirements: Requirements::new(),
            detail: Some(detail.into()),
        }
    }

    pub fn is_up_to_date(&self) -> bool {
        self.status == RefreshStatus::UpToDate
    }

    /// Version the controller's data is at right now
    pub fn origin(&self) -> Version {
        self.version.origin
    }
}

/// A named unit that migrates one category of persisted data.
///
/// Hooks are awaited one controller at a time, except `refresh`, which the
/// orchestrator runs for all controllers together. `refresh` must not write.
#[async_trait]
pub trait Controller: Send + Sync {
    /// Open connections and attach store handles to the context
    async fn connect(&self, _ctx: &mut UpgradeContext) -> Result<()> {
        Ok(())
    }

    /// Report the current version, the pending step and its requirements
    async fn refresh(&self, ctx: &UpgradeContext) -> Result<RefreshResult>;

    /// Apply the pending step. Returns the step that was applied.
    async fn transform(&self, ctx: &UpgradeContext) -> Result<VersionStep>;

    /// Undo the step starting at `from`. Never called by the round loop.
    async fn restore(&self, _ctx: &UpgradeContext, _from: Version) -> Result<VersionStep> {
        Err(UpgradeError::RestoreUnsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::requirements;

    #[test]
    fn test_status_codes() {
        assert_eq!(RefreshStatus::UpToDate.code(), 0);
        assert_eq!(RefreshStatus::NeedsTransform.code(), 1);
        assert_eq!(RefreshStatus::Fatal.code(), 2);
    }

    #[test]
    fn test_result_constructors() {
        let done = RefreshResult::up_to_date(Version(3));
        assert!(done.is_up_to_date());
        assert_eq!(done.version, VersionStep::new(3, 3));

        let pending = RefreshResult::needs_transform(
            VersionStep::new(2, 3),
            requirements([("mongo", 2)]),
        );
        assert_eq!(pending.origin(), Version(2));
        assert_eq!(pending.requirements["mongo"], Version(2));

        let fatal = RefreshResult::fatal(Version(9), "unknown version");
        assert_eq!(fatal.status, RefreshStatus::Fatal);
        assert_eq!(fatal.detail.as_deref(), Some("unknown version"));
    }

    #[test]
    fn test_result_serializes_for_logs() {
        let pending = RefreshResult::needs_transform(VersionStep::new(1, 2), Requirements::new());
        let json = serde_json::to_value(&pending).unwrap();
        assert_eq!(json["status"], "needs_transform");
        assert_eq!(json["version"]["origin"], 1);
        assert!(json.get("detail").is_none());
    }
}
