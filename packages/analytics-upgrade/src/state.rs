use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Result, UpgradeError};

/// Phase of an upgrade run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpgradeState {
    Idle,
    Connecting {
        started_at: DateTime<Utc>,
    },
    Refreshing {
        started_at: DateTime<Utc>,
        round: u32,
    },
    Transforming {
        started_at: DateTime<Utc>,
        round: u32,
        controllers: Vec<String>,
    },
    Done {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        rounds: u32,
    },
    Fatal {
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
        round: u32,
        error: String,
    },
}

impl UpgradeState {
    pub fn state_name(&self) -> &'static str {
        match self {
            UpgradeState::Idle => "idle",
            UpgradeState::Connecting { .. } => "connecting",
            UpgradeState::Refreshing { .. } => "refreshing",
            UpgradeState::Transforming { .. } => "transforming",
            UpgradeState::Done { .. } => "done",
            UpgradeState::Fatal { .. } => "fatal",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UpgradeState::Done { .. } | UpgradeState::Fatal { .. })
    }

    fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            UpgradeState::Idle => None,
            UpgradeState::Connecting { started_at }
            | UpgradeState::Refreshing { started_at, .. }
            | UpgradeState::Transforming { started_at, .. }
            | UpgradeState::Done { started_at, .. }
            | UpgradeState::Fatal { started_at, .. } => Some(*started_at),
        }
    }

    /// Round in progress; 0 before the first refresh
    pub fn round(&self) -> u32 {
        match self {
            UpgradeState::Refreshing { round, .. }
            | UpgradeState::Transforming { round, .. }
            | UpgradeState::Fatal { round, .. } => *round,
            UpgradeState::Done { rounds, .. } => *rounds,
            _ => 0,
        }
    }
}

/// Tracks one run through connect, the refresh/transform rounds and the end
#[derive(Debug)]
pub struct UpgradeStateMachine {
    state: UpgradeState,
}

impl Default for UpgradeStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl UpgradeStateMachine {
    pub fn new() -> Self {
        Self {
            state: UpgradeState::Idle,
        }
    }

    pub fn state(&self) -> &UpgradeState {
        &self.state
    }

    pub fn into_state(self) -> UpgradeState {
        self.state
    }

    fn invalid(&self, to: &str) -> UpgradeError {
        UpgradeError::InvalidStateTransition {
            from: self.state.state_name().to_string(),
            to: to.to_string(),
        }
    }

    /// Transition: IDLE → CONNECTING
    pub fn start(&mut self) -> Result<()> {
        match &self.state {
            UpgradeState::Idle => {
                self.state = UpgradeState::Connecting {
                    started_at: Utc::now(),
                };
                Ok(())
            }
            _ => Err(self.invalid("connecting")),
        }
    }

    /// Transition: CONNECTING → REFRESHING (round 1)
    pub fn connected(&mut self) -> Result<()> {
        match &self.state {
            UpgradeState::Connecting { started_at } => {
                self.state = UpgradeState::Refreshing {
                    started_at: *started_at,
                    round: 1,
                };
                Ok(())
            }
            _ => Err(self.invalid("refreshing")),
        }
    }

    /// Transition: REFRESHING → TRANSFORMING
    pub fn begin_transform(&mut self, controllers: Vec<String>) -> Result<()> {
        match &self.state {
            UpgradeState::Refreshing { started_at, round } => {
                self.state = UpgradeState::Transforming {
                    started_at: *started_at,
                    round: *round,
                    controllers,
                };
                Ok(())
            }
            _ => Err(self.invalid("transforming")),
        }
    }

    /// Transition: TRANSFORMING → REFRESHING (next round)
    pub fn transformed(&mut self) -> Result<()> {
        match &self.state {
            UpgradeState::Transforming {
                started_at, round, ..
            } => {
                self.state = UpgradeState::Refreshing {
                    started_at: *started_at,
                    round: round + 1,
                };
                Ok(())
            }
            _ => Err(self.invalid("refreshing")),
        }
    }

    /// Transition: REFRESHING → DONE
    pub fn finish(&mut self) -> Result<()> {
        match &self.state {
            UpgradeState::Refreshing { started_at, round } => {
                self.state = UpgradeState::Done {
                    started_at: *started_at,
                    finished_at: Utc::now(),
                    rounds: *round,
                };
                Ok(())
            }
            _ => Err(self.invalid("done")),
        }
    }

    /// Transition: * → FATAL (from any non-terminal, started state)
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        if self.state.is_terminal() {
            return Err(self.invalid("fatal"));
        }
        let started_at = self.state.started_at().ok_or_else(|| self.invalid("fatal"))?;
        self.state = UpgradeState::Fatal {
            started_at,
            failed_at: Utc::now(),
            round: self.state.round(),
            error: error.into(),
        };
        Ok(())
    }
}
