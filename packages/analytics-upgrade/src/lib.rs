/*
 * Analytics Upgrade - schema migration orchestrator
 *
 * Brings the persisted data of the learning-analytics backend up to the
 * version the running code expects.
 *
 * Architecture:
 * - Controllers: one per data category, each knows its version and next step
 * - Registry: controllers by name, fixed before the first round
 * - Requirement ledger: which controller must wait for which
 * - Upgrader: connect, then refresh -> resolve -> transform rounds until
 *   every controller is up to date
 */

pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod registry;
pub mod state;
pub mod store_controller;
pub mod transformers;
pub mod version;

// Re-exports
pub use config::{ConfigError, StoreSettings, UpgradeConfig, CONFIG_ENV};
pub use context::UpgradeContext;
pub use controller::{Controller, RefreshResult, RefreshStatus};
pub use error::{Result, UpgradeError};
pub use ledger::{select_eligible, RequirementLedger, RoundResults};
pub use orchestrator::{RefreshOutcome, RoundSummary, UpgradeReport, Upgrader};
pub use registry::ControllerRegistry;
pub use state::{UpgradeState, UpgradeStateMachine};
pub use store_controller::{StoreController, Transformer, VERSIONS_COLLECTION};
pub use transformers::{builtin_registry, elastic_controller, mongo_controller, ELASTIC, MONGO};
pub use version::{requirements, Requirements, Version, VersionStep};
