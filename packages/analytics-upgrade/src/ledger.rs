//! Requirement ledger and transform eligibility.
//!
//! Each round, every controller's declared requirements are gathered into a
//! ledger keyed by the required controller. A controller pending a transform
//! may run this round only if no other controller requires it to stay at the
//! version it is at now.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::controller::{RefreshResult, RefreshStatus};
use crate::version::Version;

/// Refresh results of one round, keyed by controller name
pub type RoundResults = BTreeMap<String, RefreshResult>;

/// Controller name -> version -> controllers requiring that version
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequirementLedger {
    pins: BTreeMap<String, BTreeMap<Version, BTreeSet<String>>>,
}

impl RequirementLedger {
    /// Gather the requirements of every controller, including up-to-date
    /// ones. A controller's requirement on itself is ignored.
    pub fn from_results(results: &RoundResults) -> Self {
        let mut ledger = Self::default();
        for (requirer, result) in results {
            for (required, version) in &result.requirements {
                if required == requirer {
                    debug!("Ignoring self-requirement of '{}' at v{}", requirer, version);
                    continue;
                }
                ledger.add(requirer, required, *version);
            }
        }
        ledger
    }

    /// Record that `requirer` needs `required` at `version`
    pub fn add(&mut self, requirer: &str, required: &str, version: Version) {
        self.pins
            .entry(required.to_string())
            .or_default()
            .entry(version)
            .or_default()
            .insert(requirer.to_string());
    }

    /// Does anyone require `controller` at exactly `version`?
    pub fn pins(&self, controller: &str, version: Version) -> bool {
        self.pins
            .get(controller)
            .map(|by_version| by_version.contains_key(&version))
            .unwrap_or(false)
    }

    /// Controllers requiring `controller` at `version`
    pub fn pinned_by(&self, controller: &str, version: Version) -> Vec<&str> {
        self.pins
            .get(controller)
            .and_then(|by_version| by_version.get(&version))
            .map(|requirers| requirers.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

/// Controllers to transform this round, in name order.
///
/// Up-to-date controllers are skipped; pending ones are skipped while pinned
/// at their current origin.
pub fn select_eligible(results: &RoundResults, ledger: &RequirementLedger) -> Vec<String> {
    results
        .iter()
        .filter(|(_, result)| result.status != RefreshStatus::UpToDate)
        .filter(|(name, result)| {
            let pinned = ledger.pins(name, result.origin());
            if pinned {
                debug!(
                    "'{}' held at v{} by {:?}",
                    name,
                    result.origin(),
                    ledger.pinned_by(name, result.origin())
                );
            }
            !pinned
        })
        .map(|(name, _)| name.clone())
        .collect()
}
