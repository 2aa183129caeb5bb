use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::context::UpgradeContext;
use crate::controller::RefreshStatus;
use crate::error::{Result, UpgradeError};
use crate::ledger::{select_eligible, RequirementLedger, RoundResults};
use crate::registry::ControllerRegistry;
use crate::state::{UpgradeState, UpgradeStateMachine};
use crate::version::{Version, VersionStep};

/// Controllers transformed in one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundSummary {
    pub round: u32,
    pub transformed: Vec<(String, VersionStep)>,
}

/// Outcome of a converged run
#[derive(Debug, Clone, Serialize)]
pub struct UpgradeReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Every round that ran transforms, in order
    pub rounds: Vec<RoundSummary>,
    /// Refresh results of the final round (all up to date)
    pub final_results: RoundResults,
}

impl UpgradeReport {
    /// Number of applied steps across all rounds
    pub fn steps_applied(&self) -> usize {
        self.rounds.iter().map(|r| r.transformed.len()).sum()
    }
}

/// Every refresh of one round, successful or not
#[derive(Debug)]
pub struct RefreshOutcome {
    pub results: RoundResults,
    /// Failed refreshes in name order
    pub failures: Vec<(String, UpgradeError)>,
}

impl RefreshOutcome {
    /// The results, or the first failure attributed to its controller
    pub fn into_result(self) -> Result<RoundResults> {
        match self.failures.into_iter().next() {
            Some((controller, e)) => Err(refresh_error(controller, e)),
            None => Ok(self.results),
        }
    }
}

fn refresh_error(controller: String, e: UpgradeError) -> UpgradeError {
    UpgradeError::Refresh {
        controller,
        source: Box::new(e),
    }
}

/// Drives the registered controllers round by round until they all report
/// up to date.
pub struct Upgrader<'r> {
    registry: &'r ControllerRegistry,
    max_rounds: Option<u32>,
}

impl<'r> Upgrader<'r> {
    pub fn new(registry: &'r ControllerRegistry) -> Self {
        Self {
            registry,
            max_rounds: None,
        }
    }

    /// Cap the number of transform rounds. Overrides `max_rounds` from the
    /// context configuration.
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }

    /// Connect every controller, one at a time, in name order
    pub async fn connect(&self, ctx: &mut UpgradeContext) -> Result<()> {
        for (name, controller) in self.registry.iter() {
            debug!("Connecting controller '{}'", name);
            controller
                .connect(ctx)
                .await
                .map_err(|e| UpgradeError::Connect {
                    controller: name.to_string(),
                    source: Box::new(e),
                })?;
        }
        Ok(())
    }

    /// Refresh all controllers together. Any failure fails the whole round.
    pub async fn refresh(&self, ctx: &UpgradeContext) -> Result<RoundResults> {
        self.refresh_all(ctx).await.into_result()
    }

    /// Refresh all controllers together, keeping the results of those that
    /// succeeded next to the failures.
    pub async fn refresh_all(&self, ctx: &UpgradeContext) -> RefreshOutcome {
        let pending = self.registry.iter().map(|(name, controller)| async move {
            (name, controller.refresh(ctx).await)
        });
        let outcomes = join_all(pending).await;

        let mut results = RoundResults::new();
        let mut failures = Vec::new();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    debug!(
                        "'{}' refreshed: {} ({})",
                        name, result.status, result.version
                    );
                    results.insert(name.to_string(), result);
                }
                Err(e) => {
                    error!("Refresh of '{}' failed: {}", name, e);
                    failures.push((name.to_string(), e));
                }
            }
        }
        RefreshOutcome { results, failures }
    }

    /// Connect and refresh once without transforming anything
    pub async fn status(&self, ctx: &mut UpgradeContext) -> Result<RoundResults> {
        self.connect(ctx).await?;
        self.refresh(ctx).await
    }

    /// Run rounds until every controller is up to date.
    ///
    /// A status 2 from any refresh, or any hook error, ends the run with an
    /// error before another transform is attempted.
    pub async fn run(&self, ctx: &mut UpgradeContext) -> Result<UpgradeReport> {
        let max_rounds = self.max_rounds.or(ctx.config.max_rounds);
        let mut sm = UpgradeStateMachine::new();
        sm.start()?;

        info!(
            "Starting connect phase... ({} controllers: {:?})",
            self.registry.len(),
            self.registry.names()
        );
        if let Err(e) = self.connect(ctx).await {
            return Err(abort(&mut sm, e, None));
        }
        info!("Finished connect phase");
        sm.connected()?;

        let mut rounds = Vec::new();
        loop {
            let round = sm.state().round();
            info!("Starting refresh phase (round {})", round);
            let RefreshOutcome { results, failures } = self.refresh_all(ctx).await;
            if let Some((name, e)) = failures.into_iter().next() {
                return Err(abort(&mut sm, refresh_error(name, e), Some(&results)));
            }
            info!("Finished refresh phase (round {})", round);

            if let Some((name, result)) = results
                .iter()
                .find(|(_, r)| r.status == RefreshStatus::Fatal)
            {
                let e = UpgradeError::FatalStatus {
                    controller: name.clone(),
                    detail: result.detail.clone().unwrap_or_else(|| {
                        format!("refresh returned status {}", result.status.code())
                    }),
                };
                return Err(abort(&mut sm, e, Some(&results)));
            }

            if results.values().all(|r| r.is_up_to_date()) {
                sm.finish()?;
                return match sm.into_state() {
                    UpgradeState::Done {
                        started_at,
                        finished_at,
                        rounds: total,
                    } => {
                        let report = UpgradeReport {
                            started_at,
                            finished_at,
                            rounds,
                            final_results: results,
                        };
                        info!(
                            "Finished upgrading ({} rounds, {} steps applied)",
                            total,
                            report.steps_applied()
                        );
                        Ok(report)
                    }
                    other => Err(UpgradeError::InvalidStateTransition {
                        from: other.state_name().to_string(),
                        to: "done".to_string(),
                    }),
                };
            }

            if let Some(limit) = max_rounds {
                if round > limit {
                    return Err(abort(
                        &mut sm,
                        UpgradeError::RoundLimitExceeded(limit),
                        Some(&results),
                    ));
                }
            }

            let ledger = RequirementLedger::from_results(&results);
            let eligible = select_eligible(&results, &ledger);
            if eligible.is_empty() {
                // Every pending controller is pinned by someone else.
                warn!(
                    "Round {}: no controller is eligible to transform, requirements may be circular",
                    round
                );
            }

            sm.begin_transform(eligible.clone())?;
            let mut transformed = Vec::with_capacity(eligible.len());
            for name in &eligible {
                let controller = match self.registry.get(name) {
                    Some(controller) => controller,
                    None => {
                        let e = UpgradeError::UnknownController(name.clone());
                        return Err(abort(&mut sm, e, Some(&results)));
                    }
                };

                match controller.transform(ctx).await {
                    Ok(step) => {
                        info!("Transformed '{}': {}", name, step);
                        transformed.push((name.clone(), step));
                    }
                    Err(e) => {
                        let e = if e.controller().is_some() {
                            e
                        } else {
                            UpgradeError::Transform {
                                controller: name.clone(),
                                source: Box::new(e),
                            }
                        };
                        return Err(abort(&mut sm, e, Some(&results)));
                    }
                }
            }
            info!("Finished transforms phase (round {}): {:?}", round, transformed);

            rounds.push(RoundSummary { round, transformed });
            sm.transformed()?;
        }
    }

    /// Undo the step of `controller` that starts at `from`.
    ///
    /// Every controller is connected first so restore hooks can reach the
    /// stores of the others.
    pub async fn restore(
        &self,
        ctx: &mut UpgradeContext,
        controller: &str,
        from: Version,
    ) -> Result<VersionStep> {
        let target = self
            .registry
            .get(controller)
            .ok_or_else(|| UpgradeError::UnknownController(controller.to_string()))?;

        self.connect(ctx).await?;
        info!("Restoring '{}' from v{}", controller, from);
        let step = target
            .restore(ctx, from)
            .await
            .map_err(|e| UpgradeError::Restore {
                controller: controller.to_string(),
                source: Box::new(e),
            })?;
        info!("Restored '{}': {}", controller, step);
        Ok(step)
    }
}

/// Log a fatal error with the results that led to it and mark the run failed
fn abort(
    sm: &mut UpgradeStateMachine,
    e: UpgradeError,
    results: Option<&RoundResults>,
) -> UpgradeError {
    error!("Unexpected error, {}", e);
    if let Some(results) = results {
        match serde_json::to_string(results) {
            Ok(json) => error!("Result, {}", json),
            Err(_) => error!("Result, {:?}", results),
        }
    }
    if let Err(transition) = sm.fail(e.to_string()) {
        warn!("Could not record failure: {}", transition);
    }
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{Controller, RefreshResult};
    use crate::version::Requirements;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Steps from its version to `target`, one version per transform
    struct Counter {
        at: AtomicU32,
        target: u32,
    }

    impl Counter {
        fn new(at: u32, target: u32) -> Self {
            Self {
                at: AtomicU32::new(at),
                target,
            }
        }
    }

    #[async_trait]
    impl Controller for Counter {
        async fn refresh(&self, _ctx: &UpgradeContext) -> Result<RefreshResult> {
            let at = self.at.load(Ordering::SeqCst);
            if at == self.target {
                Ok(RefreshResult::up_to_date(Version(at)))
            } else {
                Ok(RefreshResult::needs_transform(
                    VersionStep::new(at, at + 1),
                    Requirements::new(),
                ))
            }
        }

        async fn transform(&self, _ctx: &UpgradeContext) -> Result<VersionStep> {
            let at = self.at.fetch_add(1, Ordering::SeqCst);
            Ok(VersionStep::new(at, at + 1))
        }
    }

    #[tokio::test]
    async fn test_single_controller_converges() {
        let mut registry = ControllerRegistry::new();
        registry.register("mongo", Counter::new(1, 4));

        let mut ctx = UpgradeContext::default();
        let report = Upgrader::new(&registry).run(&mut ctx).await.unwrap();

        assert_eq!(report.rounds.len(), 3);
        assert_eq!(report.steps_applied(), 3);
        assert_eq!(
            report.rounds[2].transformed,
            vec![("mongo".to_string(), VersionStep::new(3, 4))]
        );
        assert!(report.final_results["mongo"].is_up_to_date());
    }

    #[tokio::test]
    async fn test_empty_registry_is_done_immediately() {
        let registry = ControllerRegistry::new();
        let mut ctx = UpgradeContext::default();
        let report = Upgrader::new(&registry).run(&mut ctx).await.unwrap();
        assert!(report.rounds.is_empty());
        assert!(report.final_results.is_empty());
    }

    #[tokio::test]
    async fn test_round_limit_from_config() {
        let mut registry = ControllerRegistry::new();
        registry.register("mongo", Counter::new(1, 10));

        let config = crate::config::UpgradeConfig::default().with_max_rounds(Some(2));
        let mut ctx = UpgradeContext::new(config);
        let err = Upgrader::new(&registry).run(&mut ctx).await.unwrap_err();
        assert!(matches!(err, UpgradeError::RoundLimitExceeded(2)));
    }

    #[tokio::test]
    async fn test_limit_counts_transform_rounds_only() {
        let mut registry = ControllerRegistry::new();
        registry.register("mongo", Counter::new(1, 3));

        let mut ctx = UpgradeContext::default();
        let report = Upgrader::new(&registry)
            .with_max_rounds(2)
            .run(&mut ctx)
            .await
            .unwrap();
        assert_eq!(report.rounds.len(), 2);
    }

    struct Broken;

    #[async_trait]
    impl Controller for Broken {
        async fn refresh(&self, _ctx: &UpgradeContext) -> Result<RefreshResult> {
            Err(UpgradeError::invariant("index unreadable"))
        }

        async fn transform(&self, _ctx: &UpgradeContext) -> Result<VersionStep> {
            Err(UpgradeError::invariant("not reached"))
        }
    }

    #[tokio::test]
    async fn test_refresh_keeps_partial_results() {
        let mut registry = ControllerRegistry::new();
        registry.register("elastic", Broken);
        registry.register("mongo", Counter::new(2, 3));
        let ctx = UpgradeContext::default();
        let upgrader = Upgrader::new(&registry);

        let outcome = upgrader.refresh_all(&ctx).await;
        assert_eq!(outcome.results.keys().collect::<Vec<_>>(), vec!["mongo"]);
        assert_eq!(outcome.results["mongo"].version, VersionStep::new(2, 3));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, "elastic");

        let err = upgrader.refresh(&ctx).await.unwrap_err();
        assert!(matches!(err, UpgradeError::Refresh { ref controller, .. } if controller == "elastic"));
    }

    #[tokio::test]
    async fn test_restore_unknown_controller() {
        let registry = ControllerRegistry::new();
        let mut ctx = UpgradeContext::default();
        let err = Upgrader::new(&registry)
            .restore(&mut ctx, "kibana", Version(2))
            .await
            .unwrap_err();
        assert!(matches!(err, UpgradeError::UnknownController(name) if name == "kibana"));
    }

    #[tokio::test]
    async fn test_restore_unsupported_is_wrapped() {
        let mut registry = ControllerRegistry::new();
        registry.register("mongo", Counter::new(1, 2));
        let mut ctx = UpgradeContext::default();

        let err = Upgrader::new(&registry)
            .restore(&mut ctx, "mongo", Version(1))
            .await
            .unwrap_err();
        match err {
            UpgradeError::Restore { controller, source } => {
                assert_eq!(controller, "mongo");
                assert!(matches!(*source, UpgradeError::RestoreUnsupported));
            }
            other => panic!("Expected Restore error, got {:?}", other),
        }
    }
}
