//! Controller over one document store, driven by a chain of transformers.
//!
//! The store's version lives in the `versions` collection as
//! `{ "_id": <controller name>, "version": <n> }`. Each transformer moves the
//! data one step, `origin -> destination`; the latest destination is the
//! version the controller converges to.

use analytics_storage::{document, DocumentStore, JsonDirStore};
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::UpgradeContext;
use crate::controller::{Controller, RefreshResult};
use crate::error::{Result, UpgradeError};
use crate::version::{Requirements, Version, VersionStep};

/// Collection holding one version record per controller
pub const VERSIONS_COLLECTION: &str = "versions";

/// One migration step of a store.
///
/// Hooks receive the controller's own store plus the context, for steps that
/// read other controllers' stores.
#[async_trait]
pub trait Transformer: Send + Sync {
    fn step(&self) -> VersionStep;

    /// Versions other controllers must still be at for this step to run
    fn requires(&self) -> Requirements {
        Requirements::new()
    }

    /// Save what `restore` needs. Must be safe to run twice.
    async fn backup(&self, store: &dyn DocumentStore, ctx: &UpgradeContext) -> Result<()>;

    async fn upgrade(&self, store: &dyn DocumentStore, ctx: &UpgradeContext) -> Result<()>;

    /// Validate the upgraded data
    async fn check(&self, store: &dyn DocumentStore, ctx: &UpgradeContext) -> Result<()>;

    async fn clean(&self, _store: &dyn DocumentStore, _ctx: &UpgradeContext) -> Result<()> {
        Ok(())
    }

    /// Put the data back the way `backup` found it
    async fn restore(&self, store: &dyn DocumentStore, ctx: &UpgradeContext) -> Result<()>;
}

pub struct StoreController {
    name: String,
    initial_version: Version,
    /// Keyed by origin version
    transformers: BTreeMap<Version, Arc<dyn Transformer>>,
}

impl StoreController {
    /// `initial_version` is assumed for a store without a version record,
    /// unless the configuration says otherwise.
    pub fn new(name: impl Into<String>, initial_version: u32) -> Self {
        Self {
            name: name.into(),
            initial_version: Version(initial_version),
            transformers: BTreeMap::new(),
        }
    }

    pub fn with_transformer(mut self, transformer: impl Transformer + 'static) -> Self {
        let origin = transformer.step().origin;
        if self
            .transformers
            .insert(origin, Arc::new(transformer))
            .is_some()
        {
            warn!(
                "Controller '{}' has two steps from v{}, keeping the last one",
                self.name, origin
            );
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version the controller converges to
    pub fn latest_version(&self) -> Version {
        self.transformers
            .values()
            .map(|t| t.step().destination)
            .max()
            .unwrap_or(self.initial_version)
    }

    fn step_from(&self, version: Version) -> Option<&Arc<dyn Transformer>> {
        self.transformers.get(&version)
    }

    fn initial_version(&self, ctx: &UpgradeContext) -> Version {
        ctx.config
            .store(&self.name)
            .and_then(|settings| settings.initial_version)
            .unwrap_or(self.initial_version)
    }

    /// Stored version, `None` when the store has no record yet
    pub async fn stored_version(&self, store: &dyn DocumentStore) -> Result<Option<Version>> {
        let record = match store.find_one(VERSIONS_COLLECTION, &self.name).await? {
            Some(record) => record,
            None => return Ok(None),
        };
        let raw = record.get("version").cloned().ok_or_else(|| {
            UpgradeError::invariant(format!("version record of '{}' has no version", self.name))
        })?;
        let version = serde_json::from_value(raw).map_err(UpgradeError::parse)?;
        Ok(Some(version))
    }

    async fn write_version(&self, store: &dyn DocumentStore, version: Version) -> Result<()> {
        let record = document(self.name.clone(), json!({ "version": version }))?;
        store.upsert(VERSIONS_COLLECTION, record).await?;
        debug!("'{}' recorded at v{}", self.name, version);
        Ok(())
    }

    async fn current_version(
        &self,
        store: &dyn DocumentStore,
        ctx: &UpgradeContext,
    ) -> Result<Version> {
        Ok(self
            .stored_version(store)
            .await?
            .unwrap_or_else(|| self.initial_version(ctx)))
    }

    fn hook_error(&self, hook: &'static str, step: VersionStep, e: UpgradeError) -> UpgradeError {
        UpgradeError::Hook {
            controller: self.name.clone(),
            hook,
            step,
            source: Box::new(e),
        }
    }
}

#[async_trait]
impl Controller for StoreController {
    /// Open the configured store unless one is already attached. Writes
    /// nothing: a store without a version record reads as the initial
    /// version until its first transform.
    async fn connect(&self, ctx: &mut UpgradeContext) -> Result<()> {
        if !ctx.has_store(&self.name) {
            let settings = ctx
                .config
                .store(&self.name)
                .ok_or_else(|| UpgradeError::StoreNotConnected(self.name.clone()))?;
            let store = JsonDirStore::open(settings.path.clone()).await?;
            info!("'{}' opened store at {}", self.name, settings.path.display());
            ctx.attach_store(self.name.clone(), Arc::new(store));
        }

        let store = ctx.store(&self.name)?;
        if self.stored_version(store.as_ref()).await?.is_none() {
            info!(
                "'{}' has no version record, assuming v{}",
                self.name,
                self.initial_version(ctx)
            );
        }
        Ok(())
    }

    async fn refresh(&self, ctx: &UpgradeContext) -> Result<RefreshResult> {
        let store = ctx.store(&self.name)?;
        let current = self.current_version(store.as_ref(), ctx).await?;
        let latest = self.latest_version();

        if current == latest {
            return Ok(RefreshResult::up_to_date(current));
        }
        match self.step_from(current) {
            Some(transformer) => Ok(RefreshResult::needs_transform(
                transformer.step(),
                transformer.requires(),
            )),
            None => Ok(RefreshResult::fatal(
                current,
                format!(
                    "no migration step from v{} (latest known version is v{})",
                    current, latest
                ),
            )),
        }
    }

    async fn transform(&self, ctx: &UpgradeContext) -> Result<VersionStep> {
        let store = ctx.store(&self.name)?;
        let store = store.as_ref();
        let current = self.current_version(store, ctx).await?;
        let transformer = self
            .step_from(current)
            .ok_or_else(|| UpgradeError::NoSuchStep {
                controller: self.name.clone(),
                version: current,
            })?;
        let step = transformer.step();

        info!("'{}' {}: backup", self.name, step);
        transformer
            .backup(store, ctx)
            .await
            .map_err(|e| self.hook_error("backup", step, e))?;

        info!("'{}' {}: upgrade", self.name, step);
        transformer
            .upgrade(store, ctx)
            .await
            .map_err(|e| UpgradeError::Upgrade {
                controller: self.name.clone(),
                step,
                source: Box::new(e),
            })?;

        info!("'{}' {}: check", self.name, step);
        transformer
            .check(store, ctx)
            .await
            .map_err(|e| UpgradeError::Check {
                controller: self.name.clone(),
                step,
                source: Box::new(e),
            })?;

        transformer
            .clean(store, ctx)
            .await
            .map_err(|e| self.hook_error("clean", step, e))?;

        self.write_version(store, step.destination).await?;
        Ok(step)
    }

    /// Restore the step that starts at `from` and record `from` as current.
    ///
    /// Accepted while the store is at either end of the step, so data left
    /// behind by a failed check can be put back too.
    async fn restore(&self, ctx: &UpgradeContext, from: Version) -> Result<VersionStep> {
        let store = ctx.store(&self.name)?;
        let store = store.as_ref();
        let transformer = self.step_from(from).ok_or_else(|| UpgradeError::NoSuchStep {
            controller: self.name.clone(),
            version: from,
        })?;
        let step = transformer.step();

        let current = self.current_version(store, ctx).await?;
        if current != step.origin && current != step.destination {
            warn!(
                "'{}' is at v{}, restoring {} anyway",
                self.name, current, step
            );
        }

        transformer
            .restore(store, ctx)
            .await
            .map_err(|e| self.hook_error("restore", step, e))?;
        self.write_version(store, step.origin).await?;
        Ok(step.reversed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpgradeConfig;
    use crate::controller::RefreshStatus;
    use crate::version::requirements;
    use analytics_storage::MemoryStore;
    use pretty_assertions::assert_eq;

    /// Writes a marker document; optionally fails its check
    struct Marker {
        step: VersionStep,
        fail_check: bool,
    }

    impl Marker {
        fn new(origin: u32, destination: u32) -> Self {
            Self {
                step: VersionStep::new(origin, destination),
                fail_check: false,
            }
        }
    }

    #[async_trait]
    impl Transformer for Marker {
        fn step(&self) -> VersionStep {
            self.step
        }

        fn requires(&self) -> Requirements {
            requirements([("other", 1)])
        }

        async fn backup(&self, _store: &dyn DocumentStore, _ctx: &UpgradeContext) -> Result<()> {
            Ok(())
        }

        async fn upgrade(&self, store: &dyn DocumentStore, _ctx: &UpgradeContext) -> Result<()> {
            let id = format!("v{}", self.step.destination);
            store.upsert("markers", document(id, json!({}))?).await?;
            Ok(())
        }

        async fn check(&self, _store: &dyn DocumentStore, _ctx: &UpgradeContext) -> Result<()> {
            if self.fail_check {
                return Err(UpgradeError::invariant("marker check failed"));
            }
            Ok(())
        }

        async fn restore(&self, store: &dyn DocumentStore, _ctx: &UpgradeContext) -> Result<()> {
            store.drop_collection("markers").await?;
            Ok(())
        }
    }

    fn context_with(store: &MemoryStore) -> UpgradeContext {
        let mut ctx = UpgradeContext::new(UpgradeConfig::default());
        ctx.attach_store("data", Arc::new(store.clone()));
        ctx
    }

    #[tokio::test]
    async fn test_connect_writes_nothing() {
        let store = MemoryStore::new();
        let mut ctx = context_with(&store);
        let controller = StoreController::new("data", 1).with_transformer(Marker::new(1, 2));

        controller.connect(&mut ctx).await.unwrap();
        assert_eq!(controller.stored_version(&store).await.unwrap(), None);
        assert!(store.list_collections().await.unwrap().is_empty());

        let result = controller.refresh(&ctx).await.unwrap();
        assert_eq!(result.status, RefreshStatus::NeedsTransform);
        assert_eq!(result.version, VersionStep::new(1, 2));
        assert_eq!(result.requirements, requirements([("other", 1)]));
    }

    #[tokio::test]
    async fn test_connect_without_store_or_settings() {
        let mut ctx = UpgradeContext::default();
        let controller = StoreController::new("data", 1);
        let err = controller.connect(&mut ctx).await.unwrap_err();
        assert!(matches!(err, UpgradeError::StoreNotConnected(name) if name == "data"));
    }

    #[tokio::test]
    async fn test_transform_chain_reaches_latest() {
        let store = MemoryStore::new();
        let mut ctx = context_with(&store);
        let controller = StoreController::new("data", 1)
            .with_transformer(Marker::new(2, 3))
            .with_transformer(Marker::new(1, 2));
        controller.connect(&mut ctx).await.unwrap();

        assert_eq!(controller.transform(&ctx).await.unwrap(), VersionStep::new(1, 2));
        assert_eq!(controller.transform(&ctx).await.unwrap(), VersionStep::new(2, 3));
        assert!(controller.refresh(&ctx).await.unwrap().is_up_to_date());
        assert_eq!(store.find("markers").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_version_is_fatal_status() {
        let store = MemoryStore::new();
        let ctx = context_with(&store);
        store
            .upsert(
                VERSIONS_COLLECTION,
                document("data", json!({ "version": "7" })).unwrap(),
            )
            .await
            .unwrap();
        let controller = StoreController::new("data", 1).with_transformer(Marker::new(1, 2));

        let result = controller.refresh(&ctx).await.unwrap();
        assert_eq!(result.status, RefreshStatus::Fatal);
        assert_eq!(result.origin(), Version(7));
        assert!(result.detail.unwrap().contains("v7"));
    }

    #[tokio::test]
    async fn test_failed_check_keeps_version() {
        let store = MemoryStore::new();
        let mut ctx = context_with(&store);
        let mut marker = Marker::new(1, 2);
        marker.fail_check = true;
        let controller = StoreController::new("data", 1).with_transformer(marker);
        controller.connect(&mut ctx).await.unwrap();

        let err = controller.transform(&ctx).await.unwrap_err();
        assert!(err.is_check_failure());
        assert_eq!(err.controller(), Some("data"));
        assert_eq!(controller.stored_version(&store).await.unwrap(), None);
        assert_eq!(controller.refresh(&ctx).await.unwrap().origin(), Version(1));
    }

    #[tokio::test]
    async fn test_restore_rewinds_version() {
        let store = MemoryStore::new();
        let mut ctx = context_with(&store);
        let controller = StoreController::new("data", 1).with_transformer(Marker::new(1, 2));
        controller.connect(&mut ctx).await.unwrap();
        controller.transform(&ctx).await.unwrap();

        let step = controller.restore(&ctx, Version(1)).await.unwrap();
        assert_eq!(step, VersionStep::new(2, 1));
        assert_eq!(controller.stored_version(&store).await.unwrap(), Some(Version(1)));
        assert!(!store.collection_exists("markers").await.unwrap());

        let err = controller.restore(&ctx, Version(5)).await.unwrap_err();
        assert!(matches!(err, UpgradeError::NoSuchStep { .. }));
    }

    #[tokio::test]
    async fn test_configured_initial_version_wins() {
        let store = MemoryStore::new();
        let yaml = "version: 1\nstores:\n  data:\n    path: /unused\n    initial_version: 2\n";
        let mut ctx = UpgradeContext::new(UpgradeConfig::from_yaml_str(yaml).unwrap());
        ctx.attach_store("data", Arc::new(store.clone()));
        let controller = StoreController::new("data", 1).with_transformer(Marker::new(1, 2));

        controller.connect(&mut ctx).await.unwrap();
        assert!(controller.refresh(&ctx).await.unwrap().is_up_to_date());
    }
}
