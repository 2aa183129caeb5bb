//! Search index, v2 -> v3: every trace gets the `activityId` of the session
//! that produced it.
//!
//! Trace indices are named after their session id. The session ids are read
//! from the document database, which therefore has to still be at v2 (where
//! sessions have not been renamed yet).

use analytics_storage::{document_id, DocumentStore};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use super::mongo::{ACTIVITIES, SESSIONS};
use super::{backup_name, has_value, MONGO};
use crate::context::UpgradeContext;
use crate::error::{Result, UpgradeError};
use crate::store_controller::Transformer;
use crate::version::{requirements, Requirements, VersionStep};

pub const ACTIVITY_ID: &str = "activityId";

#[derive(Debug, Clone)]
pub struct ElasticToVersion3 {
    /// Controller owning the sessions collection
    sessions_from: String,
}

impl Default for ElasticToVersion3 {
    fn default() -> Self {
        Self::reading_sessions_from(MONGO)
    }
}

impl ElasticToVersion3 {
    pub fn reading_sessions_from(controller: impl Into<String>) -> Self {
        Self {
            sessions_from: controller.into(),
        }
    }

    /// Trace index names, one per session known to the document database.
    /// Falls back to activities so restore works after that database moved on.
    async fn session_ids(&self, ctx: &UpgradeContext) -> Result<Vec<String>> {
        let db = ctx.store(&self.sessions_from)?;
        let collection = if db.collection_exists(SESSIONS).await? {
            SESSIONS
        } else {
            ACTIVITIES
        };
        let mut ids = Vec::new();
        for session in db.find(collection).await? {
            ids.push(document_id(&session)?.to_string());
        }
        Ok(ids)
    }

    /// Session ids that have a trace index
    async fn trace_indices(
        &self,
        store: &dyn DocumentStore,
        ctx: &UpgradeContext,
    ) -> Result<Vec<String>> {
        let mut indices = Vec::new();
        for id in self.session_ids(ctx).await? {
            if store.collection_exists(&id).await? {
                indices.push(id);
            } else {
                debug!("Session '{}' has no trace index", id);
            }
        }
        Ok(indices)
    }
}

#[async_trait]
impl Transformer for ElasticToVersion3 {
    fn step(&self) -> VersionStep {
        VersionStep::new(2, 3)
    }

    fn requires(&self) -> Requirements {
        requirements([(self.sessions_from.as_str(), 2)])
    }

    async fn backup(&self, store: &dyn DocumentStore, ctx: &UpgradeContext) -> Result<()> {
        let origin = self.step().origin;
        for index in self.trace_indices(store, ctx).await? {
            let backup = backup_name(&index, origin);
            if !store.collection_exists(&backup).await? {
                store.copy_collection(&index, &backup).await?;
                debug!("Backed up index '{}'", index);
            }
        }
        Ok(())
    }

    async fn upgrade(&self, store: &dyn DocumentStore, ctx: &UpgradeContext) -> Result<()> {
        let mut tagged = 0usize;
        for index in self.trace_indices(store, ctx).await? {
            let mut traces = store.find(&index).await?;
            for trace in traces.iter_mut() {
                trace.insert(ACTIVITY_ID.to_string(), Value::String(index.clone()));
            }
            tagged += traces.len();
            // One write per index
            store.replace_collection(&index, traces).await?;
        }
        info!("Tagged {} traces with their {}", tagged, ACTIVITY_ID);
        Ok(())
    }

    async fn check(&self, store: &dyn DocumentStore, ctx: &UpgradeContext) -> Result<()> {
        for index in self.trace_indices(store, ctx).await? {
            for trace in store.find(&index).await? {
                if !has_value(&trace, ACTIVITY_ID) {
                    return Err(UpgradeError::invariant(format!(
                        "A trace in index '{}' does not contain an {}",
                        index, ACTIVITY_ID
                    )));
                }
            }
        }
        Ok(())
    }

    async fn restore(&self, store: &dyn DocumentStore, ctx: &UpgradeContext) -> Result<()> {
        let origin = self.step().origin;
        for index in self.session_ids(ctx).await? {
            let backup = backup_name(&index, origin);
            if store.collection_exists(&backup).await? {
                store.drop_collection(&index).await?;
                store.copy_collection(&backup, &index).await?;
                debug!("Restored index '{}'", index);
            }
        }
        Ok(())
    }
}
