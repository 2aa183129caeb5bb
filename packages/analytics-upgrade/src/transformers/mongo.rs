//! Document database, v2 -> v3: sessions become activities and classes stop
//! pointing at a game.

use analytics_storage::{Document, DocumentStore};
use async_trait::async_trait;
use tracing::info;

use super::{backup_name, has_value};
use crate::context::UpgradeContext;
use crate::error::{Result, UpgradeError};
use crate::store_controller::Transformer;
use crate::version::VersionStep;

pub const CLASSES: &str = "classes";
pub const SESSIONS: &str = "sessions";
pub const ACTIVITIES: &str = "activities";

/// Fields classes no longer carry after v3
const CLASS_GAME_FIELDS: [&str; 2] = ["gameId", "versionId"];

#[derive(Debug, Default, Clone, Copy)]
pub struct MongoToVersion3;

impl MongoToVersion3 {
    const BACKED_UP: [&'static str; 2] = [SESSIONS, CLASSES];
}

fn check_class(class: &Document) -> Result<()> {
    for field in CLASS_GAME_FIELDS {
        if has_value(class, field) {
            return Err(UpgradeError::invariant(format!("A class contains a {}", field)));
        }
    }
    Ok(())
}

fn check_activity(activity: &Document) -> Result<()> {
    for field in CLASS_GAME_FIELDS {
        if !has_value(activity, field) {
            return Err(UpgradeError::invariant(format!(
                "An activity does not contain a {}",
                field
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl Transformer for MongoToVersion3 {
    fn step(&self) -> VersionStep {
        VersionStep::new(2, 3)
    }

    async fn backup(&self, store: &dyn DocumentStore, _ctx: &UpgradeContext) -> Result<()> {
        let origin = self.step().origin;
        for collection in Self::BACKED_UP {
            let backup = backup_name(collection, origin);
            if !store.collection_exists(collection).await?
                || store.collection_exists(&backup).await?
            {
                continue;
            }
            store.copy_collection(collection, &backup).await?;
            info!("Backed up '{}' into '{}'", collection, backup);
        }
        Ok(())
    }

    async fn upgrade(&self, store: &dyn DocumentStore, _ctx: &UpgradeContext) -> Result<()> {
        let stripped = store.update_many_unset(CLASSES, &CLASS_GAME_FIELDS).await?;
        info!("Removed game fields from {} classes", stripped);

        store.rename_collection(SESSIONS, ACTIVITIES).await?;
        info!("Renamed '{}' to '{}'", SESSIONS, ACTIVITIES);
        Ok(())
    }

    async fn check(&self, store: &dyn DocumentStore, _ctx: &UpgradeContext) -> Result<()> {
        let collections = store.list_collections().await?;
        if collections.iter().any(|c| c == SESSIONS) {
            return Err(UpgradeError::invariant("Sessions collection found!"));
        }
        if !collections.iter().any(|c| c == ACTIVITIES) {
            return Err(UpgradeError::invariant("Activities collection not found!"));
        }

        for class in store.find(CLASSES).await? {
            check_class(&class)?;
        }
        for activity in store.find(ACTIVITIES).await? {
            check_activity(&activity)?;
        }
        Ok(())
    }

    async fn restore(&self, store: &dyn DocumentStore, _ctx: &UpgradeContext) -> Result<()> {
        let origin = self.step().origin;
        let sessions_backup = backup_name(SESSIONS, origin);
        let classes_backup = backup_name(CLASSES, origin);

        if store.collection_exists(&sessions_backup).await? {
            store.drop_collection(ACTIVITIES).await?;
            store.drop_collection(SESSIONS).await?;
            store.copy_collection(&sessions_backup, SESSIONS).await?;
            info!("Restored '{}' from '{}'", SESSIONS, sessions_backup);
        } else if !store.collection_exists(SESSIONS).await?
            && store.collection_exists(ACTIVITIES).await?
        {
            store.rename_collection(ACTIVITIES, SESSIONS).await?;
            info!("No backup of '{}', renamed '{}' back", SESSIONS, ACTIVITIES);
        }

        if store.collection_exists(&classes_backup).await? {
            store.drop_collection(CLASSES).await?;
            store.copy_collection(&classes_backup, CLASSES).await?;
            info!("Restored '{}' from '{}'", CLASSES, classes_backup);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analytics_storage::{document, MemoryStore};
    use serde_json::json;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_many(
                CLASSES,
                vec![
                    document(
                        "c1",
                        json!({ "name": "1A", "gameId": "g1", "versionId": "v1" }),
                    )
                    .unwrap(),
                    document("c2", json!({ "name": "1B" })).unwrap(),
                ],
            )
            .await
            .unwrap();
        store
            .insert_many(
                SESSIONS,
                vec![document(
                    "s1",
                    json!({ "gameId": "g1", "versionId": "v1", "classId": "c1" }),
                )
                .unwrap()],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_upgrade_then_check() {
        let store = seeded().await;
        let ctx = UpgradeContext::default();
        let step = MongoToVersion3;

        step.backup(&store, &ctx).await.unwrap();
        step.upgrade(&store, &ctx).await.unwrap();
        step.check(&store, &ctx).await.unwrap();

        let classes = store.find(CLASSES).await.unwrap();
        assert!(classes.iter().all(|c| !c.contains_key("gameId")));
        assert_eq!(classes[0]["name"], "1A");
        assert!(!store.collection_exists(SESSIONS).await.unwrap());
        assert_eq!(store.find(ACTIVITIES).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_backup_is_idempotent() {
        let store = seeded().await;
        let ctx = UpgradeContext::default();
        let step = MongoToVersion3;

        step.backup(&store, &ctx).await.unwrap();
        store
            .upsert(CLASSES, document("c3", json!({})).unwrap())
            .await
            .unwrap();
        step.backup(&store, &ctx).await.unwrap();

        // The second backup leaves the first one alone
        assert_eq!(store.find("classes_backup_v2").await.unwrap().len(), 2);
        assert_eq!(store.find("sessions_backup_v2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_check_rejects_activity_without_game() {
        let store = MemoryStore::new();
        let ctx = UpgradeContext::default();
        store
            .insert_many(ACTIVITIES, vec![document("a1", json!({ "gameId": "g1" })).unwrap()])
            .await
            .unwrap();

        let err = MongoToVersion3.check(&store, &ctx).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invariant violated: An activity does not contain a versionId"
        );
    }

    #[tokio::test]
    async fn test_check_rejects_leftover_sessions() {
        let store = seeded().await;
        let ctx = UpgradeContext::default();
        store.insert_many(ACTIVITIES, Vec::new()).await.unwrap();

        let err = MongoToVersion3.check(&store, &ctx).await.unwrap_err();
        assert!(err.to_string().contains("Sessions collection found"));
    }

    #[tokio::test]
    async fn test_upgrade_fails_without_sessions() {
        let store = MemoryStore::new();
        let ctx = UpgradeContext::default();
        let err = MongoToVersion3.upgrade(&store, &ctx).await.unwrap_err();
        assert!(matches!(err, UpgradeError::Storage(ref e) if e.is_not_found()));
    }

    #[tokio::test]
    async fn test_restore_brings_back_sessions_and_classes() {
        let store = seeded().await;
        let ctx = UpgradeContext::default();
        let step = MongoToVersion3;
        let before = store.dump();

        step.backup(&store, &ctx).await.unwrap();
        step.upgrade(&store, &ctx).await.unwrap();
        step.restore(&store, &ctx).await.unwrap();

        assert!(!store.collection_exists(ACTIVITIES).await.unwrap());
        assert_eq!(store.find(SESSIONS).await.unwrap(), before[SESSIONS]);
        assert_eq!(store.find(CLASSES).await.unwrap(), before[CLASSES]);
    }
}
