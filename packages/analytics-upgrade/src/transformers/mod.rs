//! Built-in controllers of the analytics backend and their migration steps

pub mod elastic;
pub mod mongo;

use analytics_storage::Document;

use crate::registry::ControllerRegistry;
use crate::store_controller::StoreController;
use crate::version::Version;

pub use elastic::ElasticToVersion3;
pub use mongo::MongoToVersion3;

/// Controller of the document database (games, classes, sessions)
pub const MONGO: &str = "mongo";

/// Controller of the trace search index
pub const ELASTIC: &str = "elastic";

/// Version of stores that predate version records
pub const DEFAULT_INITIAL_VERSION: u32 = 2;

/// Collection a step backs `collection` up into before touching it
pub fn backup_name(collection: &str, origin: Version) -> String {
    format!("{}_backup_v{}", collection, origin)
}

/// Field present and not null
pub(crate) fn has_value(doc: &Document, field: &str) -> bool {
    doc.get(field).map_or(false, |v| !v.is_null())
}

pub fn mongo_controller() -> StoreController {
    StoreController::new(MONGO, DEFAULT_INITIAL_VERSION).with_transformer(MongoToVersion3)
}

pub fn elastic_controller() -> StoreController {
    StoreController::new(ELASTIC, DEFAULT_INITIAL_VERSION)
        .with_transformer(ElasticToVersion3::default())
}

/// Registry with every built-in controller
pub fn builtin_registry() -> ControllerRegistry {
    let mut registry = ControllerRegistry::new();
    registry.register(MONGO, mongo_controller());
    registry.register(ELASTIC, elastic_controller());
    registry
}
