/*
 * Analytics ACL
 *
 * Role/permission table of the analytics backend:
 * - serde model of the table (JSON or YAML)
 * - resource patterns with `:param` and `*` segments
 * - compiled lookups: allowed verbs, anonymous routes, auto-assignable roles
 */

pub mod access;
pub mod error;
pub mod model;
pub mod pattern;
pub mod verb;

pub use access::{AccessControl, Decision};
pub use error::{AclError, Result};
pub use model::{Allow, OneOrMany, RoleGrant, RoleTable, DEFAULT_ROLES_JSON};
pub use pattern::{normalize_path, ResourcePattern};
pub use verb::{Permission, Verb};
