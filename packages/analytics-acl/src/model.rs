use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AclError, Result};
use crate::verb::Permission;

/// The backend's role table, compiled into the binary
pub const DEFAULT_ROLES_JSON: &str = include_str!("default_roles.json");

/// A single role name or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let names: &[String] = match self {
            OneOrMany::One(name) => std::slice::from_ref(name),
            OneOrMany::Many(names) => names,
        };
        names.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// Verbs granted on a set of resource patterns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Allow {
    pub resources: Vec<String>,
    pub permissions: Vec<Permission>,
}

/// Grants shared by one or more roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleGrant {
    pub roles: OneOrMany,
    pub allows: Vec<Allow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleTable {
    pub roles: Vec<RoleGrant>,
    /// Resources reachable without any role
    #[serde(default)]
    pub anonymous: Vec<String>,
    /// Roles a user may be given without an administrator
    #[serde(default)]
    pub autoroles: Vec<String>,
}

impl RoleTable {
    /// The table the analytics backend ships with
    pub fn default_table() -> Result<Self> {
        Self::from_json_str(DEFAULT_ROLES_JSON)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load a table from disk; `.yaml`/`.yml` files are read as YAML,
    /// anything else as JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| AclError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            _ => Self::from_json_str(&text),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Every role named by a grant or listed as an autorole, sorted and
    /// deduplicated
    pub fn role_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .roles
            .iter()
            .flat_map(|grant| grant.roles.iter())
            .chain(self.autoroles.iter().map(String::as_str))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}
