//! Schema versions and inter-controller requirements.
//!
//! Persisted records and older configuration files carry versions either as
//! numbers (`2`) or strings (`"2"`). Both decode into the same `Version`, and
//! requirement checks compare `Version`s exactly, never their text.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::UpgradeError;

/// Data schema version of one controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Version(pub u32);

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Version {
    type Err = UpgradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(Version)
            .map_err(|e| UpgradeError::parse(format!("Invalid version {:?}: {}", s, e)))
    }
}

impl From<u32> for Version {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Version(n)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// The pair of versions a migration step moves data between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionStep {
    pub origin: Version,
    pub destination: Version,
}

impl VersionStep {
    pub fn new(origin: u32, destination: u32) -> Self {
        Self {
            origin: Version(origin),
            destination: Version(destination),
        }
    }

    /// A step that stays in place (reported by up-to-date controllers)
    pub fn stay(at: Version) -> Self {
        Self {
            origin: at,
            destination: at,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.origin == self.destination
    }

    /// The same step walked backwards
    pub fn reversed(self) -> Self {
        Self {
            origin: self.destination,
            destination: self.origin,
        }
    }
}

impl fmt::Display for VersionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{} -> v{}", self.origin, self.destination)
    }
}

/// Controller name -> version that controller must still be at
pub type Requirements = BTreeMap<String, Version>;

/// Build a `Requirements` map from `(name, version)` pairs
pub fn requirements<I, S>(pairs: I) -> Requirements
where
    I: IntoIterator<Item = (S, u32)>,
    S: Into<String>,
{
    pairs
        .into_iter()
        .map(|(name, version)| (name.into(), Version(version)))
        .collect()
}
