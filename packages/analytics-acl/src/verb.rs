use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::AclError;

/// HTTP verb a permission can grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Verb {
    pub const ALL: [Verb; 7] = [
        Verb::Get,
        Verb::Post,
        Verb::Put,
        Verb::Delete,
        Verb::Patch,
        Verb::Head,
        Verb::Options,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::Post => "post",
            Verb::Put => "put",
            Verb::Delete => "delete",
            Verb::Patch => "patch",
            Verb::Head => "head",
            Verb::Options => "options",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive, so request methods (`GET`) parse as well as table
/// entries (`get`).
impl FromStr for Verb {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Verb::ALL
            .into_iter()
            .find(|verb| verb.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AclError::UnknownVerb(s.to_string()))
    }
}

/// One entry of a grant's `permissions` list
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Permission {
    /// `*`: every verb
    Any,
    Verb(Verb),
}

impl Permission {
    pub fn allows(&self, verb: Verb) -> bool {
        match self {
            Permission::Any => true,
            Permission::Verb(granted) => *granted == verb,
        }
    }

    /// Verbs this permission grants
    pub fn verbs(&self) -> BTreeSet<Verb> {
        match self {
            Permission::Any => Verb::ALL.into_iter().collect(),
            Permission::Verb(verb) => BTreeSet::from([*verb]),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Any => f.write_str("*"),
            Permission::Verb(verb) => verb.fmt(f),
        }
    }
}

impl FromStr for Permission {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "*" {
            return Ok(Permission::Any);
        }
        s.parse().map(Permission::Verb)
    }
}

impl Serialize for Permission {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbs_parse_any_case() {
        assert_eq!("GET".parse::<Verb>().unwrap(), Verb::Get);
        assert_eq!("delete".parse::<Verb>().unwrap(), Verb::Delete);
        assert!(matches!(
            "fetch".parse::<Verb>(),
            Err(AclError::UnknownVerb(v)) if v == "fetch"
        ));
    }

    #[test]
    fn test_wildcard_permission() {
        let any: Permission = "*".parse().unwrap();
        assert_eq!(any, Permission::Any);
        assert!(Verb::ALL.iter().all(|v| any.allows(*v)));
        assert_eq!(any.verbs().len(), Verb::ALL.len());

        let put: Permission = "put".parse().unwrap();
        assert!(put.allows(Verb::Put));
        assert!(!put.allows(Verb::Delete));
    }

    #[test]
    fn test_permission_serde() {
        let perms: Vec<Permission> = serde_json::from_str(r#"["get", "*"]"#).unwrap();
        assert_eq!(perms, vec![Permission::Verb(Verb::Get), Permission::Any]);
        assert_eq!(serde_json::to_string(&perms).unwrap(), r#"["get","*"]"#);
        assert!(serde_json::from_str::<Vec<Permission>>(r#"["fetch"]"#).is_err());
    }
}
