//! Compiled role table.
//!
//! Patterns are compiled once in [`AccessControl::compile`]; queries only run
//! regexes against the request path. A role's grants are additive: a verb is
//! allowed when any of its rules matches the path and grants the verb.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

use crate::error::{AclError, Result};
use crate::model::RoleTable;
use crate::pattern::ResourcePattern;
use crate::verb::{Permission, Verb};

#[derive(Debug, Clone)]
struct Rule {
    pattern: ResourcePattern,
    verbs: BTreeSet<Verb>,
}

impl Rule {
    fn matches(&self, path: &str) -> bool {
        self.pattern.matches(path)
    }
}

/// Outcome of checking a request against the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The route needs no role
    Anonymous,
    /// Granted to the named role
    Granted(String),
    Denied,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Decision::Denied)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccessControl {
    rules: BTreeMap<String, Vec<Rule>>,
    anonymous: Vec<ResourcePattern>,
    autoroles: BTreeSet<String>,
}

impl AccessControl {
    pub fn compile(table: &RoleTable) -> Result<Self> {
        let mut rules: BTreeMap<String, Vec<Rule>> = BTreeMap::new();

        for (index, grant) in table.roles.iter().enumerate() {
            if grant.roles.is_empty() {
                return Err(AclError::EmptyGrant(index));
            }
            for allow in &grant.allows {
                let verbs: BTreeSet<Verb> = allow
                    .permissions
                    .iter()
                    .flat_map(Permission::verbs)
                    .collect();
                for resource in &allow.resources {
                    let pattern = ResourcePattern::compile(resource)?;
                    for role in grant.roles.iter() {
                        rules.entry(role.to_string()).or_default().push(Rule {
                            pattern: pattern.clone(),
                            verbs: verbs.clone(),
                        });
                    }
                }
            }
        }

        let anonymous = table
            .anonymous
            .iter()
            .map(|resource| ResourcePattern::compile(resource))
            .collect::<Result<Vec<_>>>()?;

        let acl = Self {
            rules,
            anonymous,
            autoroles: table.autoroles.iter().cloned().collect(),
        };
        debug!(
            roles = acl.rules.len(),
            rules = acl.rules.values().map(Vec::len).sum::<usize>(),
            anonymous = acl.anonymous.len(),
            "Compiled role table"
        );
        Ok(acl)
    }

    /// Compile the built-in table
    pub fn from_default() -> Result<Self> {
        Self::compile(&RoleTable::default_table()?)
    }

    pub fn is_allowed(&self, role: &str, path: &str, verb: Verb) -> bool {
        let allowed = self
            .rules
            .get(role)
            .map(|rules| {
                rules
                    .iter()
                    .any(|rule| rule.verbs.contains(&verb) && rule.matches(path))
            })
            .unwrap_or(false);
        trace!(role, path, %verb, allowed, "Checked permission");
        allowed
    }

    /// Union of the verbs `role` holds on `path`
    pub fn allowed_verbs(&self, role: &str, path: &str) -> BTreeSet<Verb> {
        self.rules
            .get(role)
            .into_iter()
            .flatten()
            .filter(|rule| rule.matches(path))
            .flat_map(|rule| rule.verbs.iter().copied())
            .collect()
    }

    pub fn is_anonymous(&self, path: &str) -> bool {
        self.anonymous.iter().any(|pattern| pattern.matches(path))
    }

    pub fn is_autorole(&self, role: &str) -> bool {
        self.autoroles.contains(role)
    }

    /// Roles holding at least one grant
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Check a request made by a user holding `roles`. Anonymous routes are
    /// open to everyone; otherwise the first role (in the caller's order)
    /// granting the verb wins.
    pub fn authorize<'a, I>(&self, roles: I, path: &str, verb: Verb) -> Decision
    where
        I: IntoIterator<Item = &'a str>,
    {
        if self.is_anonymous(path) {
            return Decision::Anonymous;
        }
        let decision = roles
            .into_iter()
            .find(|role| self.is_allowed(role, path, verb))
            .map(|role| Decision::Granted(role.to_string()))
            .unwrap_or(Decision::Denied);
        debug!(path, %verb, ?decision, "Authorized request");
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table(yaml: &str) -> AccessControl {
        AccessControl::compile(&RoleTable::from_yaml_str(yaml).unwrap()).unwrap()
    }

    #[test]
    fn test_grants_are_additive() {
        let acl = table(
            r#"
roles:
  - roles: student
    allows:
      - resources: [/classes/:classId]
        permissions: [get]
      - resources: [/classes/:classId]
        permissions: [put]
"#,
        );
        assert_eq!(
            acl.allowed_verbs("student", "/classes/1"),
            BTreeSet::from([Verb::Get, Verb::Put])
        );
        assert!(!acl.is_allowed("student", "/classes/1", Verb::Delete));
    }

    #[test]
    fn test_shared_grant_applies_to_each_role() {
        let acl = table(
            r#"
roles:
  - roles: [teacher, teachingassistant]
    allows:
      - resources: [/kibana/*]
        permissions: ["*"]
"#,
        );
        assert_eq!(acl.roles().collect::<Vec<_>>(), vec!["teacher", "teachingassistant"]);
        assert!(acl.is_allowed("teachingassistant", "/kibana/app", Verb::Delete));
        assert!(!acl.is_allowed("student", "/kibana/app", Verb::Get));
    }

    #[test]
    fn test_empty_grant_rejected() {
        let table = RoleTable::from_yaml_str("roles:\n  - roles: []\n    allows: []\n").unwrap();
        assert!(matches!(
            AccessControl::compile(&table),
            Err(AclError::EmptyGrant(0))
        ));
    }

    #[test]
    fn test_bad_pattern_rejected() {
        let table = RoleTable::from_yaml_str(
            "roles:\n  - roles: student\n    allows:\n      - resources: [games]\n        permissions: [get]\n",
        )
        .unwrap();
        assert!(matches!(
            AccessControl::compile(&table),
            Err(AclError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_authorize_order() {
        let acl = table(
            r#"
roles:
  - roles: [student, teacher]
    allows:
      - resources: [/classes/my]
        permissions: [get]
anonymous: [/env]
"#,
        );
        assert_eq!(
            acl.authorize(["teacher", "student"], "/classes/my", Verb::Get),
            Decision::Granted("teacher".to_string())
        );
        assert_eq!(acl.authorize([], "/env", Verb::Get), Decision::Anonymous);
        assert_eq!(
            acl.authorize(["student"], "/classes/my", Verb::Post),
            Decision::Denied
        );
        assert!(!Decision::Denied.is_allowed());
    }
}
