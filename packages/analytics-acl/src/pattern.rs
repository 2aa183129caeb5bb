//! Resource patterns as written in the role table.
//!
//! - `:name` matches exactly one non-empty path segment
//! - a final `*` segment matches the non-empty rest of the path
//! - anything else matches literally
//!
//! A trailing slash is ignored on both the pattern and the path, and so is a
//! query string on the path.

use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{AclError, Result};

#[derive(Debug, Clone)]
pub struct ResourcePattern {
    source: String,
    regex: Regex,
    params: Vec<String>,
}

/// Drop the query string and any trailing slash (`/` itself stays)
pub fn normalize_path(path: &str) -> &str {
    let path = path.split(|c: char| c == '?' || c == '#').next().unwrap_or(path);
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}

impl ResourcePattern {
    pub fn compile(pattern: &str) -> Result<Self> {
        if !pattern.starts_with('/') {
            return Err(AclError::invalid_pattern(pattern, "must start with '/'"));
        }

        let normalized = normalize_path(pattern);
        let segments: Vec<&str> = normalized
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        let mut expr = String::from("^");
        let mut params = Vec::new();
        for (i, segment) in segments.iter().enumerate() {
            if *segment == "*" {
                if i + 1 != segments.len() {
                    return Err(AclError::invalid_pattern(
                        pattern,
                        "'*' must be the last segment",
                    ));
                }
                expr.push_str("/(.+)");
            } else if let Some(name) = segment.strip_prefix(':') {
                if name.is_empty() {
                    return Err(AclError::invalid_pattern(pattern, "unnamed ':' segment"));
                }
                if params.iter().any(|p| p == name) {
                    return Err(AclError::invalid_pattern(
                        pattern,
                        format!("parameter ':{}' appears twice", name),
                    ));
                }
                params.push(name.to_string());
                expr.push_str("/([^/]+)");
            } else {
                expr.push('/');
                expr.push_str(&regex::escape(segment));
            }
        }
        if segments.is_empty() {
            expr.push('/');
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| AclError::invalid_pattern(pattern, e))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
            params,
        })
    }

    /// The pattern as written in the table
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn param_names(&self) -> &[String] {
        &self.params
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(normalize_path(path))
    }

    /// Named segment values of a matching path. A `*` tail is returned under
    /// the key `*`.
    pub fn captures(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let caps = self.regex.captures(normalize_path(path))?;
        let mut names = self.params.iter().map(String::as_str);
        let mut values = BTreeMap::new();
        for group in caps.iter().skip(1).flatten() {
            let name = names.next().unwrap_or("*");
            values.insert(name.to_string(), group.as_str().to_string());
        }
        Some(values)
    }
}

impl fmt::Display for ResourcePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for ResourcePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for ResourcePattern {}
