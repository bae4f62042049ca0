//! Operator Sanitizer
//!
//! Walks an arbitrary JSON tree and reports the first mapping key that is
//! in the forbidden set. Scalars end the walk; arrays are descended into so
//! pipeline stages and `$or`/`$and` branches are covered.

use std::collections::HashSet;

use serde_json::Value;

use super::errors::{GatewayError, GatewayResult};

/// Deny-list of operator keys
#[derive(Debug, Clone)]
pub struct OperatorSanitizer {
    forbidden: HashSet<String>,
}

/// A forbidden key and where it was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub operator: String,
    pub path: String,
}

impl From<Violation> for GatewayError {
    fn from(v: Violation) -> Self {
        GatewayError::ForbiddenOperator {
            operator: v.operator,
            path: v.path,
        }
    }
}

impl OperatorSanitizer {
    pub fn new(forbidden: impl IntoIterator<Item = String>) -> Self {
        Self {
            forbidden: forbidden.into_iter().collect(),
        }
    }

    pub fn is_forbidden(&self, key: &str) -> bool {
        self.forbidden.contains(key)
    }

    /// First forbidden key in `value`, depth-first in document order.
    /// `root` prefixes the reported path.
    pub fn find_violation(&self, root: &str, value: &Value) -> Option<Violation> {
        let mut path = vec![root.to_string()];
        self.walk(value, &mut path)
    }

    /// Same as `find_violation`, as a gateway error
    pub fn check(&self, root: &str, value: &Value) -> GatewayResult<()> {
        match self.find_violation(root, value) {
            Some(v) => Err(v.into()),
            None => Ok(()),
        }
    }

    fn walk(&self, value: &Value, path: &mut Vec<String>) -> Option<Violation> {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    if self.is_forbidden(key) {
                        return Some(Violation {
                            operator: key.clone(),
                            path: path.join("."),
                        });
                    }
                    path.push(key.clone());
                    let found = self.walk(child, path);
                    path.pop();
                    if found.is_some() {
                        return found;
                    }
                }
                None
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    path.push(i.to_string());
                    let found = self.walk(child, path);
                    path.pop();
                    if found.is_some() {
                        return found;
                    }
                }
                None
            }
            _ => None,
        }
    }
}

impl Default for OperatorSanitizer {
    fn default() -> Self {
        Self::new(super::config::GatewayConfig::default().forbidden_operators)
    }
}
