//! Per-route authorization requirements.
//!
//! Routes are keyed by HTTP method and the router's path template (`/products/{id}`), i.e. the
//! value axum exposes as [`axum::extract::MatchedPath`]. Routes without an entry only require an
//! authenticated caller.

use axum::http::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::api::models::users::Role;
use crate::auth::permissions::Requirement;
use crate::errors::Error;
use crate::types::Permission;

/// One `access_policy` entry as written in config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouteRule {
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Permission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_roles: Option<Vec<Role>>,
    #[serde(default)]
    pub resource_scoped: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    rules: HashMap<(Method, String), Requirement>,
}

impl AccessPolicy {
    pub fn from_rules(rules: &[RouteRule]) -> Result<Self, Error> {
        let mut policy = Self::default();

        for rule in rules {
            let method = Method::from_bytes(rule.method.to_ascii_uppercase().as_bytes()).map_err(|_| Error::Config {
                message: format!("access_policy: invalid HTTP method '{}'", rule.method),
            })?;
            if !rule.path.starts_with('/') {
                return Err(Error::Config {
                    message: format!("access_policy: path '{}' must start with '/'", rule.path),
                });
            }

            let key = (method, rule.path.clone());
            if policy.rules.contains_key(&key) {
                return Err(Error::Config {
                    message: format!("access_policy: duplicate rule for {} {}", key.0, key.1),
                });
            }
            policy.rules.insert(
                key,
                Requirement {
                    action: rule.action,
                    allowed_roles: rule.allowed_roles.clone(),
                    resource_scoped: rule.resource_scoped,
                },
            );
        }

        Ok(policy)
    }

    /// Add or replace the rule for `method path`.
    pub fn with_rule(mut self, method: Method, path: impl Into<String>, requirement: Requirement) -> Self {
        self.rules.insert((method, path.into()), requirement);
        self
    }

    pub fn requirement(&self, method: &Method, path: &str) -> Option<&Requirement> {
        self.rules.get(&(method.clone(), path.to_string()))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(method: &str, path: &str) -> RouteRule {
        RouteRule {
            method: method.to_string(),
            path: path.to_string(),
            action: Some(Permission::Update),
            allowed_roles: None,
            resource_scoped: true,
        }
    }

    #[test]
    fn test_lookup_by_method_and_template() {
        let policy = AccessPolicy::from_rules(&[rule("patch", "/products/{id}")]).unwrap();

        let requirement = policy.requirement(&Method::PATCH, "/products/{id}").unwrap();
        assert_eq!(requirement.action, Some(Permission::Update));
        assert!(requirement.resource_scoped);

        assert!(policy.requirement(&Method::GET, "/products/{id}").is_none());
        assert!(policy.requirement(&Method::PATCH, "/products").is_none());
    }

    #[test]
    fn test_invalid_rules_rejected() {
        assert!(matches!(
            AccessPolicy::from_rules(&[rule("GE T", "/x")]),
            Err(Error::Config { .. })
        ));
        assert!(matches!(
            AccessPolicy::from_rules(&[rule("GET", "products")]),
            Err(Error::Config { .. })
        ));
        assert!(matches!(
            AccessPolicy::from_rules(&[rule("GET", "/x"), rule("get", "/x")]),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_with_rule_overrides() {
        let policy = AccessPolicy::from_rules(&[rule("DELETE", "/products/{id}")])
            .unwrap()
            .with_rule(Method::DELETE, "/products/{id}", Requirement::default());

        assert_eq!(policy.len(), 1);
        assert_eq!(policy.requirement(&Method::DELETE, "/products/{id}"), Some(&Requirement::default()));
    }
}
