//! Role × category authorization decisions.
//!
//! The permission table is plain data (`role → category → actions`), loadable from config so it
//! can be audited without reading code. [`PermissionEngine::decide`] is a pure function over that
//! table; resolving which category a request touches is the caller's job.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::api::models::users::Role;
use crate::errors::Error;
use crate::types::{Permission, ProductCategory};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionTable(BTreeMap<Role, BTreeMap<ProductCategory, BTreeSet<Permission>>>);

impl PermissionTable {
    pub fn new(entries: BTreeMap<Role, BTreeMap<ProductCategory, BTreeSet<Permission>>>) -> Self {
        Self(entries)
    }

    pub fn actions(&self, role: Role, category: ProductCategory) -> Option<&BTreeSet<Permission>> {
        self.0.get(&role).and_then(|categories| categories.get(&category))
    }

    pub fn has_any_entry(&self, role: Role) -> bool {
        self.0.get(&role).is_some_and(|categories| !categories.is_empty())
    }
}

impl Default for PermissionTable {
    /// Admin manages everything; each category role manages its own category and reads the other.
    fn default() -> Self {
        let all: BTreeSet<Permission> = Permission::ALL.into_iter().collect();
        let read_only: BTreeSet<Permission> = [Permission::Read].into_iter().collect();

        Self(BTreeMap::from([
            (
                Role::Admin,
                BTreeMap::from([
                    (ProductCategory::Fruits, all.clone()),
                    (ProductCategory::Vegetables, all.clone()),
                ]),
            ),
            (
                Role::FruitGuy,
                BTreeMap::from([
                    (ProductCategory::Fruits, all.clone()),
                    (ProductCategory::Vegetables, read_only.clone()),
                ]),
            ),
            (
                Role::VegetableGuy,
                BTreeMap::from([(ProductCategory::Vegetables, all), (ProductCategory::Fruits, read_only)]),
            ),
        ]))
    }
}

/// What a route demands of the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirement {
    /// Action needed on the target's category
    pub action: Option<Permission>,
    /// When set, only these roles (and Admin) get past the role check
    pub allowed_roles: Option<Vec<Role>>,
    /// The route acts on a specific product whose category must be resolved
    pub resource_scoped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    RoleNotPermitted { role: Role },
    /// A category-scoped route whose target could not be resolved. A client error, not a 403.
    ResourceNotSpecified,
    NoPermissionsForCategory { role: Role, category: ProductCategory },
    MissingPermission {
        role: Role,
        action: Permission,
        category: ProductCategory,
    },
    NoPermissions { role: Role },
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::RoleNotPermitted { role } => write!(f, "role not permitted: {role}"),
            DenyReason::ResourceNotSpecified => write!(f, "Product not specified or could not be resolved"),
            DenyReason::NoPermissionsForCategory { role, category } => {
                write!(f, "role has no permissions for this category ({role} on {category})")
            }
            DenyReason::MissingPermission { role, action, category } => {
                write!(f, "role {role} lacks the {action} permission on {category}")
            }
            DenyReason::NoPermissions { role } => write!(f, "role {role} has no permissions"),
        }
    }
}

impl From<DenyReason> for Error {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::ResourceNotSpecified => Error::BadRequest {
                message: reason.to_string(),
            },
            other => Error::Forbidden {
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PermissionEngine {
    table: PermissionTable,
}

impl PermissionEngine {
    pub fn new(table: PermissionTable) -> Self {
        Self { table }
    }

    pub fn decide(&self, role: Role, requirement: &Requirement, category: Option<ProductCategory>) -> Decision {
        if role == Role::Admin {
            return Decision::Allow;
        }

        if let Some(allowed) = &requirement.allowed_roles
            && !allowed.contains(&role)
        {
            return Decision::Deny(DenyReason::RoleNotPermitted { role });
        }

        match category {
            Some(category) => {
                let Some(actions) = self.table.actions(role, category) else {
                    return Decision::Deny(DenyReason::NoPermissionsForCategory { role, category });
                };
                match requirement.action {
                    Some(action) if !actions.contains(&action) => {
                        Decision::Deny(DenyReason::MissingPermission { role, action, category })
                    }
                    _ => Decision::Allow,
                }
            }
            None if requirement.resource_scoped => Decision::Deny(DenyReason::ResourceNotSpecified),
            None if self.table.has_any_entry(role) => Decision::Allow,
            None => Decision::Deny(DenyReason::NoPermissions { role }),
        }
    }
}
