//! Common type definitions shared by the auth, permission and storage layers.
//!
//! - [`UserId`] / [`ProductId`]: entity identifiers
//! - [`Permission`]: the action half of a permission check (read/create/update/delete)
//! - [`ProductCategory`]: the resource class permissions are scoped to
//! - [`abbrev_uuid`]: abbreviate UUIDs to first 8 chars for logging

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type UserId = Uuid;
pub type ProductId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// Actions a role may be granted on a product category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Create,
    Update,
    Delete,
}

impl Permission {
    pub const ALL: [Permission; 4] = [Permission::Read, Permission::Create, Permission::Update, Permission::Delete];
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Read => write!(f, "read"),
            Permission::Create => write!(f, "create"),
            Permission::Update => write!(f, "update"),
            Permission::Delete => write!(f, "delete"),
        }
    }
}

/// Classification of a product, used to scope permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "product_category")]
pub enum ProductCategory {
    Fruits,
    Vegetables,
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductCategory::Fruits => write!(f, "Fruits"),
            ProductCategory::Vegetables => write!(f, "Vegetables"),
        }
    }
}
