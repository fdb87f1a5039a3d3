//! Database models for products. Products are owned by the catalog; this crate only reads them.

use crate::types::{ProductCategory, ProductId};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductDBResponse {
    pub id: ProductId,
    pub name: String,
    pub category: ProductCategory,
    pub price: f64,
}
