//! Product category resolution for authorization.

use crate::db::{errors::Result, models::products::ProductDBResponse};
use crate::types::{ProductCategory, ProductId, abbrev_uuid};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

/// How a request refers to the product it acts on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRef {
    /// Raw id as supplied by the caller. Ids that are not valid UUIDs never resolve.
    pub id: Option<String>,
    pub name: Option<String>,
}

impl ResourceRef {
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.name.is_none()
    }
}

/// Maps a product reference to its category.
#[async_trait]
pub trait ResourceClassResolver: Send + Sync {
    async fn category_by_id(&self, id: ProductId) -> Result<Option<ProductCategory>>;

    async fn category_by_name(&self, name: &str) -> Result<Option<ProductCategory>>;

    /// Resolve by id first, falling back to the name when the id is absent or unknown.
    async fn resolve(&self, target: &ResourceRef) -> Result<Option<ProductCategory>> {
        if let Some(id) = target.id.as_deref().and_then(|raw| raw.parse::<ProductId>().ok())
            && let Some(category) = self.category_by_id(id).await?
        {
            return Ok(Some(category));
        }

        if let Some(name) = target.name.as_deref()
            && let Some(category) = self.category_by_name(name).await?
        {
            return Ok(Some(category));
        }

        Ok(None)
    }
}

pub struct PgProducts {
    pool: PgPool,
}

impl PgProducts {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a product. Catalog management lives elsewhere; this seeds the lookup table.
    #[instrument(skip(self, product), fields(product_id = %abbrev_uuid(&product.id)), err)]
    pub async fn insert(&self, product: &ProductDBResponse) -> Result<()> {
        sqlx::query("INSERT INTO products (id, name, category, price) VALUES ($1, $2, $3, $4)")
            .bind(product.id)
            .bind(&product.name)
            .bind(product.category)
            .bind(product.price)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ResourceClassResolver for PgProducts {
    #[instrument(skip(self), fields(product_id = %abbrev_uuid(&id)), err)]
    async fn category_by_id(&self, id: ProductId) -> Result<Option<ProductCategory>> {
        let category = sqlx::query_scalar::<_, ProductCategory>("SELECT category FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(category)
    }

    #[instrument(skip(self), err)]
    async fn category_by_name(&self, name: &str) -> Result<Option<ProductCategory>> {
        let category = sqlx::query_scalar::<_, ProductCategory>("SELECT category FROM products WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn seed(products: &PgProducts, name: &str, category: ProductCategory) -> ProductId {
        let product = ProductDBResponse {
            id: Uuid::new_v4(),
            name: name.to_string(),
            category,
            price: 1.5,
        };
        products.insert(&product).await.unwrap();
        product.id
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_resolve_by_id(pool: PgPool) {
        let products = PgProducts::new(pool);
        let apple = seed(&products, "apple", ProductCategory::Fruits).await;

        let target = ResourceRef {
            id: Some(apple.to_string()),
            name: None,
        };
        assert_eq!(products.resolve(&target).await.unwrap(), Some(ProductCategory::Fruits));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_resolve_falls_back_to_name(pool: PgPool) {
        let products = PgProducts::new(pool);
        seed(&products, "potato", ProductCategory::Vegetables).await;

        // Unknown id, then an id that is not a UUID at all
        for id in [Uuid::new_v4().to_string(), "not-a-uuid".to_string()] {
            let target = ResourceRef {
                id: Some(id),
                name: Some("potato".to_string()),
            };
            assert_eq!(products.resolve(&target).await.unwrap(), Some(ProductCategory::Vegetables));
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_resolve_unknown_product(pool: PgPool) {
        let products = PgProducts::new(pool);
        seed(&products, "apple", ProductCategory::Fruits).await;

        let target = ResourceRef {
            id: Some(Uuid::new_v4().to_string()),
            name: Some("durian".to_string()),
        };
        assert_eq!(products.resolve(&target).await.unwrap(), None);
        assert_eq!(products.resolve(&ResourceRef::default()).await.unwrap(), None);
    }
}
