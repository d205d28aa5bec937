//! Product repository.

use sqlx::PgPool;

use unimarket_core::{ProductId, ProductStatus, UserId};

use super::RepositoryError;
use crate::models::{NewProduct, Product, ProductFilter, ProductListing, ProductPatch};

const PRODUCT_COLUMNS: &str = "p.id, p.seller_id, p.title, p.description, p.price, p.category, \
                               p.condition, p.image_urls, p.status, p.created_at, p.updated_at";

/// Repository for product listings.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Available products matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_available(
        &self,
        filter: &ProductFilter,
    ) -> Result<Vec<ProductListing>, RepositoryError> {
        let listings = sqlx::query_as::<_, ProductListing>(&format!(
            "SELECT {PRODUCT_COLUMNS}, u.name AS seller_name
             FROM products p
             JOIN users u ON u.id = p.seller_id
             WHERE p.status = 'available'
               AND ($1::text IS NULL OR p.title ILIKE $1 OR p.description ILIKE $1)
               AND ($2::text IS NULL OR p.category = $2)
               AND ($3::bigint IS NULL OR p.price >= $3)
               AND ($4::bigint IS NULL OR p.price <= $4)
               AND ($5::integer IS NULL OR p.seller_id = $5)
             ORDER BY p.created_at DESC, p.id DESC
             LIMIT $6 OFFSET $7"
        ))
        .bind(filter.search_pattern())
        .bind(filter.category())
        .bind(filter.min_price)
        .bind(filter.max_price)
        .bind(filter.seller_id)
        .bind(filter.limit())
        .bind(filter.offset())
        .fetch_all(self.pool)
        .await?;

        Ok(listings)
    }

    /// A product by id, in any status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(product)
    }

    /// A product with its seller's name. Archived products are hidden.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_listing(&self, id: ProductId) -> Result<Option<ProductListing>, RepositoryError> {
        let listing = sqlx::query_as::<_, ProductListing>(&format!(
            "SELECT {PRODUCT_COLUMNS}, u.name AS seller_name
             FROM products p
             JOIN users u ON u.id = p.seller_id
             WHERE p.id = $1 AND p.status <> 'archived'"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(listing)
    }

    /// All of a seller's products, including sold and archived ones.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_by_seller(&self, seller_id: UserId) -> Result<Vec<Product>, RepositoryError> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p
             WHERE p.seller_id = $1
             ORDER BY p.created_at DESC, p.id DESC"
        ))
        .bind(seller_id)
        .fetch_all(self.pool)
        .await?;

        Ok(products)
    }

    /// Insert a validated listing.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(
        &self,
        seller_id: UserId,
        product: &NewProduct,
    ) -> Result<Product, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "INSERT INTO products AS p
                 (seller_id, title, description, price, category, condition, image_urls)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(seller_id)
        .bind(&product.title)
        .bind(&product.description)
        .bind(product.price)
        .bind(&product.category)
        .bind(product.condition)
        .bind(&product.image_urls)
        .fetch_one(self.pool)
        .await?;

        Ok(product)
    }

    /// Apply a validated patch to an available product owned by `seller_id`.
    ///
    /// Returns `None` when the product is not owned by the seller or is no
    /// longer available.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn update(
        &self,
        id: ProductId,
        seller_id: UserId,
        patch: &ProductPatch,
    ) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "UPDATE products AS p SET
                 title = COALESCE($3, p.title),
                 description = COALESCE($4, p.description),
                 price = COALESCE($5, p.price),
                 category = COALESCE($6, p.category),
                 condition = COALESCE($7, p.condition),
                 image_urls = COALESCE($8, p.image_urls),
                 updated_at = now()
             WHERE p.id = $1 AND p.seller_id = $2 AND p.status = 'available'
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(seller_id)
        .bind(&patch.title)
        .bind(&patch.description)
        .bind(patch.price)
        .bind(&patch.category)
        .bind(patch.condition)
        .bind(&patch.image_urls)
        .fetch_optional(self.pool)
        .await?;

        Ok(product)
    }

    /// Archive an available product owned by `seller_id`.
    ///
    /// Returns `false` when nothing was archived.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn archive(&self, id: ProductId, seller_id: UserId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE products SET status = $3, updated_at = now()
             WHERE id = $1 AND seller_id = $2 AND status = 'available'",
        )
        .bind(id)
        .bind(seller_id)
        .bind(ProductStatus::Archived)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
