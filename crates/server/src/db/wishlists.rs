//! Wishlist repository.

use sqlx::PgPool;

use unimarket_core::{ProductId, UserId};

use super::RepositoryError;
use crate::models::WishlistItem;

/// Repository for saved products.
pub struct WishlistRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> WishlistRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// The user's wishlisted products (not archived), most recently saved first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<WishlistItem>, RepositoryError> {
        let items = sqlx::query_as::<_, WishlistItem>(
            "SELECT p.id, p.seller_id, p.title, p.description, p.price, p.category,
                    p.condition, p.image_urls, p.status, p.created_at, p.updated_at,
                    u.name AS seller_name, w.created_at AS wishlisted_at
             FROM wishlists w
             JOIN products p ON p.id = w.product_id
             JOIN users u ON u.id = p.seller_id
             WHERE w.user_id = $1 AND p.status <> 'archived'
             ORDER BY w.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(items)
    }

    /// Save a product. Saving it twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn add(&self, user_id: UserId, product_id: ProductId) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO wishlists (user_id, product_id) VALUES ($1, $2)
             ON CONFLICT (user_id, product_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(product_id)
        .execute(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "already wishlisted"))?;

        Ok(())
    }

    /// Remove a saved product. Removing a product that was not saved is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn remove(&self, user_id: UserId, product_id: ProductId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM wishlists WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(self.pool)
            .await?;

        Ok(())
    }
}
