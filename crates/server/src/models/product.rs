//! Product listing types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use unimarket_core::{ProductCondition, ProductId, ProductStatus, Rupiah, UserId};

use super::{ValidationError, check_length};

/// Cheapest allowed listing price.
pub const MIN_PRICE: Rupiah = Rupiah::new(1_000);
/// Most expensive allowed listing price.
pub const MAX_PRICE: Rupiah = Rupiah::new(100_000_000);
/// Maximum number of images per listing.
pub const MAX_IMAGES: usize = 8;
/// Default page size for listings.
pub const DEFAULT_PER_PAGE: i64 = 20;
/// Largest page size a client may request.
pub const MAX_PER_PAGE: i64 = 50;

/// A product row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: ProductId,
    pub seller_id: UserId,
    pub title: String,
    pub description: String,
    pub price: Rupiah,
    pub category: String,
    pub condition: ProductCondition,
    pub image_urls: Vec<String>,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A product joined with its seller's public details.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductListing {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub product: Product,
    pub seller_name: String,
}

/// A wishlisted product.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WishlistItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub listing: ProductListing,
    pub wishlisted_at: DateTime<Utc>,
}

/// Payload for creating a listing.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: Rupiah,
    pub category: String,
    pub condition: ProductCondition,
    #[serde(default)]
    pub image_urls: Vec<String>,
}

impl NewProduct {
    /// Trim and validate the payload.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` naming the first invalid field.
    pub fn validate(self) -> Result<Self, ValidationError> {
        let title = self.title.trim().to_string();
        check_length("title", &title, 3, 120)?;
        let description = self.description.trim().to_string();
        check_length("description", &description, 0, 5000)?;
        validate_price(self.price)?;
        let category = normalize_category(&self.category)?;
        let image_urls = validate_image_urls(self.image_urls)?;

        Ok(Self {
            title,
            description,
            price: self.price,
            category,
            condition: self.condition,
            image_urls,
        })
    }
}

/// Partial update of a listing. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<Rupiah>,
    pub category: Option<String>,
    pub condition: Option<ProductCondition>,
    pub image_urls: Option<Vec<String>>,
}

impl ProductPatch {
    /// Validate the fields that are present.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` naming the first invalid field, or when no
    /// field is present.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::new("no fields to update"));
        }

        let title = self
            .title
            .map(|t| {
                let t = t.trim().to_string();
                check_length("title", &t, 3, 120).map(|()| t)
            })
            .transpose()?;
        let description = self
            .description
            .map(|d| {
                let d = d.trim().to_string();
                check_length("description", &d, 0, 5000).map(|()| d)
            })
            .transpose()?;
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        let category = self
            .category
            .map(|c| normalize_category(&c))
            .transpose()?;
        let image_urls = self.image_urls.map(validate_image_urls).transpose()?;

        Ok(Self {
            title,
            description,
            price: self.price,
            category,
            condition: self.condition,
            image_urls,
        })
    }

    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.category.is_none()
            && self.condition.is_none()
            && self.image_urls.is_none()
    }
}

/// Query parameters for browsing listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub q: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<Rupiah>,
    pub max_price: Option<Rupiah>,
    pub seller_id: Option<UserId>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl ProductFilter {
    /// Page size clamped to `1..=50`.
    #[must_use]
    pub fn limit(&self) -> i64 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    /// Row offset for the requested 1-based page.
    #[must_use]
    pub fn offset(&self) -> i64 {
        let page = self.page.unwrap_or(1).max(1);
        (page - 1).saturating_mul(self.limit())
    }

    /// Search text as an `ILIKE` pattern, if any.
    #[must_use]
    pub fn search_pattern(&self) -> Option<String> {
        self.q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| {
                let escaped = q
                    .replace('\\', "\\\\")
                    .replace('%', "\\%")
                    .replace('_', "\\_");
                format!("%{escaped}%")
            })
    }

    /// Category filter, normalized like stored categories.
    #[must_use]
    pub fn category(&self) -> Option<String> {
        self.category
            .as_deref()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
    }
}

fn validate_price(price: Rupiah) -> Result<(), ValidationError> {
    if price < MIN_PRICE || price > MAX_PRICE {
        return Err(ValidationError(format!(
            "price must be between {MIN_PRICE} and {MAX_PRICE}"
        )));
    }
    Ok(())
}

fn normalize_category(category: &str) -> Result<String, ValidationError> {
    let category = category.trim().to_lowercase();
    check_length("category", &category, 1, 50)?;
    Ok(category)
}

fn validate_image_urls(urls: Vec<String>) -> Result<Vec<String>, ValidationError> {
    if urls.len() > MAX_IMAGES {
        return Err(ValidationError(format!(
            "at most {MAX_IMAGES} images are allowed"
        )));
    }

    urls.into_iter()
        .map(|raw| {
            let raw = raw.trim().to_string();
            match url::Url::parse(&raw) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(raw),
                _ => Err(ValidationError(format!("invalid image URL: {raw}"))),
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn new_product() -> NewProduct {
        NewProduct {
            title: "  Kalkulus Purcell Edisi 9 ".to_string(),
            description: "Mulus, tanpa coretan".to_string(),
            price: Rupiah::new(85_000),
            category: " Buku ".to_string(),
            condition: ProductCondition::Used,
            image_urls: vec!["https://cdn.unimarket.id/p/1.jpg".to_string()],
        }
    }

    #[test]
    fn test_new_product_normalizes() {
        let product = new_product().validate().unwrap();
        assert_eq!(product.title, "Kalkulus Purcell Edisi 9");
        assert_eq!(product.category, "buku");
    }

    #[test]
    fn test_new_product_price_bounds() {
        let mut product = new_product();
        product.price = Rupiah::new(999);
        assert!(product.validate().is_err());

        let mut product = new_product();
        product.price = Rupiah::new(100_000_001);
        assert!(product.validate().is_err());

        let mut product = new_product();
        product.price = MIN_PRICE;
        assert!(product.validate().is_ok());
    }

    #[test]
    fn test_new_product_title_length() {
        let mut product = new_product();
        product.title = "ab ".to_string();
        assert!(product.validate().is_err());

        let mut product = new_product();
        product.title = "x".repeat(121);
        assert!(product.validate().is_err());
    }

    #[test]
    fn test_new_product_images() {
        let mut product = new_product();
        product.image_urls = vec!["ftp://files.example/img.png".to_string()];
        assert!(product.validate().is_err());

        let mut product = new_product();
        product.image_urls = vec!["https://cdn.unimarket.id/x.jpg".to_string(); 9];
        assert!(product.validate().is_err());
    }

    #[test]
    fn test_patch_requires_a_field() {
        assert!(ProductPatch::default().validate().is_err());

        let patch = ProductPatch {
            price: Some(Rupiah::new(50_000)),
            ..ProductPatch::default()
        };
        assert!(patch.validate().is_ok());

        let patch = ProductPatch {
            title: Some("no".to_string()),
            ..ProductPatch::default()
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn test_filter_pagination() {
        let filter = ProductFilter::default();
        assert_eq!(filter.limit(), DEFAULT_PER_PAGE);
        assert_eq!(filter.offset(), 0);

        let filter = ProductFilter {
            page: Some(3),
            per_page: Some(500),
            ..ProductFilter::default()
        };
        assert_eq!(filter.limit(), MAX_PER_PAGE);
        assert_eq!(filter.offset(), 100);

        let filter = ProductFilter {
            page: Some(-2),
            per_page: Some(0),
            ..ProductFilter::default()
        };
        assert_eq!(filter.limit(), 1);
        assert_eq!(filter.offset(), 0);
    }

    #[test]
    fn test_filter_search_pattern_escapes_wildcards() {
        let filter = ProductFilter {
            q: Some(" 100%_ ".to_string()),
            ..ProductFilter::default()
        };
        assert_eq!(filter.search_pattern().as_deref(), Some("%100\\%\\_%"));

        let filter = ProductFilter {
            q: Some("   ".to_string()),
            ..ProductFilter::default()
        };
        assert_eq!(filter.search_pattern(), None);
    }
}
