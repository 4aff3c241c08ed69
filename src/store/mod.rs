use axum::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{CartEntry, Order, Product, User, WishlistEntry};

pub mod mem;
pub mod pg;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("corrupt record: {0}")]
    Data(String),
}

/// Catalog listing filter. Empty vectors and `None` fields mean
/// "no constraint"; the list filters are any-match against the product's
/// variant arrays.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub colors: Vec<String>,
    pub sizes: Vec<String>,
    pub materials: Vec<String>,
    pub on_sale: Option<bool>,
    pub featured: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductSort {
    Name,
    PriceLow,
    PriceHigh,
    Rating,
    Newest,
}

impl ProductSort {
    /// Unknown keys fall back to the name sort.
    pub fn from_key(key: &str) -> Self {
        match key {
            "price-low" => Self::PriceLow,
            "price-high" => Self::PriceHigh,
            "rating" => Self::Rating,
            "newest" => Self::Newest,
            _ => Self::Name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

/// Persistence gateway. Constructed once by the composition root and passed
/// around as `Arc<dyn Store>`; no module-level connection handle exists.
/// Single-row operations are atomic; multi-step workflows built on top of
/// this trait are not.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    /// Flip the verification flag and clear the code + expiry in one update.
    /// Returns false when no such user exists.
    async fn mark_user_verified(&self, email: &str) -> Result<bool, StoreError>;

    async fn find_product(&self, id: Uuid) -> Result<Option<Product>, StoreError>;
    async fn list_products(
        &self,
        filter: &ProductFilter,
        sort: ProductSort,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Product>, StoreError>;
    async fn count_products(&self, filter: &ProductFilter) -> Result<i64, StoreError>;
    /// Rating-descending picks from the same category, excluding the anchor.
    async fn related_products(
        &self,
        category: &str,
        exclude: Uuid,
        limit: i64,
    ) -> Result<Vec<Product>, StoreError>;
    async fn category_counts(&self) -> Result<Vec<CategoryCount>, StoreError>;

    async fn find_cart_entry(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        selected_size: Option<&str>,
        selected_color: Option<&str>,
    ) -> Result<Option<CartEntry>, StoreError>;
    async fn insert_cart_entry(&self, entry: &CartEntry) -> Result<(), StoreError>;
    /// Returns false when the entry does not exist or belongs to another user.
    async fn set_cart_quantity(
        &self,
        id: Uuid,
        user_id: Uuid,
        quantity: i32,
    ) -> Result<bool, StoreError>;
    async fn delete_cart_entry(&self, id: Uuid, user_id: Uuid) -> Result<bool, StoreError>;
    /// Returns the number of removed entries; an empty cart yields 0.
    async fn clear_cart(&self, user_id: Uuid) -> Result<u64, StoreError>;
    /// Cart entries joined to their products, most recently added first.
    /// Entries whose product no longer exists are dropped (inner join).
    async fn cart_with_products(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(CartEntry, Product)>, StoreError>;

    async fn find_wishlist_entry(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<WishlistEntry>, StoreError>;
    async fn insert_wishlist_entry(&self, entry: &WishlistEntry) -> Result<(), StoreError>;
    async fn delete_wishlist_entry(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<bool, StoreError>;
    async fn wishlist_with_products(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(WishlistEntry, Product)>, StoreError>;

    async fn insert_order(&self, order: &Order) -> Result<(), StoreError>;
    async fn list_orders(&self, user_id: Uuid) -> Result<Vec<Order>, StoreError>;
    async fn find_order(&self, id: Uuid, user_id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Release underlying connections. Called once on shutdown.
    async fn close(&self);
}
