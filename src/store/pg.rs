//! PostgreSQL [`Store`] implementation. All SQL goes through the runtime
//! `query`/`query_as` forms so the crate builds without a live database.
//! Document-shaped values (profile, addresses, order item snapshots) are
//! stored as JSONB.

use anyhow::Context;
use axum::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{
    Address, CartEntry, Order, OrderItem, OrderStatus, Product, User, UserProfile, WishlistEntry,
};
use crate::store::{CategoryCount, ProductFilter, ProductSort, Store, StoreError};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Maps a unique-index violation to [`StoreError::Conflict`]; everything else
/// stays a database error.
fn conflict_on_unique(err: sqlx::Error, what: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            StoreError::Conflict(what.to_string())
        }
        _ => StoreError::Database(err),
    }
}

fn like_escape(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

// Product columns minus `id`, shared between direct selects and the join
// queries where the id comes from the referencing row.
const PRODUCT_COLS: &str = "name, description, price, original_price, category, images, sizes, \
     colors, materials, stock_quantity, featured, on_sale, rating, reviews_count, set_size, \
     created_at, updated_at";
const PRODUCT_JOIN_COLS: &str = "p.name, p.description, p.price, p.original_price, p.category, \
     p.images, p.sizes, p.colors, p.materials, p.stock_quantity, p.featured, p.on_sale, \
     p.rating, p.reviews_count, p.set_size, p.created_at, p.updated_at";

#[derive(FromRow)]
struct ProductCols {
    name: String,
    description: String,
    price: Decimal,
    original_price: Option<Decimal>,
    category: String,
    images: Vec<String>,
    sizes: Vec<String>,
    colors: Vec<String>,
    materials: Vec<String>,
    stock_quantity: i32,
    featured: bool,
    on_sale: bool,
    rating: f64,
    reviews_count: i32,
    set_size: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl ProductCols {
    fn into_product(self, id: Uuid) -> Product {
        Product {
            id,
            name: self.name,
            description: self.description,
            price: self.price,
            original_price: self.original_price,
            category: self.category,
            images: self.images,
            sizes: self.sizes,
            colors: self.colors,
            materials: self.materials,
            stock_quantity: self.stock_quantity,
            featured: self.featured,
            on_sale: self.on_sale,
            rating: self.rating,
            reviews_count: self.reviews_count,
            set_size: self.set_size,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct ProductRow {
    id: Uuid,
    #[sqlx(flatten)]
    cols: ProductCols,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        row.cols.into_product(row.id)
    }
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    is_verified: bool,
    verification_code: Option<String>,
    verification_expires: Option<OffsetDateTime>,
    profile: Json<UserProfile>,
    addresses: Json<Vec<Address>>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            is_verified: row.is_verified,
            verification_code: row.verification_code,
            verification_expires: row.verification_expires,
            profile: row.profile.0,
            addresses: row.addresses.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct CartRow {
    id: Uuid,
    user_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    selected_size: Option<String>,
    selected_color: Option<String>,
    added_at: OffsetDateTime,
}

impl From<CartRow> for CartEntry {
    fn from(row: CartRow) -> Self {
        CartEntry {
            id: row.id,
            user_id: row.user_id,
            product_id: row.product_id,
            quantity: row.quantity,
            selected_size: row.selected_size,
            selected_color: row.selected_color,
            added_at: row.added_at,
        }
    }
}

#[derive(FromRow)]
struct CartJoinRow {
    id: Uuid,
    user_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    selected_size: Option<String>,
    selected_color: Option<String>,
    added_at: OffsetDateTime,
    #[sqlx(flatten)]
    product: ProductCols,
}

#[derive(FromRow)]
struct WishlistJoinRow {
    id: Uuid,
    user_id: Uuid,
    product_id: Uuid,
    added_at: OffsetDateTime,
    #[sqlx(flatten)]
    product: ProductCols,
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    items: Json<Vec<OrderItem>>,
    shipping_address: Json<Address>,
    billing_address: Json<Address>,
    subtotal: Decimal,
    shipping_cost: Decimal,
    tax: Decimal,
    total: Decimal,
    status: String,
    payment_method: String,
    tracking_number: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status: OrderStatus = row.status.parse().map_err(StoreError::Data)?;
        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            items: row.items.0,
            shipping_address: row.shipping_address.0,
            billing_address: row.billing_address.0,
            subtotal: row.subtotal,
            shipping_cost: row.shipping_cost,
            tax: row.tax,
            total: row.total,
            status,
            payment_method: row.payment_method,
            tracking_number: row.tracking_number,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    if let Some(category) = &filter.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(min) = filter.min_price {
        qb.push(" AND price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND price <= ").push_bind(max);
    }
    if !filter.colors.is_empty() {
        qb.push(" AND colors && ").push_bind(filter.colors.clone());
    }
    if !filter.sizes.is_empty() {
        qb.push(" AND sizes && ").push_bind(filter.sizes.clone());
    }
    if !filter.materials.is_empty() {
        qb.push(" AND materials && ").push_bind(filter.materials.clone());
    }
    if let Some(on_sale) = filter.on_sale {
        qb.push(" AND on_sale = ").push_bind(on_sale);
    }
    if let Some(featured) = filter.featured {
        qb.push(" AND featured = ").push_bind(featured);
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", like_escape(search));
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn order_by(sort: ProductSort) -> &'static str {
    match sort {
        ProductSort::Name => " ORDER BY name ASC",
        ProductSort::PriceLow => " ORDER BY price ASC",
        ProductSort::PriceHigh => " ORDER BY price DESC",
        ProductSort::Rating => " ORDER BY rating DESC",
        ProductSort::Newest => " ORDER BY created_at DESC",
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, is_verified, verification_code,
                               verification_expires, profile, addresses, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_verified)
        .bind(&user.verification_code)
        .bind(user.verification_expires)
        .bind(Json(user.profile.clone()))
        .bind(Json(user.addresses.clone()))
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "user email"))?;
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, password_hash, is_verified, verification_code,
                   verification_expires, profile, addresses, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, password_hash, is_verified, verification_code,
                   verification_expires, profile, addresses, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn mark_user_verified(&self, email: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_verified = TRUE,
                verification_code = NULL,
                verification_expires = NULL,
                updated_at = now()
            WHERE email = $1
            "#,
        )
        .bind(email)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT id, {PRODUCT_COLS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Product::from))
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        sort: ProductSort,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Product>, StoreError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT id, {PRODUCT_COLS} FROM products WHERE TRUE"
        ));
        push_filters(&mut qb, filter);
        qb.push(order_by(sort));
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(skip);
        let rows: Vec<ProductRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn count_products(&self, filter: &ProductFilter) -> Result<i64, StoreError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM products WHERE TRUE");
        push_filters(&mut qb, filter);
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn related_products(
        &self,
        category: &str,
        exclude: Uuid,
        limit: i64,
    ) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            SELECT id, {PRODUCT_COLS}
            FROM products
            WHERE category = $1 AND id <> $2
            ORDER BY rating DESC
            LIMIT $3
            "#
        ))
        .bind(category)
        .bind(exclude)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn category_counts(&self) -> Result<Vec<CategoryCount>, StoreError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT category, COUNT(*)
            FROM products
            GROUP BY category
            ORDER BY category ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(category, count)| CategoryCount { category, count })
            .collect())
    }

    async fn find_cart_entry(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        selected_size: Option<&str>,
        selected_color: Option<&str>,
    ) -> Result<Option<CartEntry>, StoreError> {
        let row = sqlx::query_as::<_, CartRow>(
            r#"
            SELECT id, user_id, product_id, quantity, selected_size, selected_color, added_at
            FROM cart_items
            WHERE user_id = $1
              AND product_id = $2
              AND selected_size IS NOT DISTINCT FROM $3
              AND selected_color IS NOT DISTINCT FROM $4
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .bind(selected_size)
        .bind(selected_color)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(CartEntry::from))
    }

    async fn insert_cart_entry(&self, entry: &CartEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO cart_items (id, user_id, product_id, quantity, selected_size,
                                    selected_color, added_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.product_id)
        .bind(entry.quantity)
        .bind(&entry.selected_size)
        .bind(&entry.selected_color)
        .bind(entry.added_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "cart entry"))?;
        Ok(())
    }

    async fn set_cart_quantity(
        &self,
        id: Uuid,
        user_id: Uuid,
        quantity: i32,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE cart_items
            SET quantity = $3
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(quantity)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_cart_entry(&self, id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_cart(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn cart_with_products(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(CartEntry, Product)>, StoreError> {
        let rows = sqlx::query_as::<_, CartJoinRow>(&format!(
            r#"
            SELECT c.id, c.user_id, c.product_id, c.quantity, c.selected_size,
                   c.selected_color, c.added_at, {PRODUCT_JOIN_COLS}
            FROM cart_items c
            JOIN products p ON p.id = c.product_id
            WHERE c.user_id = $1
            ORDER BY c.added_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let product = row.product.into_product(row.product_id);
                let entry = CartEntry {
                    id: row.id,
                    user_id: row.user_id,
                    product_id: row.product_id,
                    quantity: row.quantity,
                    selected_size: row.selected_size,
                    selected_color: row.selected_color,
                    added_at: row.added_at,
                };
                (entry, product)
            })
            .collect())
    }

    async fn find_wishlist_entry(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<WishlistEntry>, StoreError> {
        let row = sqlx::query_as::<_, (Uuid, OffsetDateTime)>(
            r#"
            SELECT id, added_at
            FROM wishlist_items
            WHERE user_id = $1 AND product_id = $2
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, added_at)| WishlistEntry {
            id,
            user_id,
            product_id,
            added_at,
        }))
    }

    async fn insert_wishlist_entry(&self, entry: &WishlistEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO wishlist_items (id, user_id, product_id, added_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.product_id)
        .bind(entry.added_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "wishlist entry"))?;
        Ok(())
    }

    async fn delete_wishlist_entry(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<bool, StoreError> {
        let result =
            sqlx::query("DELETE FROM wishlist_items WHERE user_id = $1 AND product_id = $2")
                .bind(user_id)
                .bind(product_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn wishlist_with_products(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(WishlistEntry, Product)>, StoreError> {
        let rows = sqlx::query_as::<_, WishlistJoinRow>(&format!(
            r#"
            SELECT w.id, w.user_id, w.product_id, w.added_at, {PRODUCT_JOIN_COLS}
            FROM wishlist_items w
            JOIN products p ON p.id = w.product_id
            WHERE w.user_id = $1
            ORDER BY w.added_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let product = row.product.into_product(row.product_id);
                let entry = WishlistEntry {
                    id: row.id,
                    user_id: row.user_id,
                    product_id: row.product_id,
                    added_at: row.added_at,
                };
                (entry, product)
            })
            .collect())
    }

    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, items, shipping_address, billing_address,
                                subtotal, shipping_cost, tax, total, status, payment_method,
                                tracking_number, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(Json(order.items.clone()))
        .bind(Json(order.shipping_address.clone()))
        .bind(Json(order.billing_address.clone()))
        .bind(order.subtotal)
        .bind(order.shipping_cost)
        .bind(order.tax)
        .bind(order.total)
        .bind(order.status.as_str())
        .bind(&order.payment_method)
        .bind(&order.tracking_number)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_orders(&self, user_id: Uuid) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, user_id, items, shipping_address, billing_address, subtotal,
                   shipping_cost, tax, total, status, payment_method, tracking_number,
                   created_at, updated_at
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn find_order(&self, id: Uuid, user_id: Uuid) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, user_id, items, shipping_address, billing_address, subtotal,
                   shipping_cost, tax, total, status, payment_method, tracking_number,
                   created_at, updated_at
            FROM orders
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Order::try_from).transpose()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_escape_neutralizes_wildcards() {
        assert_eq!(like_escape("100%_wool"), "100\\%\\_wool");
        assert_eq!(like_escape("plain"), "plain");
    }
}
