//! In-memory [`Store`] used by the test suite. Mirrors the uniqueness rules
//! the SQL schema enforces so service-level tests see the same conflicts.

use std::cmp::Ordering;
use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use axum::async_trait;

use crate::models::{CartEntry, Order, Product, User, WishlistEntry};
use crate::store::{CategoryCount, ProductFilter, ProductSort, Store, StoreError};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    products: HashMap<Uuid, Product>,
    cart: HashMap<Uuid, CartEntry>,
    wishlist: HashMap<Uuid, WishlistEntry>,
    orders: HashMap<Uuid, Order>,
}

#[derive(Default)]
pub struct MemStore {
    inner: RwLock<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a catalog entry. Catalog writes are out of scope for the service
    /// itself, so this lives outside the `Store` trait.
    pub async fn add_product(&self, product: Product) {
        self.inner.write().await.products.insert(product.id, product);
    }

    /// Drop a catalog entry, simulating out-of-band catalog management.
    pub async fn remove_product(&self, id: Uuid) {
        self.inner.write().await.products.remove(&id);
    }
}

fn matches(product: &Product, filter: &ProductFilter) -> bool {
    if let Some(category) = &filter.category {
        if &product.category != category {
            return false;
        }
    }
    if let Some(min) = filter.min_price {
        if product.price < min {
            return false;
        }
    }
    if let Some(max) = filter.max_price {
        if product.price > max {
            return false;
        }
    }
    if !filter.colors.is_empty() && !filter.colors.iter().any(|c| product.colors.contains(c)) {
        return false;
    }
    if !filter.sizes.is_empty() && !filter.sizes.iter().any(|s| product.sizes.contains(s)) {
        return false;
    }
    if !filter.materials.is_empty()
        && !filter.materials.iter().any(|m| product.materials.contains(m))
    {
        return false;
    }
    if let Some(on_sale) = filter.on_sale {
        if product.on_sale != on_sale {
            return false;
        }
    }
    if let Some(featured) = filter.featured {
        if product.featured != featured {
            return false;
        }
    }
    if let Some(search) = &filter.search {
        let needle = search.to_lowercase();
        if !product.name.to_lowercase().contains(&needle)
            && !product.description.to_lowercase().contains(&needle)
        {
            return false;
        }
    }
    true
}

fn sort_products(products: &mut [Product], sort: ProductSort) {
    match sort {
        ProductSort::Name => products.sort_by(|a, b| a.name.cmp(&b.name)),
        ProductSort::PriceLow => products.sort_by(|a, b| a.price.cmp(&b.price)),
        ProductSort::PriceHigh => products.sort_by(|a, b| b.price.cmp(&a.price)),
        ProductSort::Rating => products.sort_by(|a, b| {
            b.rating.partial_cmp(&a.rating).unwrap_or(Ordering::Equal)
        }),
        ProductSort::Newest => products.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
    }
}

#[async_trait]
impl Store for MemStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("user email".into()));
        }
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn mark_user_verified(&self, email: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.users.values_mut().find(|u| u.email == email) {
            Some(user) => {
                user.is_verified = true;
                user.verification_code = None;
                user.verification_expires = None;
                user.updated_at = time::OffsetDateTime::now_utc();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.inner.read().await.products.get(&id).cloned())
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        sort: ProductSort,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Product>, StoreError> {
        let inner = self.inner.read().await;
        let mut products: Vec<Product> = inner
            .products
            .values()
            .filter(|p| matches(p, filter))
            .cloned()
            .collect();
        sort_products(&mut products, sort);
        Ok(products
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_products(&self, filter: &ProductFilter) -> Result<i64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.products.values().filter(|p| matches(p, filter)).count() as i64)
    }

    async fn related_products(
        &self,
        category: &str,
        exclude: Uuid,
        limit: i64,
    ) -> Result<Vec<Product>, StoreError> {
        let inner = self.inner.read().await;
        let mut products: Vec<Product> = inner
            .products
            .values()
            .filter(|p| p.category == category && p.id != exclude)
            .cloned()
            .collect();
        sort_products(&mut products, ProductSort::Rating);
        products.truncate(limit.max(0) as usize);
        Ok(products)
    }

    async fn category_counts(&self) -> Result<Vec<CategoryCount>, StoreError> {
        let inner = self.inner.read().await;
        let mut counts: HashMap<String, i64> = HashMap::new();
        for product in inner.products.values() {
            *counts.entry(product.category.clone()).or_default() += 1;
        }
        let mut counts: Vec<CategoryCount> = counts
            .into_iter()
            .map(|(category, count)| CategoryCount { category, count })
            .collect();
        counts.sort_by(|a, b| a.category.cmp(&b.category));
        Ok(counts)
    }

    async fn find_cart_entry(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        selected_size: Option<&str>,
        selected_color: Option<&str>,
    ) -> Result<Option<CartEntry>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .cart
            .values()
            .find(|e| {
                e.user_id == user_id
                    && e.product_id == product_id
                    && e.selected_size.as_deref() == selected_size
                    && e.selected_color.as_deref() == selected_color
            })
            .cloned())
    }

    async fn insert_cart_entry(&self, entry: &CartEntry) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.cart.values().any(|e| {
            e.user_id == entry.user_id
                && e.product_id == entry.product_id
                && e.selected_size == entry.selected_size
                && e.selected_color == entry.selected_color
        }) {
            return Err(StoreError::Conflict("cart entry".into()));
        }
        inner.cart.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn set_cart_quantity(
        &self,
        id: Uuid,
        user_id: Uuid,
        quantity: i32,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.cart.get_mut(&id) {
            Some(entry) if entry.user_id == user_id => {
                entry.quantity = quantity;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_cart_entry(&self, id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.cart.get(&id) {
            Some(entry) if entry.user_id == user_id => {
                inner.cart.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn clear_cart(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.cart.len();
        inner.cart.retain(|_, e| e.user_id != user_id);
        Ok((before - inner.cart.len()) as u64)
    }

    async fn cart_with_products(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(CartEntry, Product)>, StoreError> {
        let inner = self.inner.read().await;
        let mut rows: Vec<(CartEntry, Product)> = inner
            .cart
            .values()
            .filter(|e| e.user_id == user_id)
            .filter_map(|e| {
                inner
                    .products
                    .get(&e.product_id)
                    .map(|p| (e.clone(), p.clone()))
            })
            .collect();
        rows.sort_by(|a, b| b.0.added_at.cmp(&a.0.added_at));
        Ok(rows)
    }

    async fn find_wishlist_entry(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<WishlistEntry>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .wishlist
            .values()
            .find(|e| e.user_id == user_id && e.product_id == product_id)
            .cloned())
    }

    async fn insert_wishlist_entry(&self, entry: &WishlistEntry) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner
            .wishlist
            .values()
            .any(|e| e.user_id == entry.user_id && e.product_id == entry.product_id)
        {
            return Err(StoreError::Conflict("wishlist entry".into()));
        }
        inner.wishlist.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn delete_wishlist_entry(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let id = inner
            .wishlist
            .values()
            .find(|e| e.user_id == user_id && e.product_id == product_id)
            .map(|e| e.id);
        match id {
            Some(id) => {
                inner.wishlist.remove(&id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn wishlist_with_products(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(WishlistEntry, Product)>, StoreError> {
        let inner = self.inner.read().await;
        let mut rows: Vec<(WishlistEntry, Product)> = inner
            .wishlist
            .values()
            .filter(|e| e.user_id == user_id)
            .filter_map(|e| {
                inner
                    .products
                    .get(&e.product_id)
                    .map(|p| (e.clone(), p.clone()))
            })
            .collect();
        rows.sort_by(|a, b| b.0.added_at.cmp(&a.0.added_at));
        Ok(rows)
    }

    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn list_orders(&self, user_id: Uuid) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn find_order(&self, id: Uuid, user_id: Uuid) -> Result<Option<Order>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .orders
            .get(&id)
            .filter(|o| o.user_id == user_id)
            .cloned())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use time::OffsetDateTime;

    use super::*;

    fn product(name: &str, category: &str, price: i64, rating: f64) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: name.into(),
            description: format!("{name} description"),
            price: Decimal::new(price, 2),
            original_price: None,
            category: category.into(),
            images: vec![],
            sizes: vec![],
            colors: vec!["Black".into()],
            materials: vec![],
            stock_quantity: 10,
            featured: false,
            on_sale: false,
            rating,
            reviews_count: 0,
            set_size: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn filters_and_sorts_catalog() {
        let store = MemStore::new();
        store.add_product(product("Runner", "sneakers", 380_00, 4.7)).await;
        store.add_product(product("Court", "sneakers", 295_00, 4.5)).await;
        store.add_product(product("Tray", "crockery", 185_00, 4.6)).await;

        let filter = ProductFilter {
            category: Some("sneakers".into()),
            ..Default::default()
        };
        let listed = store
            .list_products(&filter, ProductSort::PriceLow, 0, 20)
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "Court");
        assert_eq!(store.count_products(&filter).await.unwrap(), 2);

        let priced = ProductFilter {
            min_price: Some(Decimal::new(200_00, 2)),
            ..Default::default()
        };
        assert_eq!(store.count_products(&priced).await.unwrap(), 2);

        let searched = ProductFilter {
            search: Some("tray".into()),
            ..Default::default()
        };
        assert_eq!(store.count_products(&searched).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn related_products_exclude_anchor() {
        let store = MemStore::new();
        let anchor = product("Runner", "sneakers", 380_00, 4.7);
        let anchor_id = anchor.id;
        store.add_product(anchor).await;
        store.add_product(product("Court", "sneakers", 295_00, 4.5)).await;
        store.add_product(product("Elite", "sneakers", 350_00, 4.8)).await;

        let related = store
            .related_products("sneakers", anchor_id, 4)
            .await
            .unwrap();
        assert_eq!(related.len(), 2);
        assert_eq!(related[0].name, "Elite");
        assert!(related.iter().all(|p| p.id != anchor_id));
    }

    #[tokio::test]
    async fn category_counts_sorted_by_name() {
        let store = MemStore::new();
        store.add_product(product("Runner", "sneakers", 380_00, 4.7)).await;
        store.add_product(product("Tray", "crockery", 185_00, 4.6)).await;
        store.add_product(product("Cup", "crockery", 120_00, 4.8)).await;

        let counts = store.category_counts().await.unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].category, "crockery");
        assert_eq!(counts[0].count, 2);
        assert_eq!(counts[1].category, "sneakers");
        assert_eq!(counts[1].count, 1);
    }
}
