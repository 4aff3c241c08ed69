use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::WishlistEntry;
use crate::store::Store;
use crate::wishlist::dto::{WishlistLine, WishlistResponse};

/// Joined wishlist view, newest first; entries without a product are dropped.
pub async fn list(store: &dyn Store, user_id: Uuid) -> Result<WishlistResponse, ApiError> {
    let rows = store.wishlist_with_products(user_id).await?;
    let wishlist: Vec<WishlistLine> = rows
        .into_iter()
        .map(|(entry, product)| WishlistLine {
            id: entry.id,
            product: product.into(),
            added_at: entry.added_at,
        })
        .collect();
    let total = wishlist.len();
    Ok(WishlistResponse { wishlist, total })
}

pub async fn add(store: &dyn Store, user_id: Uuid, product_id: Uuid) -> Result<(), ApiError> {
    store
        .find_product(product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product not found".into()))?;

    if store
        .find_wishlist_entry(user_id, product_id)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict("Item already in wishlist".into()));
    }

    let entry = WishlistEntry {
        id: Uuid::new_v4(),
        user_id,
        product_id,
        added_at: OffsetDateTime::now_utc(),
    };
    store.insert_wishlist_entry(&entry).await?;
    Ok(())
}

pub async fn remove(store: &dyn Store, user_id: Uuid, product_id: Uuid) -> Result<(), ApiError> {
    if !store.delete_wishlist_entry(user_id, product_id).await? {
        return Err(ApiError::NotFound("Item not found in wishlist".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::Product;
    use crate::store::mem::MemStore;

    fn product(name: &str, price: i64) -> Product {
        let now = OffsetDateTime::now_utc();
        Product {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            price: Decimal::new(price, 2),
            original_price: Some(Decimal::new(price + 50_00, 2)),
            category: "crockery".into(),
            images: vec![],
            sizes: vec![],
            colors: vec![],
            materials: vec![],
            stock_quantity: 5,
            featured: false,
            on_sale: true,
            rating: 4.9,
            reviews_count: 10,
            set_size: Some("Set of 4".into()),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn duplicate_add_is_a_conflict() {
        let store = MemStore::new();
        let user_id = Uuid::new_v4();
        let tea_set = product("Tea Set", 245_00);
        let tea_set_id = tea_set.id;
        store.add_product(tea_set).await;

        add(&store, user_id, tea_set_id).await.unwrap();
        let err = add(&store, user_id, tea_set_id).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        let listed = list(&store, user_id).await.unwrap();
        assert_eq!(listed.total, 1);
        assert_eq!(listed.wishlist[0].product.id, tea_set_id);
    }

    #[tokio::test]
    async fn add_unknown_product_is_not_found() {
        let store = MemStore::new();
        let err = add(&store, Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn remove_round_trip() {
        let store = MemStore::new();
        let user_id = Uuid::new_v4();
        let tray = product("Tray", 185_00);
        let tray_id = tray.id;
        store.add_product(tray).await;

        add(&store, user_id, tray_id).await.unwrap();
        remove(&store, user_id, tray_id).await.unwrap();
        assert_eq!(list(&store, user_id).await.unwrap().total, 0);

        let err = remove(&store, user_id, tray_id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
