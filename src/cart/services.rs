use rust_decimal::Decimal;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::cart::dto::{AddCartItemRequest, CartLine, CartView};
use crate::error::ApiError;
use crate::models::CartEntry;
use crate::store::Store;

/// Read-side join of the user's cart against the catalog, newest first.
/// An entry whose product has been removed from the catalog is dropped from
/// the view instead of failing the whole read.
pub async fn load_cart(store: &dyn Store, user_id: Uuid) -> Result<CartView, ApiError> {
    let rows = store.cart_with_products(user_id).await?;

    let mut items = Vec::with_capacity(rows.len());
    let mut total_items: i64 = 0;
    let mut subtotal = Decimal::ZERO;
    for (entry, product) in rows {
        let line_subtotal = product.price * Decimal::from(entry.quantity);
        total_items += i64::from(entry.quantity);
        subtotal += line_subtotal;
        items.push(CartLine {
            id: entry.id,
            product_id: product.id,
            name: product.name.clone(),
            price: product.price,
            image: product.primary_image(),
            quantity: entry.quantity,
            selected_size: entry.selected_size,
            selected_color: entry.selected_color,
            subtotal: line_subtotal,
        });
    }

    Ok(CartView {
        items,
        total_items,
        subtotal,
    })
}

/// Adding the same (product, size, color) again accumulates into the
/// existing row instead of duplicating it.
pub async fn add_item(
    store: &dyn Store,
    user_id: Uuid,
    req: AddCartItemRequest,
) -> Result<(), ApiError> {
    if req.quantity < 1 {
        return Err(ApiError::Validation("Quantity must be at least 1".into()));
    }
    store
        .find_product(req.product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product not found".into()))?;

    let existing = store
        .find_cart_entry(
            user_id,
            req.product_id,
            req.selected_size.as_deref(),
            req.selected_color.as_deref(),
        )
        .await?;

    match existing {
        Some(entry) => {
            store
                .set_cart_quantity(entry.id, user_id, entry.quantity + req.quantity)
                .await?;
        }
        None => {
            let entry = CartEntry {
                id: Uuid::new_v4(),
                user_id,
                product_id: req.product_id,
                quantity: req.quantity,
                selected_size: req.selected_size,
                selected_color: req.selected_color,
                added_at: OffsetDateTime::now_utc(),
            };
            store.insert_cart_entry(&entry).await?;
        }
    }
    Ok(())
}

pub async fn update_item(
    store: &dyn Store,
    user_id: Uuid,
    item_id: Uuid,
    quantity: i32,
) -> Result<(), ApiError> {
    if quantity < 1 {
        return Err(ApiError::Validation("Quantity must be at least 1".into()));
    }
    if !store.set_cart_quantity(item_id, user_id, quantity).await? {
        return Err(ApiError::NotFound("Cart item not found".into()));
    }
    Ok(())
}

pub async fn remove_item(store: &dyn Store, user_id: Uuid, item_id: Uuid) -> Result<(), ApiError> {
    if !store.delete_cart_entry(item_id, user_id).await? {
        return Err(ApiError::NotFound("Cart item not found".into()));
    }
    Ok(())
}

/// Deleting from an already-empty cart succeeds with count 0.
pub async fn clear(store: &dyn Store, user_id: Uuid) -> Result<u64, ApiError> {
    Ok(store.clear_cart(user_id).await?)
}
