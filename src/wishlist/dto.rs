use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::Product;

#[derive(Debug, Deserialize)]
pub struct WishlistAddRequest {
    pub product_id: Uuid,
}

/// Product snapshot shown in the wishlist view.
#[derive(Debug, Serialize)]
pub struct WishlistProduct {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub original_price: Option<Decimal>,
    pub image: String,
    pub on_sale: bool,
    pub rating: f64,
    pub category: String,
}

impl From<Product> for WishlistProduct {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            name: product.name.clone(),
            price: product.price,
            original_price: product.original_price,
            image: product.primary_image(),
            on_sale: product.on_sale,
            rating: product.rating,
            category: product.category,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WishlistLine {
    pub id: Uuid,
    pub product: WishlistProduct,
    #[serde(with = "time::serde::rfc3339")]
    pub added_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct WishlistResponse {
    pub wishlist: Vec<WishlistLine>,
    pub total: usize,
}
