use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Address, Order};

/// Request body for checkout. The payment method is recorded, never charged.
#[derive(Debug, Deserialize)]
pub struct OrderCreateRequest {
    pub shipping_address: Address,
    /// Defaults to the shipping address when absent.
    pub billing_address: Option<Address>,
    pub payment_method: String,
}

#[derive(Debug, PartialEq)]
pub struct PlacedOrder {
    pub order_id: Uuid,
    pub total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct OrdersResponse {
    pub orders: Vec<Order>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order: Order,
}
