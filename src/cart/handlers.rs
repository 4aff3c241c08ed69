use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::services::CurrentUser,
    cart::{
        dto::{AddCartItemRequest, CartView, UpdateCartItemRequest},
        services,
    },
    dto::SuccessResponse,
    error::ApiError,
    state::AppState,
};

pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(get_cart))
        .route("/cart", delete(clear_cart))
        .route("/cart/items", post(add_to_cart))
        .route("/cart/items/:id", put(update_cart_item))
        .route("/cart/items/:id", delete(remove_from_cart))
}

#[instrument(skip(state, user))]
async fn get_cart(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<CartView>, ApiError> {
    let cart = services::load_cart(state.store.as_ref(), user.id).await?;
    Ok(Json(cart))
}

#[instrument(skip(state, user, payload))]
async fn add_to_cart(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<AddCartItemRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    services::add_item(state.store.as_ref(), user.id, payload).await?;
    Ok(Json(SuccessResponse::new("Item added to cart successfully")))
}

#[instrument(skip(state, user, payload))]
async fn update_cart_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    services::update_item(state.store.as_ref(), user.id, item_id, payload.quantity).await?;
    Ok(Json(SuccessResponse::new("Cart item updated successfully")))
}

#[instrument(skip(state, user))]
async fn remove_from_cart(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(item_id): Path<Uuid>,
) -> Result<Json<SuccessResponse>, ApiError> {
    services::remove_item(state.store.as_ref(), user.id, item_id).await?;
    Ok(Json(SuccessResponse::new(
        "Item removed from cart successfully",
    )))
}

#[instrument(skip(state, user))]
async fn clear_cart(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<SuccessResponse>, ApiError> {
    let removed = services::clear(state.store.as_ref(), user.id).await?;
    Ok(Json(SuccessResponse::with_data(
        format!("Cart cleared successfully. {removed} items removed."),
        json!({ "removed": removed }),
    )))
}
