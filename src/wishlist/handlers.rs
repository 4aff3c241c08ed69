use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::services::CurrentUser,
    dto::SuccessResponse,
    error::ApiError,
    state::AppState,
    wishlist::{
        dto::{WishlistAddRequest, WishlistResponse},
        services,
    },
};

pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/wishlist", get(get_wishlist))
        .route("/wishlist", post(add_to_wishlist))
        .route("/wishlist/:product_id", delete(remove_from_wishlist))
}

#[instrument(skip(state, user))]
async fn get_wishlist(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<WishlistResponse>, ApiError> {
    let wishlist = services::list(state.store.as_ref(), user.id).await?;
    Ok(Json(wishlist))
}

#[instrument(skip(state, user, payload))]
async fn add_to_wishlist(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<WishlistAddRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    services::add(state.store.as_ref(), user.id, payload.product_id).await?;
    Ok(Json(SuccessResponse::new(
        "Item added to wishlist successfully",
    )))
}

#[instrument(skip(state, user))]
async fn remove_from_wishlist(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
) -> Result<Json<SuccessResponse>, ApiError> {
    services::remove(state.store.as_ref(), user.id, product_id).await?;
    Ok(Json(SuccessResponse::new(
        "Item removed from wishlist successfully",
    )))
}
