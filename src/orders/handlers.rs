use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::services::CurrentUser,
    dto::SuccessResponse,
    error::ApiError,
    orders::{
        dto::{OrderCreateRequest, OrderResponse, OrdersResponse},
        services,
    },
    state::AppState,
};

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order))
}

#[instrument(skip(state, user, payload))]
async fn create_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<OrderCreateRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let placed = services::place_order(state.store.as_ref(), &state.mailer, &user, payload).await?;
    Ok(Json(SuccessResponse::with_data(
        "Order placed successfully!",
        json!({ "order_id": placed.order_id, "total": placed.total }),
    )))
}

#[instrument(skip(state, user))]
async fn list_orders(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<OrdersResponse>, ApiError> {
    let orders = services::list_orders(state.store.as_ref(), user.id).await?;
    Ok(Json(OrdersResponse { orders }))
}

#[instrument(skip(state, user))]
async fn get_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = services::get_order(state.store.as_ref(), user.id, id).await?;
    Ok(Json(OrderResponse { order }))
}
