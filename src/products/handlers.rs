use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::Product,
    products::dto::{
        CategoriesResponse, CategoryDto, ProductListResponse, ProductQuery, RecommendQuery,
        RecommendationsResponse,
    },
    state::AppState,
    store::{ProductFilter, ProductSort},
};

pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/:id", get(get_product))
        .route("/products/:id/recommendations", get(get_recommendations))
        .route("/categories", get(get_categories))
}

fn split_list(raw: &Option<String>) -> Vec<String> {
    raw.as_deref()
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn build_filter(query: &ProductQuery) -> ProductFilter {
    ProductFilter {
        category: query.category.clone(),
        min_price: query.min_price,
        max_price: query.max_price,
        colors: split_list(&query.colors),
        sizes: split_list(&query.sizes),
        materials: split_list(&query.materials),
        on_sale: query.on_sale,
        featured: query.featured,
        search: query.search.clone(),
    }
}

fn total_pages(total: i64, limit: i64) -> i64 {
    (total + limit - 1) / limit
}

/// `.title()` equivalent: first letter of each word upper-cased.
fn title_case(slug: &str) -> String {
    slug.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[instrument(skip(state))]
async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ProductListResponse>, ApiError> {
    if query.page < 1 {
        return Err(ApiError::Validation("page must be >= 1".into()));
    }
    if !(1..=100).contains(&query.limit) {
        return Err(ApiError::Validation("limit must be between 1 and 100".into()));
    }

    let filter = build_filter(&query);
    let sort = ProductSort::from_key(&query.sort_by);
    let skip = (query.page - 1) * query.limit;

    let products = state
        .store
        .list_products(&filter, sort, skip, query.limit)
        .await?;
    let total = state.store.count_products(&filter).await?;

    Ok(Json(ProductListResponse {
        products,
        total,
        page: query.page,
        limit: query.limit,
        total_pages: total_pages(total, query.limit),
    }))
}

#[instrument(skip(state))]
async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Product>, ApiError> {
    let product = state
        .store
        .find_product(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product not found".into()))?;
    Ok(Json(product))
}

#[instrument(skip(state))]
async fn get_recommendations(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RecommendQuery>,
) -> Result<Json<RecommendationsResponse>, ApiError> {
    let anchor = state
        .store
        .find_product(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product not found".into()))?;

    let recommendations = state
        .store
        .related_products(&anchor.category, anchor.id, query.limit)
        .await?;
    Ok(Json(RecommendationsResponse { recommendations }))
}

#[instrument(skip(state))]
async fn get_categories(
    State(state): State<AppState>,
) -> Result<Json<CategoriesResponse>, ApiError> {
    let categories = state
        .store
        .category_counts()
        .await?
        .into_iter()
        .map(|c| CategoryDto {
            name: title_case(&c.category),
            slug: c.category,
            product_count: c.count,
        })
        .collect();
    Ok(Json(CategoriesResponse { categories }))
}
