use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::Product;

/// Query parameters for the catalog listing.
#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub category: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    /// Comma-separated lists; any match wins.
    pub colors: Option<String>,
    pub sizes: Option<String>,
    pub materials: Option<String>,
    pub on_sale: Option<bool>,
    pub featured: Option<bool>,
    pub search: Option<String>,
    #[serde(default = "default_sort")]
    pub sort_by: String,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_sort() -> String {
    "name".to_string()
}
fn default_page() -> i64 {
    1
}
fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
pub struct ProductListResponse {
    pub products: Vec<Product>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

#[derive(Debug, Deserialize)]
pub struct RecommendQuery {
    #[serde(default = "default_recommend_limit")]
    pub limit: i64,
}

fn default_recommend_limit() -> i64 {
    4
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub recommendations: Vec<Product>,
}

#[derive(Debug, Serialize)]
pub struct CategoryDto {
    pub name: String,
    pub slug: String,
    pub product_count: i64,
}

#[derive(Debug, Serialize)]
pub struct CategoriesResponse {
    pub categories: Vec<CategoryDto>,
}
