//! Read-only catalog projections

use axum::{
    extract::{Path, State},
    Json,
};

use crate::domain::aggregates::{Category, ProductFilter, ProductInfoView, Shop};
use crate::error::{ApiError, ApiQuery, ApiResult};
use crate::AppState;

pub async fn categories(State(s): State<AppState>) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(s.store.categories().await?))
}

pub async fn category(State(s): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Category>> {
    s.store.category(id).await?.map(Json).ok_or_else(|| ApiError::not_found("category"))
}

pub async fn shops(State(s): State<AppState>) -> ApiResult<Json<Vec<Shop>>> {
    Ok(Json(s.store.shops().await?))
}

pub async fn shop(State(s): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Shop>> {
    s.store.shop(id).await?.map(Json).ok_or_else(|| ApiError::not_found("shop"))
}

pub async fn products(State(s): State<AppState>, ApiQuery(filter): ApiQuery<ProductFilter>) -> ApiResult<Json<Vec<ProductInfoView>>> {
    Ok(Json(s.store.product_infos(filter).await?))
}

pub async fn product(State(s): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<ProductInfoView>> {
    s.store.product_info(id).await?.map(Json).ok_or_else(|| ApiError::not_found("product"))
}
