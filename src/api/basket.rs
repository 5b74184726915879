//! Basket endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::domain::aggregates::OrderView;
use crate::engine::{self, AddItem, QuantityUpdate};
use crate::error::{ApiJson, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct Items<T> {
    pub items: T,
}

/// The caller's basket as a list of zero or one orders.
pub async fn get(State(s): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<Json<Vec<OrderView>>> {
    Ok(Json(engine::basket(s.store.as_ref(), &user).await?.into_iter().collect()))
}

pub async fn add(
    State(s): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(r): ApiJson<Items<Vec<AddItem>>>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let created = engine::add_items(s.store.as_ref(), &user, &r.items).await?;
    Ok((StatusCode::CREATED, Json(json!({ "status": true, "created": created }))))
}

pub async fn update(
    State(s): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(r): ApiJson<Items<Vec<QuantityUpdate>>>,
) -> ApiResult<Json<Value>> {
    let updated = engine::update_items(s.store.as_ref(), &user, &r.items).await?;
    Ok(Json(json!({ "status": true, "updated": updated })))
}

pub async fn remove(
    State(s): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(r): ApiJson<Items<String>>,
) -> ApiResult<Json<Value>> {
    let deleted = engine::remove_items(s.store.as_ref(), &user, &r.items).await?;
    Ok(Json(json!({ "status": true, "deleted": deleted })))
}
