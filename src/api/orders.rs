//! Placed orders of the caller

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::domain::aggregates::OrderView;
use crate::engine;
use crate::error::{ApiJson, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PlaceRequest {
    pub id: i64,
    pub contact: i64,
}

pub async fn list(State(s): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<Json<Vec<OrderView>>> {
    Ok(Json(engine::orders(s.store.as_ref(), &user).await?))
}

pub async fn place(
    State(s): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(r): ApiJson<PlaceRequest>,
) -> ApiResult<Json<Value>> {
    let order = engine::place_order(s.store.as_ref(), &s.dispatcher, &user, r.id, r.contact).await?;
    Ok(Json(json!({ "status": true, "id": order.id(), "state": order.state() })))
}
