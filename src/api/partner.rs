//! Partner endpoints: price-list upload, shop state, incoming orders

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::Partner;
use crate::domain::aggregates::{OrderView, Shop};
use crate::domain::price_list::PriceList;
use crate::domain::value_objects::parse_switch;
use crate::engine;
use crate::error::{ApiError, ApiJson, ApiResult};
use crate::importer::{import_price_list, ImportSummary};
use crate::AppState;

/// Either a URL to download the price list from or the YAML itself.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRequest {
    pub url: Option<String>,
    pub document: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Switch {
    Flag(bool),
    Text(String),
}

#[derive(Debug, Deserialize)]
pub struct StateRequest {
    pub state: Switch,
}

pub async fn update(
    State(s): State<AppState>,
    Partner(partner): Partner,
    ApiJson(r): ApiJson<UpdateRequest>,
) -> ApiResult<Json<ImportSummary>> {
    let text = match (r.url.as_deref(), r.document) {
        (Some(url), _) => s.fetcher.fetch(url).await?,
        (None, Some(document)) => document,
        (None, None) => return Err(ApiError::validation("url or document is required")),
    };
    let list = PriceList::from_yaml(&text)?;
    let summary = import_price_list(s.store.as_ref(), &partner, &list).await?;
    Ok(Json(summary))
}

pub async fn state(State(s): State<AppState>, Partner(partner): Partner) -> ApiResult<Json<Shop>> {
    let shop = s.store.shop_of(partner.id).await?.ok_or_else(|| ApiError::not_found("shop"))?;
    Ok(Json(shop))
}

pub async fn set_state(
    State(s): State<AppState>,
    Partner(partner): Partner,
    ApiJson(r): ApiJson<StateRequest>,
) -> ApiResult<Json<Value>> {
    let state = match r.state {
        Switch::Flag(v) => v,
        Switch::Text(raw) => parse_switch(&raw).ok_or_else(|| ApiError::validation(format!("invalid state {raw:?}")))?,
    };
    let shop = s.store.set_shop_state(partner.id, state).await?.ok_or_else(|| ApiError::not_found("shop"))?;
    tracing::info!(shop = shop.id, state, "shop state changed");
    Ok(Json(json!({ "status": true, "state": shop.state })))
}

pub async fn orders(State(s): State<AppState>, Partner(partner): Partner) -> ApiResult<Json<Vec<OrderView>>> {
    Ok(Json(engine::partner_orders(s.store.as_ref(), &partner).await?))
}
