//! Shipping contacts of the caller

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::auth::AuthUser;
use crate::domain::aggregates::{Contact, ContactFields, ContactPatch};
use crate::domain::value_objects::parse_id_list;
use crate::error::{ApiError, ApiJson, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ContactUpdate {
    pub id: i64,
    #[serde(flatten)]
    pub patch: ContactPatch,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub items: String,
}

pub async fn list(State(s): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<Json<Vec<Contact>>> {
    Ok(Json(s.store.contacts(user.id).await?))
}

pub async fn create(
    State(s): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(fields): ApiJson<ContactFields>,
) -> ApiResult<(StatusCode, Json<Contact>)> {
    fields.validate()?;
    let contact = s.store.create_contact(user.id, fields).await?;
    Ok((StatusCode::CREATED, Json(contact)))
}

pub async fn update(
    State(s): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(r): ApiJson<ContactUpdate>,
) -> ApiResult<Json<Contact>> {
    r.patch.validate()?;
    let mut contact = s.store.contact(user.id, r.id).await?.ok_or_else(|| ApiError::not_found("contact"))?;
    contact.apply(r.patch);
    s.store.save_contact(user.id, &contact).await?;
    Ok(Json(contact))
}

pub async fn delete(
    State(s): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(r): ApiJson<DeleteRequest>,
) -> ApiResult<Json<Value>> {
    let ids = parse_id_list(&r.items);
    if ids.is_empty() {
        return Err(ApiError::validation("no contact ids given"));
    }
    let deleted = s.store.delete_contacts(user.id, &ids).await?;
    Ok(Json(json!({ "status": true, "deleted": deleted })))
}
