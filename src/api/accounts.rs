//! Registration, confirmation, login, profile and password reset

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use validator::Validate;

use crate::auth::{hash_password, verify_password, AuthUser};
use crate::domain::aggregates::{NewUser, Registration, UserPatch, UserView};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::{check_password, Email};
use crate::error::{ApiError, ApiJson, ApiResult};
use crate::store::TokenPurpose;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub email: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetConfirmRequest {
    pub email: String,
    pub token: String,
    pub password: String,
}

fn hashed(password: &str) -> ApiResult<String> {
    hash_password(password).map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
}

pub async fn register(State(s): State<AppState>, ApiJson(r): ApiJson<Registration>) -> ApiResult<(StatusCode, Json<Value>)> {
    r.validate()?;
    let email = Email::new(&r.email)?;
    check_password(&r.password, Some(&email))?;
    let user = s
        .store
        .create_user(NewUser {
            email,
            first_name: r.first_name,
            last_name: r.last_name,
            company: r.company,
            position: r.position,
            password_hash: hashed(&r.password)?,
            user_type: r.user_type,
        })
        .await?;
    let token = s.store.issue_token(user.id, TokenPurpose::ConfirmEmail).await?;
    info!(user = user.id, user_type = %user.user_type, "user registered");
    s.dispatcher.dispatch(DomainEvent::UserRegistered { user_id: user.id, email: user.email.to_string(), token });
    Ok((StatusCode::CREATED, Json(json!({ "status": true }))))
}

pub async fn confirm(State(s): State<AppState>, ApiJson(r): ApiJson<ConfirmRequest>) -> ApiResult<Json<Value>> {
    let email = Email::new(&r.email)?;
    let mut user = s
        .store
        .redeem_token(&email, r.token.trim(), TokenPurpose::ConfirmEmail)
        .await?
        .ok_or_else(|| ApiError::validation("wrong email or token"))?;
    user.is_active = true;
    s.store.save_user(&user).await?;
    info!(user = user.id, "email confirmed");
    Ok(Json(json!({ "status": true })))
}

pub async fn login(State(s): State<AppState>, ApiJson(r): ApiJson<LoginRequest>) -> ApiResult<Json<Value>> {
    let denied = || ApiError::Unauthorized("wrong email or password".into());
    let email = Email::new(&r.email).map_err(|_| denied())?;
    let user = s.store.user_by_email(&email).await?.ok_or_else(denied)?;
    if !verify_password(&user.password_hash, &r.password) {
        warn!(user = user.id, "failed login");
        return Err(denied());
    }
    if !user.is_active {
        return Err(ApiError::Forbidden("account is not confirmed".into()));
    }
    let token = s.auth.issue(&user).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!({ "status": true, "token": token })))
}

pub async fn details(State(s): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<Json<UserView>> {
    let contacts = s.store.contacts(user.id).await?;
    Ok(Json(UserView::new(&user, contacts)))
}

pub async fn update_details(
    State(s): State<AppState>,
    AuthUser(mut user): AuthUser,
    ApiJson(patch): ApiJson<UserPatch>,
) -> ApiResult<Json<Value>> {
    patch.validate()?;
    if let Some(password) = &patch.password {
        check_password(password, Some(&user.email))?;
        user.password_hash = hashed(password)?;
    }
    user.apply(&patch);
    s.store.save_user(&user).await?;
    Ok(Json(json!({ "status": true })))
}

pub async fn password_reset(State(s): State<AppState>, ApiJson(r): ApiJson<ResetRequest>) -> ApiResult<Json<Value>> {
    let email = Email::new(&r.email)?;
    match s.store.user_by_email(&email).await? {
        Some(user) => {
            let token = s.store.issue_token(user.id, TokenPurpose::PasswordReset).await?;
            s.dispatcher.dispatch(DomainEvent::PasswordResetRequested { user_id: user.id, email: user.email.to_string(), token });
        }
        None => warn!("password reset for unknown email"),
    }
    Ok(Json(json!({ "status": true })))
}

pub async fn password_reset_confirm(
    State(s): State<AppState>,
    ApiJson(r): ApiJson<ResetConfirmRequest>,
) -> ApiResult<Json<Value>> {
    let email = Email::new(&r.email)?;
    check_password(&r.password, Some(&email))?;
    let mut user = s
        .store
        .redeem_token(&email, r.token.trim(), TokenPurpose::PasswordReset)
        .await?
        .ok_or_else(|| ApiError::validation("wrong email or token"))?;
    user.password_hash = hashed(&r.password)?;
    s.store.save_user(&user).await?;
    info!(user = user.id, "password reset");
    Ok(Json(json!({ "status": true })))
}
