//! API error type and extractors that reject with it

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{FromRequest, FromRequestParts},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::domain::aggregates::OrderError;
use crate::domain::price_list::PriceListError;
use crate::domain::value_objects::{EmailError, PasswordError};
use crate::importer::ImportError;
use crate::store::StoreError;

#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    BadGateway(String),
    Internal(String),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self { Self::Validation(msg.into()) }
    pub fn not_found(what: &str) -> Self { Self::NotFound(format!("{what} not found")) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => {
                tracing::warn!("upstream failure: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
            ApiError::Internal(msg) => {
                tracing::error!("internal server error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };
        (status, Json(json!({ "status": false, "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ApiError::not_found(what),
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotBasket(_) | OrderError::DuplicateItem(_) | OrderError::InvalidTransition { .. } => {
                ApiError::Conflict(err.to_string())
            }
            OrderError::NoItems | OrderError::InvalidQuantity(_) | OrderError::ShopClosed(_) => {
                ApiError::Validation(err.to_string())
            }
            OrderError::UnknownState(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::NotPartner => ApiError::Forbidden(err.to_string()),
            ImportError::PriceList(_) | ImportError::InvalidUrl(_) => ApiError::Validation(err.to_string()),
            ImportError::Fetch(_) => ApiError::BadGateway(err.to_string()),
            ImportError::Store(e) => e.into(),
        }
    }
}

impl From<PriceListError> for ApiError {
    fn from(err: PriceListError) -> Self { ApiError::Validation(err.to_string()) }
}

impl From<EmailError> for ApiError {
    fn from(err: EmailError) -> Self { ApiError::Validation(err.to_string()) }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self { ApiError::Validation(err.to_string()) }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self { ApiError::Validation(err.to_string()) }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self { ApiError::Validation(rejection.body_text()) }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self { ApiError::Validation(rejection.body_text()) }
}

/// `Json` whose rejections use the API error body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `Query` whose rejections use the API error body.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

pub type ApiResult<T> = Result<T, ApiError>;
