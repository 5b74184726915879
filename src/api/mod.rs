//! HTTP routes under `/api/v1`

use axum::{
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

pub mod accounts;
pub mod basket;
pub mod catalog;
pub mod contacts;
pub mod orders;
pub mod partner;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/partner/update", post(partner::update))
        .route("/partner/state", get(partner::state).post(partner::set_state))
        .route("/partner/orders", get(partner::orders))
        .route("/user/register", post(accounts::register))
        .route("/user/register/confirm", post(accounts::confirm))
        .route("/user/login", post(accounts::login))
        .route("/user/details", get(accounts::details).post(accounts::update_details))
        .route("/user/password_reset", post(accounts::password_reset))
        .route("/user/password_reset/confirm", post(accounts::password_reset_confirm))
        .route(
            "/user/contact",
            get(contacts::list).post(contacts::create).put(contacts::update).delete(contacts::delete),
        )
        .route("/categories", get(catalog::categories))
        .route("/categories/:id", get(catalog::category))
        .route("/shops", get(catalog::shops))
        .route("/shops/:id", get(catalog::shop))
        .route("/products", get(catalog::products))
        .route("/products/:id", get(catalog::product))
        .route("/basket", get(basket::get).post(basket::add).put(basket::update).delete(basket::remove))
        .route("/order", get(orders::list).post(orders::place));

    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "orders-backend"})) }))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
