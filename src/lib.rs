//! Orders backend
//!
//! Order-management service for a marketplace of partner shops.
//!
//! ## Features
//! - Partner price-list import (YAML) into the shared catalog
//! - Catalog browsing by shop and category
//! - One basket per buyer, placed as an order with a shipping contact
//! - Incoming orders per partner shop
//! - Accounts with e-mail confirmation and password reset

use std::sync::Arc;

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod importer;
pub mod notify;
pub mod store;

use auth::AuthConfig;
use config::AppConfig;
use importer::PriceListFetcher;
use notify::Dispatcher;
use store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub dispatcher: Dispatcher,
    pub auth: AuthConfig,
    pub fetcher: PriceListFetcher,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, dispatcher: Dispatcher, config: &AppConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            store,
            dispatcher,
            auth: AuthConfig::new(&config.jwt_secret, config.token_ttl),
            fetcher: PriceListFetcher::new(config.price_list_timeout)?,
        })
    }
}

pub fn build_app(state: AppState) -> axum::Router { api::router(state) }
