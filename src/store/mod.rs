//! Persistence boundary.
//!
//! [`Store`] is implemented by [`PgStore`] (PostgreSQL through sqlx) and by
//! [`MemoryStore`], which keeps the same constraints in process memory.
//! Catalog imports go through a [`CatalogTx`] so that a price list is applied
//! all-or-nothing.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::aggregates::{
    Category, Contact, ContactFields, NewItem, NewUser, Offer, Order, OrderView, ProductFilter, ProductInfoView, Shop, User,
};
use crate::domain::value_objects::Email;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenPurpose {
    ConfirmEmail,
    PasswordReset,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self { Self::ConfirmEmail => "confirm_email", Self::PasswordReset => "password_reset" }
    }
}

pub(crate) fn new_token_key() -> String { uuid::Uuid::new_v4().simple().to_string() }

/// ProductInfo columns written by the importer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProductInfoRow {
    pub shop_id: i64,
    pub product_id: i64,
    pub external_id: i64,
    pub model: String,
    pub price: i64,
    pub price_rrc: Option<i64>,
    pub quantity: i64,
}

#[async_trait]
pub trait Store: Send + Sync {
    // ---- accounts ----
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn user(&self, id: i64) -> StoreResult<Option<User>>;
    async fn user_by_email(&self, email: &Email) -> StoreResult<Option<User>>;
    async fn save_user(&self, user: &User) -> StoreResult<()>;
    /// Returns the live token for (user, purpose), creating one if needed.
    async fn issue_token(&self, user_id: i64, purpose: TokenPurpose) -> StoreResult<String>;
    /// Deletes the matching token and returns its owner.
    async fn redeem_token(&self, email: &Email, key: &str, purpose: TokenPurpose) -> StoreResult<Option<User>>;

    // ---- contacts ----
    async fn contacts(&self, user_id: i64) -> StoreResult<Vec<Contact>>;
    async fn contact(&self, user_id: i64, id: i64) -> StoreResult<Option<Contact>>;
    async fn create_contact(&self, user_id: i64, fields: ContactFields) -> StoreResult<Contact>;
    async fn save_contact(&self, user_id: i64, contact: &Contact) -> StoreResult<()>;
    async fn delete_contacts(&self, user_id: i64, ids: &[i64]) -> StoreResult<u64>;

    // ---- catalog ----
    async fn categories(&self) -> StoreResult<Vec<Category>>;
    async fn category(&self, id: i64) -> StoreResult<Option<Category>>;
    /// Shops accepting orders.
    async fn shops(&self) -> StoreResult<Vec<Shop>>;
    async fn shop(&self, id: i64) -> StoreResult<Option<Shop>>;
    async fn shop_of(&self, user_id: i64) -> StoreResult<Option<Shop>>;
    async fn set_shop_state(&self, user_id: i64, state: bool) -> StoreResult<Option<Shop>>;
    async fn product_infos(&self, filter: ProductFilter) -> StoreResult<Vec<ProductInfoView>>;
    async fn product_info(&self, id: i64) -> StoreResult<Option<ProductInfoView>>;
    async fn begin_import(&self) -> StoreResult<Box<dyn CatalogTx>>;

    // ---- baskets and orders ----
    /// The user's basket, created on first use.
    async fn basket(&self, user_id: i64) -> StoreResult<Order>;
    async fn basket_view(&self, user_id: i64) -> StoreResult<Option<OrderView>>;
    async fn order(&self, user_id: i64, order_id: i64) -> StoreResult<Option<Order>>;
    async fn offers(&self, product_info_ids: &[i64]) -> StoreResult<Vec<Offer>>;
    /// Inserts all items or none.
    async fn insert_items(&self, order_id: i64, items: &[NewItem]) -> StoreResult<usize>;
    async fn update_quantities(&self, order_id: i64, items: &[(i64, i64)]) -> StoreResult<u64>;
    async fn delete_items(&self, order_id: i64, ids: &[i64]) -> StoreResult<u64>;
    /// Writes the placed order if it is still a basket. Returns `false` otherwise.
    async fn place_order(&self, order: &Order) -> StoreResult<bool>;
    /// Orders other than the basket, newest first.
    async fn orders(&self, user_id: i64) -> StoreResult<Vec<OrderView>>;
    /// Orders holding items of the partner's shop, restricted to those items.
    async fn partner_orders(&self, user_id: i64) -> StoreResult<Vec<OrderView>>;
}

/// Catalog writes of one price-list import. Dropping without `commit` discards them.
#[async_trait]
pub trait CatalogTx: Send {
    async fn upsert_shop(&mut self, user_id: i64, name: &str, url: Option<&str>) -> StoreResult<Shop>;
    async fn upsert_category(&mut self, id: i64, name: &str) -> StoreResult<()>;
    async fn link_category(&mut self, category_id: i64, shop_id: i64) -> StoreResult<()>;
    async fn product_id(&mut self, name: &str, category_id: i64) -> StoreResult<i64>;
    async fn parameter_id(&mut self, name: &str) -> StoreResult<i64>;
    /// Updates the row matching (product, shop, external id) or inserts a new one.
    async fn upsert_product_info(&mut self, row: &ProductInfoRow) -> StoreResult<i64>;
    async fn replace_parameters(&mut self, product_info_id: i64, values: &[(i64, String)]) -> StoreResult<()>;
    /// Deletes the shop's ProductInfo rows not listed in `keep`.
    async fn remove_stale_product_infos(&mut self, shop_id: i64, keep: &[i64]) -> StoreResult<u64>;
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
