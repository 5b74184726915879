//! Catalog entities as exposed by the read API

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Shop {
    pub id: i64,
    pub name: String,
    pub url: Option<String>,
    #[serde(skip_serializing)]
    pub user_id: Option<i64>,
    /// Whether the shop accepts orders.
    pub state: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProductView {
    pub name: String,
    pub category: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProductParameterView {
    pub parameter: String,
    pub value: String,
}

/// A shop-specific listing of a product.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProductInfoView {
    pub id: i64,
    pub model: String,
    pub product: ProductView,
    pub shop: i64,
    pub quantity: i64,
    pub price: i64,
    pub price_rrc: Option<i64>,
    pub product_parameters: Vec<ProductParameterView>,
}

/// Filter for the product listing. Only shops accepting orders are listed.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct ProductFilter {
    pub shop_id: Option<i64>,
    pub category_id: Option<i64>,
}
