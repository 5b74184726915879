//! Partner price-list document
//!
//! The YAML layout partners upload:
//!
//! ```yaml
//! shop: Connected
//! categories:
//!   - id: 224
//!     name: Smartphones
//! goods:
//!   - id: 4216292
//!     category: 224
//!     model: apple/iphone/xs-max
//!     name: Apple iPhone XS Max 512GB
//!     price: 110000
//!     price_rrc: 116990
//!     quantity: 14
//!     parameters:
//!       "Screen (in)": 6.5
//!       Colour: gold
//! ```

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;

#[derive(Clone, Debug, Deserialize)]
pub struct PriceList {
    pub shop: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub categories: Vec<CategoryEntry>,
    #[serde(default)]
    pub goods: Vec<Goods>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CategoryEntry {
    pub id: i64,
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Goods {
    pub id: i64,
    pub category: i64,
    #[serde(default)]
    pub model: String,
    pub name: String,
    pub price: i64,
    #[serde(default)]
    pub price_rrc: Option<i64>,
    pub quantity: i64,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterValue>,
}

/// Parameter values arrive as YAML scalars; they are stored as text.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(v) => f.write_str(v),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Flag(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PriceListError {
    #[error("malformed price list: {0}")]
    Malformed(#[from] serde_yaml::Error),
    #[error("shop name must be 1 to 50 characters")]
    ShopName,
    #[error("category {0}: name must be 1 to 40 characters")]
    CategoryName(i64),
    #[error("category {0} is declared twice")]
    DuplicateCategory(i64),
    #[error("goods {0}: unknown category {1}")]
    UnknownCategory(i64, i64),
    #[error("goods {0} is listed twice")]
    DuplicateGoods(i64),
    #[error("goods {0}: {1}")]
    InvalidGoods(i64, &'static str),
    #[error("goods {0}: parameter {1:?} is invalid")]
    InvalidParameter(i64, String),
}

fn within(s: &str, min: usize, max: usize) -> bool {
    let n = s.chars().count();
    n >= min && n <= max
}

impl PriceList {
    pub fn from_yaml(text: &str) -> Result<Self, PriceListError> {
        let list: PriceList = serde_yaml::from_str(text)?;
        list.validate()?;
        Ok(list)
    }

    pub fn validate(&self) -> Result<(), PriceListError> {
        if !within(self.shop.trim(), 1, 50) { return Err(PriceListError::ShopName); }
        let mut categories = HashSet::new();
        for c in &self.categories {
            if !within(c.name.trim(), 1, 40) { return Err(PriceListError::CategoryName(c.id)); }
            if !categories.insert(c.id) { return Err(PriceListError::DuplicateCategory(c.id)); }
        }
        let mut seen = HashSet::new();
        for g in &self.goods {
            if !categories.contains(&g.category) { return Err(PriceListError::UnknownCategory(g.id, g.category)); }
            if !seen.insert(g.id) { return Err(PriceListError::DuplicateGoods(g.id)); }
            if g.id < 0 { return Err(PriceListError::InvalidGoods(g.id, "external id must not be negative")); }
            if !within(g.name.trim(), 1, 80) { return Err(PriceListError::InvalidGoods(g.id, "name must be 1 to 80 characters")); }
            if !within(&g.model, 0, 80) { return Err(PriceListError::InvalidGoods(g.id, "model must be at most 80 characters")); }
            if g.price < 0 { return Err(PriceListError::InvalidGoods(g.id, "price must not be negative")); }
            if g.quantity < 0 { return Err(PriceListError::InvalidGoods(g.id, "quantity must not be negative")); }
            for (name, value) in &g.parameters {
                if !within(name, 1, 40) || !within(&value.to_string(), 0, 100) {
                    return Err(PriceListError::InvalidParameter(g.id, name.clone()));
                }
            }
        }
        Ok(())
    }

    /// Distinct parameter names across all goods.
    pub fn parameter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.goods.iter().flat_map(|g| g.parameters.keys().map(String::as_str)).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

#[cfg(test)]
pub(crate) const SAMPLE: &str = r#"
shop: Connected
url: https://connected.example.com
categories:
  - id: 224
    name: Smartphones
  - id: 15
    name: Accessories
goods:
  - id: 4216292
    category: 224
    model: apple/iphone/xs-max
    name: Apple iPhone XS Max 512GB (gold)
    price: 110000
    price_rrc: 116990
    quantity: 14
    parameters:
      "Screen (in)": 6.5
      "Resolution (px)": 2688x1242
      "Storage (GB)": 512
      Colour: gold
  - id: 4216313
    category: 224
    model: apple/iphone/xr
    name: Apple iPhone XR 256GB (red)
    price: 65000
    price_rrc: 69990
    quantity: 9
    parameters:
      "Screen (in)": 6.1
      Colour: red
  - id: 4672670
    category: 15
    name: Headphones
    price: 1990
    quantity: 0
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sample() {
        let list = PriceList::from_yaml(SAMPLE).unwrap();
        assert_eq!(list.shop, "Connected");
        assert_eq!(list.goods.len(), 3);
        let phone = &list.goods[0];
        assert_eq!(phone.parameters["Screen (in)"].to_string(), "6.5");
        assert_eq!(phone.parameters["Storage (GB)"].to_string(), "512");
        assert_eq!(phone.parameters["Resolution (px)"].to_string(), "2688x1242");
        assert_eq!(list.goods[2].model, "");
        assert_eq!(list.goods[2].price_rrc, None);
        assert_eq!(list.parameter_names(), vec!["Colour", "Resolution (px)", "Screen (in)", "Storage (GB)"]);
    }

    #[test]
    fn test_rejects_unknown_category() {
        let text = "shop: S\ncategories:\n  - {id: 1, name: A}\ngoods:\n  - {id: 5, category: 2, name: N, price: 1, quantity: 1}\n";
        assert!(matches!(PriceList::from_yaml(text), Err(PriceListError::UnknownCategory(5, 2))));
    }

    #[test]
    fn test_rejects_duplicate_goods_and_negative_price() {
        let dup = "shop: S\ncategories:\n  - {id: 1, name: A}\ngoods:\n  - {id: 5, category: 1, name: N, price: 1, quantity: 1}\n  - {id: 5, category: 1, name: M, price: 1, quantity: 1}\n";
        assert!(matches!(PriceList::from_yaml(dup), Err(PriceListError::DuplicateGoods(5))));
        let negative = "shop: S\ncategories:\n  - {id: 1, name: A}\ngoods:\n  - {id: 5, category: 1, name: N, price: -1, quantity: 1}\n";
        assert!(matches!(PriceList::from_yaml(negative), Err(PriceListError::InvalidGoods(5, _))));
    }

    #[test]
    fn test_rejects_missing_shop_and_garbage() {
        assert!(matches!(PriceList::from_yaml("shop: ''\n"), Err(PriceListError::ShopName)));
        assert!(matches!(PriceList::from_yaml("shop: S\ngoods: nope\n"), Err(PriceListError::Malformed(_))));
    }
}
