//! Order Aggregate
//!
//! A basket is an order in the `basket` state. Items are added, re-quantified
//! and removed only while the order is a basket; placing it moves it to `new`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::catalog::ProductInfoView;
use super::contact::Contact;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    #[default]
    Basket,
    New,
    Confirmed,
    Assembled,
    Sent,
    Delivered,
    Canceled,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basket => "basket",
            Self::New => "new",
            Self::Confirmed => "confirmed",
            Self::Assembled => "assembled",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Canceled => "canceled",
        }
    }

    pub fn can_transition_to(&self, next: OrderState) -> bool {
        use OrderState::*;
        matches!(
            (*self, next),
            (Basket, New)
                | (New, Confirmed)
                | (Confirmed, Assembled)
                | (Assembled, Sent)
                | (Sent, Delivered)
                | (New | Confirmed | Assembled, Canceled)
        )
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderState {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "basket" => Self::Basket,
            "new" => Self::New,
            "confirmed" => Self::Confirmed,
            "assembled" => Self::Assembled,
            "sent" => Self::Sent,
            "delivered" => Self::Delivered,
            "canceled" => Self::Canceled,
            other => return Err(OrderError::UnknownState(other.to_string())),
        })
    }
}

/// Largest quantity a single basket line may carry.
pub const MAX_QUANTITY: i64 = 10_000;

/// `quantity * price` summed without wrapping; an overflowing sum stays at `i64::MAX`.
pub fn line_sum(lines: impl IntoIterator<Item = (i64, i64)>) -> i64 {
    lines.into_iter().fold(0i64, |acc, (quantity, price)| acc.saturating_add(quantity.saturating_mul(price)))
}

/// A stored order position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderLine { pub id: i64, pub product_info_id: i64, pub quantity: i64, pub price: i64 }

/// What the engine needs to know about a ProductInfo before putting it in a basket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Offer { pub product_info_id: i64, pub price: i64, pub shop_open: bool }

/// A position accepted by [`Order::add_item`] and not yet persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewItem { pub product_info_id: i64, pub quantity: i64 }

#[derive(Clone, Debug)]
pub struct Order {
    id: i64,
    user_id: i64,
    state: OrderState,
    contact_id: Option<i64>,
    dt: DateTime<Utc>,
    lines: Vec<OrderLine>,
    pending: Vec<NewItem>,
}

impl Order {
    pub fn restore(id: i64, user_id: i64, state: OrderState, contact_id: Option<i64>, dt: DateTime<Utc>, lines: Vec<OrderLine>) -> Self {
        Self { id, user_id, state, contact_id, dt, lines, pending: vec![] }
    }

    pub fn id(&self) -> i64 { self.id }
    pub fn user_id(&self) -> i64 { self.user_id }
    pub fn state(&self) -> OrderState { self.state }
    pub fn contact_id(&self) -> Option<i64> { self.contact_id }
    pub fn dt(&self) -> DateTime<Utc> { self.dt }
    pub fn lines(&self) -> &[OrderLine] { &self.lines }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() && self.pending.is_empty() }

    pub fn total(&self) -> i64 { line_sum(self.lines.iter().map(|l| (l.quantity, l.price))) }

    pub fn add_item(&mut self, offer: &Offer, quantity: i64) -> Result<(), OrderError> {
        self.ensure_basket()?;
        check_quantity(quantity)?;
        if !offer.shop_open { return Err(OrderError::ShopClosed(offer.product_info_id)); }
        let id = offer.product_info_id;
        if self.lines.iter().any(|l| l.product_info_id == id) || self.pending.iter().any(|p| p.product_info_id == id) {
            return Err(OrderError::DuplicateItem(id));
        }
        self.pending.push(NewItem { product_info_id: id, quantity });
        Ok(())
    }

    pub fn take_pending(&mut self) -> Vec<NewItem> { std::mem::take(&mut self.pending) }

    /// Returns `false` when the item is not part of this order.
    pub fn set_quantity(&mut self, item_id: i64, quantity: i64) -> Result<bool, OrderError> {
        self.ensure_basket()?;
        check_quantity(quantity)?;
        match self.lines.iter_mut().find(|l| l.id == item_id) {
            Some(line) => { line.quantity = quantity; Ok(true) }
            None => Ok(false),
        }
    }

    /// Keeps only the ids that belong to this basket.
    pub fn own_items(&self, ids: &[i64]) -> Result<Vec<i64>, OrderError> {
        self.ensure_basket()?;
        Ok(ids.iter().copied().filter(|id| self.lines.iter().any(|l| l.id == *id)).collect())
    }

    pub fn place(&mut self, contact_id: i64) -> Result<(), OrderError> {
        self.ensure_basket()?;
        if self.lines.is_empty() { return Err(OrderError::NoItems); }
        self.transition(OrderState::New)?;
        self.contact_id = Some(contact_id);
        Ok(())
    }

    pub fn transition(&mut self, next: OrderState) -> Result<(), OrderError> {
        if !self.state.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from: self.state, to: next });
        }
        self.state = next;
        Ok(())
    }

    fn ensure_basket(&self) -> Result<(), OrderError> {
        if self.state != OrderState::Basket { return Err(OrderError::NotBasket(self.state)); }
        Ok(())
    }
}

fn check_quantity(quantity: i64) -> Result<(), OrderError> {
    if !(1..=MAX_QUANTITY).contains(&quantity) { return Err(OrderError::InvalidQuantity(quantity)); }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order is {0}, not a basket")]
    NotBasket(OrderState),
    #[error("basket is empty")]
    NoItems,
    #[error("quantity must be between 1 and {MAX_QUANTITY}, got {0}")]
    InvalidQuantity(i64),
    #[error("product info {0} is already in the basket")]
    DuplicateItem(i64),
    #[error("shop of product info {0} does not accept orders")]
    ShopClosed(i64),
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderState, to: OrderState },
    #[error("unknown order state {0:?}")]
    UnknownState(String),
}

// =============================================================================
// Read projections
// =============================================================================

#[derive(Clone, Debug, Serialize)]
pub struct OrderedItem {
    pub id: i64,
    pub quantity: i64,
    pub product_info: ProductInfoView,
}

#[derive(Clone, Debug, Serialize)]
pub struct OrderView {
    pub id: i64,
    pub ordered_items: Vec<OrderedItem>,
    pub dt: DateTime<Utc>,
    pub state: OrderState,
    pub total_sum: i64,
    pub contact: Option<Contact>,
}

impl OrderView {
    pub fn new(id: i64, dt: DateTime<Utc>, state: OrderState, contact: Option<Contact>, ordered_items: Vec<OrderedItem>) -> Self {
        let total_sum = line_sum(ordered_items.iter().map(|i| (i.quantity, i.product_info.price)));
        Self { id, ordered_items, dt, state, total_sum, contact }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basket(lines: Vec<OrderLine>) -> Order { Order::restore(1, 7, OrderState::Basket, None, Utc::now(), lines) }
    fn offer(id: i64, open: bool) -> Offer { Offer { product_info_id: id, price: 100, shop_open: open } }

    #[test]
    fn test_add_items_rejects_duplicates_and_closed_shops() {
        let mut order = basket(vec![OrderLine { id: 10, product_info_id: 1, quantity: 1, price: 100 }]);
        assert_eq!(order.add_item(&offer(1, true), 2), Err(OrderError::DuplicateItem(1)));
        assert_eq!(order.add_item(&offer(2, false), 2), Err(OrderError::ShopClosed(2)));
        assert_eq!(order.add_item(&offer(3, true), 0), Err(OrderError::InvalidQuantity(0)));
        order.add_item(&offer(3, true), 2).unwrap();
        assert_eq!(order.add_item(&offer(3, true), 1), Err(OrderError::DuplicateItem(3)));
        assert_eq!(order.take_pending(), vec![NewItem { product_info_id: 3, quantity: 2 }]);
    }

    #[test]
    fn test_set_quantity_only_touches_own_items() {
        let mut order = basket(vec![OrderLine { id: 10, product_info_id: 1, quantity: 1, price: 250 }]);
        assert_eq!(order.set_quantity(10, 4), Ok(true));
        assert_eq!(order.set_quantity(99, 4), Ok(false));
        assert_eq!(order.set_quantity(10, -1), Err(OrderError::InvalidQuantity(-1)));
        assert_eq!(order.total(), 1000);
        assert_eq!(order.own_items(&[10, 11]).unwrap(), vec![10]);
    }

    #[test]
    fn test_quantity_is_capped_and_totals_do_not_wrap() {
        let mut order = basket(vec![OrderLine { id: 10, product_info_id: 1, quantity: 1, price: i64::MAX }]);
        assert_eq!(order.add_item(&offer(2, true), MAX_QUANTITY + 1), Err(OrderError::InvalidQuantity(MAX_QUANTITY + 1)));
        assert_eq!(order.set_quantity(10, i64::MAX / 2), Err(OrderError::InvalidQuantity(i64::MAX / 2)));
        order.add_item(&offer(2, true), MAX_QUANTITY).unwrap();
        assert_eq!(order.set_quantity(10, MAX_QUANTITY), Ok(true));
        assert_eq!(order.total(), i64::MAX);
        assert_eq!(line_sum([(3, 100), (2, 50)]), 400);
    }

    #[test]
    fn test_order_workflow() {
        let mut order = basket(vec![]);
        assert_eq!(order.place(5), Err(OrderError::NoItems));
        let mut order = basket(vec![OrderLine { id: 10, product_info_id: 1, quantity: 2, price: 50 }]);
        order.place(5).unwrap();
        assert_eq!(order.state(), OrderState::New);
        assert_eq!(order.contact_id(), Some(5));
        assert_eq!(order.place(5), Err(OrderError::NotBasket(OrderState::New)));
        assert!(matches!(order.add_item(&offer(2, true), 1), Err(OrderError::NotBasket(_))));
        order.transition(OrderState::Confirmed).unwrap();
        order.transition(OrderState::Assembled).unwrap();
        assert!(order.transition(OrderState::Delivered).is_err());
        order.transition(OrderState::Canceled).unwrap();
        assert!(!OrderState::Canceled.can_transition_to(OrderState::New));
    }

    #[test]
    fn test_state_round_trips_through_text() {
        for state in [OrderState::Basket, OrderState::Sent, OrderState::Canceled] {
            assert_eq!(state.as_str().parse::<OrderState>().unwrap(), state);
        }
        assert!("deliveres".parse::<OrderState>().is_err());
    }
}
