//! Aggregates module
pub mod catalog;
pub mod contact;
pub mod order;
pub mod user;

pub use catalog::{Category, ProductFilter, ProductInfoView, ProductParameterView, ProductView, Shop};
pub use contact::{Contact, ContactFields, ContactPatch};
pub use order::{line_sum, NewItem, Offer, Order, OrderError, OrderLine, OrderState, OrderView, OrderedItem, MAX_QUANTITY};
pub use user::{NewUser, Registration, User, UserPatch, UserType, UserView};
