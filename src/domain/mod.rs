//! Domain layer: aggregates, value objects, events and the price-list document.
pub mod aggregates;
pub mod events;
pub mod price_list;
pub mod value_objects;
