//! Basket and order engine
//!
//! Loads the caller's [`Order`] aggregate, applies the change there and
//! persists the result. A user has at most one basket; the store enforces it
//! as well.

use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::aggregates::{NewItem, Order, OrderError, OrderState, OrderView, User};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::parse_id_list;
use crate::error::ApiError;
use crate::notify::Dispatcher;
use crate::store::Store;

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddItem {
    pub product_info: i64,
    pub quantity: i64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuantityUpdate {
    pub id: i64,
    pub quantity: i64,
}

pub async fn basket(store: &dyn Store, user: &User) -> Result<Option<OrderView>, ApiError> {
    Ok(store.basket_view(user.id).await?)
}

/// Adds every item or none. Returns the number of items created.
pub async fn add_items(store: &dyn Store, user: &User, items: &[AddItem]) -> Result<usize, ApiError> {
    if items.is_empty() {
        return Err(ApiError::validation("items are required"));
    }
    let ids: Vec<i64> = items.iter().map(|i| i.product_info).collect();
    let offers = store.offers(&ids).await?;

    let mut order = store.basket(user.id).await?;
    for item in items {
        let offer = offers
            .iter()
            .find(|o| o.product_info_id == item.product_info)
            .ok_or_else(|| ApiError::NotFound(format!("product info {} not found", item.product_info)))?;
        order.add_item(offer, item.quantity)?;
    }
    let pending: Vec<NewItem> = order.take_pending();
    let created = store.insert_items(order.id(), &pending).await?;
    info!(user = user.id, basket = order.id(), created, "basket items added");
    Ok(created)
}

/// Sets quantities of the caller's basket items; other ids are ignored.
pub async fn update_items(store: &dyn Store, user: &User, items: &[QuantityUpdate]) -> Result<u64, ApiError> {
    if items.is_empty() {
        return Err(ApiError::validation("items are required"));
    }
    let mut order = store.basket(user.id).await?;
    let mut changes = Vec::with_capacity(items.len());
    for item in items {
        if order.set_quantity(item.id, item.quantity)? {
            changes.push((item.id, item.quantity));
        }
    }
    Ok(store.update_quantities(order.id(), &changes).await?)
}

/// Removes basket items listed as comma-separated ids.
pub async fn remove_items(store: &dyn Store, user: &User, raw_ids: &str) -> Result<u64, ApiError> {
    let ids = parse_id_list(raw_ids);
    if ids.is_empty() {
        return Err(ApiError::validation("no item ids given"));
    }
    let order = store.basket(user.id).await?;
    let own = order.own_items(&ids)?;
    Ok(store.delete_items(order.id(), &own).await?)
}

/// Turns the caller's basket into a new order shipped to `contact_id`.
pub async fn place_order(
    store: &dyn Store,
    dispatcher: &Dispatcher,
    user: &User,
    order_id: i64,
    contact_id: i64,
) -> Result<Order, ApiError> {
    let mut order = store.order(user.id, order_id).await?.ok_or_else(|| ApiError::not_found("order"))?;
    if order.state() != OrderState::Basket {
        return Err(OrderError::NotBasket(order.state()).into());
    }
    if store.contact(user.id, contact_id).await?.is_none() {
        return Err(ApiError::not_found("contact"));
    }
    order.place(contact_id)?;
    if !store.place_order(&order).await? {
        warn!(user = user.id, order = order_id, "order was placed concurrently");
        return Err(OrderError::NotBasket(order.state()).into());
    }
    info!(user = user.id, order = order_id, total = order.total(), "order placed");
    dispatcher.dispatch(DomainEvent::OrderPlaced { order_id, user_id: user.id, email: user.email.to_string() });
    Ok(order)
}

pub async fn orders(store: &dyn Store, user: &User) -> Result<Vec<OrderView>, ApiError> {
    Ok(store.orders(user.id).await?)
}

pub async fn partner_orders(store: &dyn Store, partner: &User) -> Result<Vec<OrderView>, ApiError> {
    if !partner.is_partner() {
        return Err(ApiError::Forbidden("only partners can do this".into()));
    }
    Ok(store.partner_orders(partner.id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{ContactFields, NewUser, ProductFilter, UserType, MAX_QUANTITY};
    use crate::domain::events::DomainEvent;
    use crate::domain::price_list::{PriceList, SAMPLE};
    use crate::domain::value_objects::Email;
    use crate::importer::import_price_list;
    use crate::store::{MemoryStore, StoreError};

    async fn user(store: &MemoryStore, email: &str, user_type: UserType) -> User {
        store
            .create_user(NewUser {
                email: Email::new(email).unwrap(),
                first_name: "Test".into(),
                last_name: "User".into(),
                company: "Company".into(),
                position: "Position".into(),
                password_hash: "x".into(),
                user_type,
            })
            .await
            .unwrap()
    }

    /// A store with the sample catalog, its partner and a buyer.
    async fn setup() -> (MemoryStore, User, User, Vec<i64>) {
        let store = MemoryStore::new();
        let partner = user(&store, "shop@example.com", UserType::Shop).await;
        import_price_list(&store, &partner, &PriceList::from_yaml(SAMPLE).unwrap()).await.unwrap();
        let buyer = user(&store, "buyer@example.com", UserType::Buyer).await;
        let infos = store.product_infos(Default::default()).await.unwrap().into_iter().map(|i| i.id).collect();
        (store, partner, buyer, infos)
    }

    fn contact() -> ContactFields {
        ContactFields { city: "Moscow".into(), street: "Tverskaya".into(), phone: "+7999".into(), ..Default::default() }
    }

    #[tokio::test]
    async fn test_add_items_is_all_or_nothing() {
        let (store, _, buyer, infos) = setup().await;
        let items = vec![
            AddItem { product_info: infos[0], quantity: 1 },
            AddItem { product_info: infos[0], quantity: 2 },
        ];
        assert!(matches!(add_items(&store, &buyer, &items).await, Err(ApiError::Conflict(_))));
        assert!(store.basket_view(buyer.id).await.unwrap().unwrap().ordered_items.is_empty());

        let items = vec![AddItem { product_info: infos[0], quantity: 2 }, AddItem { product_info: infos[1], quantity: 1 }];
        assert_eq!(add_items(&store, &buyer, &items).await.unwrap(), 2);
        let view = basket(&store, &buyer).await.unwrap().unwrap();
        assert_eq!(view.ordered_items.len(), 2);
        let expected: i64 = view.ordered_items.iter().map(|i| i.quantity * i.product_info.price).sum();
        assert_eq!(view.total_sum, expected);
    }

    #[tokio::test]
    async fn test_oversized_quantities_are_rejected() {
        let (store, _, buyer, infos) = setup().await;
        let huge = vec![AddItem { product_info: infos[0], quantity: i64::MAX / 2 }];
        assert!(matches!(add_items(&store, &buyer, &huge).await, Err(ApiError::Validation(_))));

        add_items(&store, &buyer, &[AddItem { product_info: infos[0], quantity: MAX_QUANTITY }]).await.unwrap();
        let view = basket(&store, &buyer).await.unwrap().unwrap();
        let item = view.ordered_items[0].id;
        assert_eq!(view.total_sum, MAX_QUANTITY * view.ordered_items[0].product_info.price);
        assert!(matches!(
            update_items(&store, &buyer, &[QuantityUpdate { id: item, quantity: MAX_QUANTITY + 1 }]).await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_shop_rejects_items() {
        let (store, partner, buyer, infos) = setup().await;
        store.set_shop_state(partner.id, false).await.unwrap();
        let items = vec![AddItem { product_info: infos[0], quantity: 1 }];
        assert!(matches!(add_items(&store, &buyer, &items).await, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_and_remove_touch_only_own_basket() {
        let (store, _, buyer, infos) = setup().await;
        let other = user(&store, "other@example.com", UserType::Buyer).await;
        add_items(&store, &buyer, &[AddItem { product_info: infos[0], quantity: 1 }]).await.unwrap();
        add_items(&store, &other, &[AddItem { product_info: infos[0], quantity: 1 }]).await.unwrap();
        let mine = basket(&store, &buyer).await.unwrap().unwrap().ordered_items[0].id;
        let theirs = basket(&store, &other).await.unwrap().unwrap().ordered_items[0].id;

        let updates = vec![QuantityUpdate { id: mine, quantity: 5 }, QuantityUpdate { id: theirs, quantity: 5 }];
        assert_eq!(update_items(&store, &buyer, &updates).await.unwrap(), 1);
        assert!(matches!(
            update_items(&store, &buyer, &[QuantityUpdate { id: mine, quantity: 0 }]).await,
            Err(ApiError::Validation(_))
        ));

        assert!(matches!(remove_items(&store, &buyer, "a,b").await, Err(ApiError::Validation(_))));
        assert_eq!(remove_items(&store, &buyer, &format!("{theirs},x,{mine}")).await.unwrap(), 1);
        assert_eq!(basket(&store, &other).await.unwrap().unwrap().ordered_items.len(), 1);
    }

    #[tokio::test]
    async fn test_place_order_flow() {
        let (store, partner, buyer, infos) = setup().await;
        let (dispatcher, mut events) = Dispatcher::with_channel();
        let address = store.create_contact(buyer.id, contact()).await.unwrap();
        let basket_id = store.basket(buyer.id).await.unwrap().id();

        assert!(matches!(
            place_order(&store, &dispatcher, &buyer, basket_id, address.id).await,
            Err(ApiError::Validation(_))
        ));

        add_items(&store, &buyer, &[AddItem { product_info: infos[0], quantity: 3 }]).await.unwrap();
        assert!(matches!(place_order(&store, &dispatcher, &buyer, basket_id, 999).await, Err(ApiError::NotFound(_))));
        let placed = place_order(&store, &dispatcher, &buyer, basket_id, address.id).await.unwrap();
        assert_eq!(placed.state(), OrderState::New);
        assert!(matches!(events.try_recv(), Ok(DomainEvent::OrderPlaced { order_id, .. }) if order_id == basket_id));

        assert!(matches!(
            place_order(&store, &dispatcher, &buyer, basket_id, address.id).await,
            Err(ApiError::Conflict(_))
        ));
        assert!(basket(&store, &buyer).await.unwrap().is_none());

        let mine = orders(&store, &buyer).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].contact.as_ref().map(|c| c.id), Some(address.id));
        let incoming = partner_orders(&store, &partner).await.unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].total_sum, mine[0].total_sum);
        assert!(matches!(partner_orders(&store, &buyer).await, Err(ApiError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_placed_order_rejects_stale_item_writes() {
        let (store, _, buyer, infos) = setup().await;
        let (dispatcher, _events) = Dispatcher::with_channel();
        let address = store.create_contact(buyer.id, contact()).await.unwrap();
        add_items(&store, &buyer, &[AddItem { product_info: infos[0], quantity: 1 }]).await.unwrap();
        let stale = store.basket(buyer.id).await.unwrap();
        let item = stale.lines()[0].id;

        let placed = place_order(&store, &dispatcher, &buyer, stale.id(), address.id).await.unwrap();
        let total = placed.total();

        let extra = [NewItem { product_info_id: infos[1], quantity: 50 }];
        assert!(matches!(store.insert_items(stale.id(), &extra).await, Err(StoreError::Conflict(_))));
        assert!(matches!(store.update_quantities(stale.id(), &[(item, 40)]).await, Err(StoreError::Conflict(_))));
        assert!(matches!(store.delete_items(stale.id(), &[item]).await, Err(StoreError::Conflict(_))));

        let mine = orders(&store, &buyer).await.unwrap();
        assert_eq!(mine[0].state, OrderState::New);
        assert_eq!(mine[0].ordered_items.len(), 1);
        assert_eq!(mine[0].total_sum, total);
    }

    #[tokio::test]
    async fn test_placed_order_is_conflict_before_contact_lookup() {
        let (store, _, buyer, infos) = setup().await;
        let (dispatcher, _events) = Dispatcher::with_channel();
        let address = store.create_contact(buyer.id, contact()).await.unwrap();
        add_items(&store, &buyer, &[AddItem { product_info: infos[0], quantity: 1 }]).await.unwrap();
        let order_id = store.basket(buyer.id).await.unwrap().id();
        place_order(&store, &dispatcher, &buyer, order_id, address.id).await.unwrap();

        let stranger = user(&store, "stranger@example.com", UserType::Buyer).await;
        let foreign = store.create_contact(stranger.id, contact()).await.unwrap();
        assert!(matches!(
            place_order(&store, &dispatcher, &buyer, order_id, foreign.id).await,
            Err(ApiError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_order_is_placed_once() {
        let (store, _, buyer, infos) = setup().await;
        let address = store.create_contact(buyer.id, contact()).await.unwrap();
        add_items(&store, &buyer, &[AddItem { product_info: infos[0], quantity: 2 }]).await.unwrap();
        let mut order = store.basket(buyer.id).await.unwrap();
        order.place(address.id).unwrap();
        assert!(store.place_order(&order).await.unwrap());
        assert!(!store.place_order(&order).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_placement_dispatches_one_event() {
        let (store, _, buyer, infos) = setup().await;
        let (dispatcher, mut events) = Dispatcher::with_channel();
        let address = store.create_contact(buyer.id, contact()).await.unwrap();
        add_items(&store, &buyer, &[AddItem { product_info: infos[0], quantity: 1 }]).await.unwrap();
        let order_id = store.basket(buyer.id).await.unwrap().id();

        let (a, b) = tokio::join!(
            place_order(&store, &dispatcher, &buyer, order_id, address.id),
            place_order(&store, &dispatcher, &buyer, order_id, address.id),
        );
        assert_eq!([&a, &b].iter().filter(|r| r.is_ok()).count(), 1);
        assert!([a, b].into_iter().any(|r| matches!(r, Err(ApiError::Conflict(_)))));
        assert!(matches!(events.try_recv(), Ok(DomainEvent::OrderPlaced { .. })));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_partner_orders_show_only_own_share() {
        let (store, partner, buyer, infos) = setup().await;
        let (dispatcher, _events) = Dispatcher::with_channel();
        let other = user(&store, "audio@example.com", UserType::Shop).await;
        let audio = "shop: Audio House\ncategories:\n  - {id: 500, name: Audio}\n\
                     goods:\n  - {id: 1, category: 500, name: Speaker, price: 300, quantity: 5}\n";
        import_price_list(&store, &other, &PriceList::from_yaml(audio).unwrap()).await.unwrap();
        let audio_shop = store.shop_of(other.id).await.unwrap().unwrap();
        let speaker = store
            .product_infos(ProductFilter { shop_id: Some(audio_shop.id), category_id: None })
            .await
            .unwrap()[0]
            .clone();
        let gadget = store.product_info(infos[0]).await.unwrap().unwrap();

        let address = store.create_contact(buyer.id, contact()).await.unwrap();
        let items = vec![AddItem { product_info: gadget.id, quantity: 2 }, AddItem { product_info: speaker.id, quantity: 3 }];
        add_items(&store, &buyer, &items).await.unwrap();
        let order_id = store.basket(buyer.id).await.unwrap().id();
        place_order(&store, &dispatcher, &buyer, order_id, address.id).await.unwrap();

        let full = orders(&store, &buyer).await.unwrap();
        assert_eq!(full[0].ordered_items.len(), 2);
        assert_eq!(full[0].total_sum, 2 * gadget.price + 3 * speaker.price);

        let first = partner_orders(&store, &partner).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].ordered_items.len(), 1);
        assert_eq!(first[0].ordered_items[0].product_info.id, gadget.id);
        assert_eq!(first[0].total_sum, 2 * gadget.price);

        let second = partner_orders(&store, &other).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].ordered_items[0].product_info.id, speaker.id);
        assert_eq!(second[0].total_sum, 900);
    }

    #[tokio::test]
    async fn test_orders_of_other_users_are_not_found() {
        let (store, _, buyer, _) = setup().await;
        let (dispatcher, _events) = Dispatcher::with_channel();
        let stranger = user(&store, "stranger@example.com", UserType::Buyer).await;
        let address = store.create_contact(stranger.id, contact()).await.unwrap();
        let basket_id = store.basket(buyer.id).await.unwrap().id();
        assert!(matches!(
            place_order(&store, &dispatcher, &stranger, basket_id, address.id).await,
            Err(ApiError::NotFound(_))
        ));
    }
}
