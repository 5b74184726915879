//! In-process store with the same constraints as the PostgreSQL schema

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{new_token_key, CatalogTx, ProductInfoRow, Store, StoreError, StoreResult, TokenPurpose};
use crate::domain::aggregates::{
    Category, Contact, ContactFields, NewItem, NewUser, Offer, Order, OrderLine, OrderState, OrderView, OrderedItem,
    ProductFilter, ProductInfoView, ProductParameterView, ProductView, Shop, User,
};
use crate::domain::value_objects::Email;

#[derive(Clone, Debug)]
struct ProductRecord { name: String, category_id: i64 }

#[derive(Clone, Debug)]
struct OrderRecord { user_id: i64, dt: DateTime<Utc>, state: OrderState, contact_id: Option<i64> }

#[derive(Clone, Debug)]
struct ItemRecord { order_id: i64, product_info_id: i64, quantity: i64 }

#[derive(Clone, Debug, Default)]
struct State {
    next_id: i64,
    users: BTreeMap<i64, User>,
    tokens: HashMap<(i64, TokenPurpose), String>,
    contacts: BTreeMap<i64, (i64, Contact)>,
    shops: BTreeMap<i64, Shop>,
    categories: BTreeMap<i64, Category>,
    shop_categories: BTreeSet<(i64, i64)>,
    products: BTreeMap<i64, ProductRecord>,
    product_infos: BTreeMap<i64, ProductInfoRow>,
    parameters: BTreeMap<i64, String>,
    product_parameters: BTreeMap<i64, Vec<(i64, String)>>,
    orders: BTreeMap<i64, OrderRecord>,
    items: BTreeMap<i64, ItemRecord>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn info_view(&self, id: i64) -> Option<ProductInfoView> {
        let row = self.product_infos.get(&id)?;
        let product = self.products.get(&row.product_id)?;
        let category = self.categories.get(&product.category_id)?;
        let mut product_parameters: Vec<ProductParameterView> = self
            .product_parameters
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|(pid, value)| {
                self.parameters.get(pid).map(|name| ProductParameterView { parameter: name.clone(), value: value.clone() })
            })
            .collect();
        product_parameters.sort_by(|a, b| a.parameter.cmp(&b.parameter));
        Some(ProductInfoView {
            id,
            model: row.model.clone(),
            product: ProductView { name: product.name.clone(), category: category.name.clone() },
            shop: row.shop_id,
            quantity: row.quantity,
            price: row.price,
            price_rrc: row.price_rrc,
            product_parameters,
        })
    }

    fn load_order(&self, id: i64, rec: &OrderRecord) -> Order {
        let lines = self
            .items
            .iter()
            .filter(|(_, i)| i.order_id == id)
            .filter_map(|(item_id, i)| {
                let price = self.product_infos.get(&i.product_info_id)?.price;
                Some(OrderLine { id: *item_id, product_info_id: i.product_info_id, quantity: i.quantity, price })
            })
            .collect();
        Order::restore(id, rec.user_id, rec.state, rec.contact_id, rec.dt, lines)
    }

    fn order_view(&self, id: i64, rec: &OrderRecord, shop_id: Option<i64>) -> OrderView {
        let items = self
            .items
            .iter()
            .filter(|(_, i)| i.order_id == id)
            .filter_map(|(item_id, i)| {
                let info = self.info_view(i.product_info_id)?;
                if shop_id.is_some_and(|s| s != info.shop) {
                    return None;
                }
                Some(OrderedItem { id: *item_id, quantity: i.quantity, product_info: info })
            })
            .collect();
        let contact = rec.contact_id.and_then(|c| self.contacts.get(&c)).map(|(_, c)| c.clone());
        OrderView::new(id, rec.dt, rec.state, contact, items)
    }

    /// Placed orders matching `keep`, newest first.
    fn placed_orders(&self, keep: impl Fn(i64, &OrderRecord) -> bool, shop_id: Option<i64>) -> Vec<OrderView> {
        let mut found: Vec<(&i64, &OrderRecord)> =
            self.orders.iter().filter(|(id, o)| o.state != OrderState::Basket && keep(**id, *o)).collect();
        found.sort_by(|a, b| b.1.dt.cmp(&a.1.dt).then(b.0.cmp(a.0)));
        found.into_iter().map(|(id, o)| self.order_view(*id, o, shop_id)).collect()
    }

    fn basket_id(&self, user_id: i64) -> Option<i64> {
        self.orders.iter().find(|(_, o)| o.user_id == user_id && o.state == OrderState::Basket).map(|(id, _)| *id)
    }

    /// Item writes are only allowed while the order is still a basket.
    fn ensure_basket(&self, order_id: i64) -> StoreResult<()> {
        match self.orders.get(&order_id) {
            None => Err(StoreError::NotFound("referenced record")),
            Some(rec) if rec.state != OrderState::Basket => Err(StoreError::Conflict(format!("order {order_id} is no longer a basket"))),
            Some(_) => Ok(()),
        }
    }

    fn remove_product_info(&mut self, id: i64) {
        self.product_infos.remove(&id);
        self.product_parameters.remove(&id);
        self.items.retain(|_, i| i.product_info_id != id);
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut s = self.state.lock().await;
        if s.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("a user with this email already exists".into()));
        }
        let id = s.next_id();
        let created = User {
            id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            company: user.company,
            position: user.position,
            password_hash: user.password_hash,
            is_active: false,
            user_type: user.user_type,
            created_at: Utc::now(),
        };
        s.users.insert(id, created.clone());
        Ok(created)
    }

    async fn user(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &Email) -> StoreResult<Option<User>> {
        Ok(self.state.lock().await.users.values().find(|u| &u.email == email).cloned())
    }

    async fn save_user(&self, user: &User) -> StoreResult<()> {
        let mut s = self.state.lock().await;
        let stored = s.users.get_mut(&user.id).ok_or(StoreError::NotFound("user"))?;
        let email = stored.email.clone();
        let created_at = stored.created_at;
        let user_type = stored.user_type;
        *stored = User { email, created_at, user_type, ..user.clone() };
        Ok(())
    }

    async fn issue_token(&self, user_id: i64, purpose: TokenPurpose) -> StoreResult<String> {
        let mut s = self.state.lock().await;
        if !s.users.contains_key(&user_id) {
            return Err(StoreError::NotFound("referenced record"));
        }
        Ok(s.tokens.entry((user_id, purpose)).or_insert_with(new_token_key).clone())
    }

    async fn redeem_token(&self, email: &Email, key: &str, purpose: TokenPurpose) -> StoreResult<Option<User>> {
        let mut s = self.state.lock().await;
        let Some(user) = s.users.values().find(|u| &u.email == email).cloned() else { return Ok(None) };
        let slot = (user.id, purpose);
        if !s.tokens.get(&slot).is_some_and(|stored| stored == key) {
            return Ok(None);
        }
        s.tokens.remove(&slot);
        Ok(Some(user))
    }

    async fn contacts(&self, user_id: i64) -> StoreResult<Vec<Contact>> {
        let s = self.state.lock().await;
        Ok(s.contacts.values().filter(|(owner, _)| *owner == user_id).map(|(_, c)| c.clone()).collect())
    }

    async fn contact(&self, user_id: i64, id: i64) -> StoreResult<Option<Contact>> {
        let s = self.state.lock().await;
        Ok(s.contacts.get(&id).filter(|(owner, _)| *owner == user_id).map(|(_, c)| c.clone()))
    }

    async fn create_contact(&self, user_id: i64, fields: ContactFields) -> StoreResult<Contact> {
        let mut s = self.state.lock().await;
        if !s.users.contains_key(&user_id) {
            return Err(StoreError::NotFound("referenced record"));
        }
        let id = s.next_id();
        let contact = Contact::from_fields(id, fields);
        s.contacts.insert(id, (user_id, contact.clone()));
        Ok(contact)
    }

    async fn save_contact(&self, user_id: i64, contact: &Contact) -> StoreResult<()> {
        let mut s = self.state.lock().await;
        match s.contacts.get_mut(&contact.id) {
            Some((owner, stored)) if *owner == user_id => {
                *stored = contact.clone();
                Ok(())
            }
            _ => Err(StoreError::NotFound("contact")),
        }
    }

    async fn delete_contacts(&self, user_id: i64, ids: &[i64]) -> StoreResult<u64> {
        let mut s = self.state.lock().await;
        let doomed: Vec<i64> =
            ids.iter().copied().filter(|id| s.contacts.get(id).is_some_and(|(owner, _)| *owner == user_id)).collect();
        for id in &doomed {
            s.contacts.remove(id);
            for order in s.orders.values_mut().filter(|o| o.contact_id == Some(*id)) {
                order.contact_id = None;
            }
        }
        Ok(doomed.len() as u64)
    }

    async fn categories(&self) -> StoreResult<Vec<Category>> {
        let s = self.state.lock().await;
        let mut all: Vec<Category> = s.categories.values().cloned().collect();
        all.sort_by(|a, b| b.name.cmp(&a.name).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn category(&self, id: i64) -> StoreResult<Option<Category>> {
        Ok(self.state.lock().await.categories.get(&id).cloned())
    }

    async fn shops(&self) -> StoreResult<Vec<Shop>> {
        let s = self.state.lock().await;
        let mut open: Vec<Shop> = s.shops.values().filter(|shop| shop.state).cloned().collect();
        open.sort_by(|a, b| b.name.cmp(&a.name).then(a.id.cmp(&b.id)));
        Ok(open)
    }

    async fn shop(&self, id: i64) -> StoreResult<Option<Shop>> {
        Ok(self.state.lock().await.shops.get(&id).cloned())
    }

    async fn shop_of(&self, user_id: i64) -> StoreResult<Option<Shop>> {
        Ok(self.state.lock().await.shops.values().find(|shop| shop.user_id == Some(user_id)).cloned())
    }

    async fn set_shop_state(&self, user_id: i64, state: bool) -> StoreResult<Option<Shop>> {
        let mut s = self.state.lock().await;
        Ok(s.shops.values_mut().find(|shop| shop.user_id == Some(user_id)).map(|shop| {
            shop.state = state;
            shop.clone()
        }))
    }

    async fn product_infos(&self, filter: ProductFilter) -> StoreResult<Vec<ProductInfoView>> {
        let s = self.state.lock().await;
        Ok(s.product_infos
            .iter()
            .rev()
            .filter(|(_, row)| s.shops.get(&row.shop_id).is_some_and(|shop| shop.state))
            .filter(|(_, row)| filter.shop_id.map_or(true, |id| row.shop_id == id))
            .filter(|(_, row)| {
                filter.category_id.map_or(true, |id| s.products.get(&row.product_id).is_some_and(|p| p.category_id == id))
            })
            .filter_map(|(id, _)| s.info_view(*id))
            .collect())
    }

    async fn product_info(&self, id: i64) -> StoreResult<Option<ProductInfoView>> {
        Ok(self.state.lock().await.info_view(id))
    }

    async fn begin_import(&self) -> StoreResult<Box<dyn CatalogTx>> {
        let guard = self.state.clone().lock_owned().await;
        let draft = guard.clone();
        Ok(Box::new(MemoryCatalogTx { guard, draft }))
    }

    async fn basket(&self, user_id: i64) -> StoreResult<Order> {
        let mut s = self.state.lock().await;
        if !s.users.contains_key(&user_id) {
            return Err(StoreError::NotFound("referenced record"));
        }
        let id = match s.basket_id(user_id) {
            Some(id) => id,
            None => {
                let id = s.next_id();
                s.orders.insert(id, OrderRecord { user_id, dt: Utc::now(), state: OrderState::Basket, contact_id: None });
                id
            }
        };
        let rec = s.orders.get(&id).cloned().ok_or(StoreError::NotFound("basket"))?;
        Ok(s.load_order(id, &rec))
    }

    async fn basket_view(&self, user_id: i64) -> StoreResult<Option<OrderView>> {
        let s = self.state.lock().await;
        Ok(s.basket_id(user_id).and_then(|id| s.orders.get(&id).map(|rec| s.order_view(id, rec, None))))
    }

    async fn order(&self, user_id: i64, order_id: i64) -> StoreResult<Option<Order>> {
        let s = self.state.lock().await;
        Ok(s.orders.get(&order_id).filter(|o| o.user_id == user_id).map(|rec| s.load_order(order_id, rec)))
    }

    async fn offers(&self, product_info_ids: &[i64]) -> StoreResult<Vec<Offer>> {
        let s = self.state.lock().await;
        Ok(product_info_ids
            .iter()
            .filter_map(|id| {
                let row = s.product_infos.get(id)?;
                let shop_open = s.shops.get(&row.shop_id).is_some_and(|shop| shop.state);
                Some(Offer { product_info_id: *id, price: row.price, shop_open })
            })
            .collect())
    }

    async fn insert_items(&self, order_id: i64, items: &[NewItem]) -> StoreResult<usize> {
        let mut s = self.state.lock().await;
        s.ensure_basket(order_id)?;
        for (n, item) in items.iter().enumerate() {
            if !s.product_infos.contains_key(&item.product_info_id) {
                return Err(StoreError::NotFound("referenced record"));
            }
            let taken = s.items.values().any(|i| i.order_id == order_id && i.product_info_id == item.product_info_id)
                || items[..n].iter().any(|p| p.product_info_id == item.product_info_id);
            if taken {
                return Err(StoreError::Conflict(format!("product info {} is already in the basket", item.product_info_id)));
            }
        }
        for item in items {
            let id = s.next_id();
            s.items.insert(id, ItemRecord { order_id, product_info_id: item.product_info_id, quantity: item.quantity });
        }
        Ok(items.len())
    }

    async fn update_quantities(&self, order_id: i64, items: &[(i64, i64)]) -> StoreResult<u64> {
        let mut s = self.state.lock().await;
        s.ensure_basket(order_id)?;
        let mut updated = 0;
        for (id, quantity) in items {
            if let Some(item) = s.items.get_mut(id).filter(|i| i.order_id == order_id) {
                item.quantity = *quantity;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_items(&self, order_id: i64, ids: &[i64]) -> StoreResult<u64> {
        let mut s = self.state.lock().await;
        s.ensure_basket(order_id)?;
        let before = s.items.len();
        s.items.retain(|id, i| !(i.order_id == order_id && ids.contains(id)));
        Ok((before - s.items.len()) as u64)
    }

    async fn place_order(&self, order: &Order) -> StoreResult<bool> {
        let mut s = self.state.lock().await;
        if let Some(contact_id) = order.contact_id() {
            if !s.contacts.contains_key(&contact_id) {
                return Err(StoreError::NotFound("referenced record"));
            }
        }
        match s.orders.get_mut(&order.id()) {
            Some(rec) if rec.user_id == order.user_id() && rec.state == OrderState::Basket => {
                rec.state = order.state();
                rec.contact_id = order.contact_id();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn orders(&self, user_id: i64) -> StoreResult<Vec<OrderView>> {
        let s = self.state.lock().await;
        Ok(s.placed_orders(|_, o| o.user_id == user_id, None))
    }

    async fn partner_orders(&self, user_id: i64) -> StoreResult<Vec<OrderView>> {
        let s = self.state.lock().await;
        let Some(shop_id) = s.shops.iter().find(|(_, shop)| shop.user_id == Some(user_id)).map(|(id, _)| *id) else {
            return Ok(vec![]);
        };
        let has_shop_items = |order_id: i64| {
            s.items.values().any(|i| {
                i.order_id == order_id && s.product_infos.get(&i.product_info_id).is_some_and(|r| r.shop_id == shop_id)
            })
        };
        Ok(s.placed_orders(|id, _| has_shop_items(id), Some(shop_id)))
    }
}

/// Holds the store lock for the whole import and writes the draft back on commit.
pub struct MemoryCatalogTx {
    guard: OwnedMutexGuard<State>,
    draft: State,
}

#[async_trait]
impl CatalogTx for MemoryCatalogTx {
    async fn upsert_shop(&mut self, user_id: i64, name: &str, url: Option<&str>) -> StoreResult<Shop> {
        let d = &mut self.draft;
        if let Some(shop) = d.shops.values_mut().find(|shop| shop.user_id == Some(user_id)) {
            shop.name = name.to_string();
            if let Some(url) = url {
                shop.url = Some(url.to_string());
            }
            return Ok(shop.clone());
        }
        let id = d.next_id();
        let shop = Shop { id, name: name.to_string(), url: url.map(str::to_string), user_id: Some(user_id), state: true };
        d.shops.insert(id, shop.clone());
        Ok(shop)
    }

    async fn upsert_category(&mut self, id: i64, name: &str) -> StoreResult<()> {
        self.draft.categories.insert(id, Category { id, name: name.to_string() });
        Ok(())
    }

    async fn link_category(&mut self, category_id: i64, shop_id: i64) -> StoreResult<()> {
        let d = &mut self.draft;
        if !d.categories.contains_key(&category_id) || !d.shops.contains_key(&shop_id) {
            return Err(StoreError::NotFound("referenced record"));
        }
        d.shop_categories.insert((shop_id, category_id));
        Ok(())
    }

    async fn product_id(&mut self, name: &str, category_id: i64) -> StoreResult<i64> {
        let d = &mut self.draft;
        if let Some((id, _)) = d.products.iter().find(|(_, p)| p.name == name && p.category_id == category_id) {
            return Ok(*id);
        }
        if !d.categories.contains_key(&category_id) {
            return Err(StoreError::NotFound("referenced record"));
        }
        let id = d.next_id();
        d.products.insert(id, ProductRecord { name: name.to_string(), category_id });
        Ok(id)
    }

    async fn parameter_id(&mut self, name: &str) -> StoreResult<i64> {
        let d = &mut self.draft;
        if let Some((id, _)) = d.parameters.iter().find(|(_, n)| n.as_str() == name) {
            return Ok(*id);
        }
        let id = d.next_id();
        d.parameters.insert(id, name.to_string());
        Ok(id)
    }

    async fn upsert_product_info(&mut self, row: &ProductInfoRow) -> StoreResult<i64> {
        let d = &mut self.draft;
        let existing = d
            .product_infos
            .iter()
            .find(|(_, r)| r.product_id == row.product_id && r.shop_id == row.shop_id && r.external_id == row.external_id)
            .map(|(id, _)| *id);
        let id = existing.unwrap_or_else(|| d.next_id());
        d.product_infos.insert(id, row.clone());
        Ok(id)
    }

    async fn replace_parameters(&mut self, product_info_id: i64, values: &[(i64, String)]) -> StoreResult<()> {
        let mut seen = BTreeSet::new();
        if values.iter().any(|(pid, _)| !seen.insert(*pid)) {
            return Err(StoreError::Conflict(format!("duplicate parameter for product info {product_info_id}")));
        }
        self.draft.product_parameters.insert(product_info_id, values.to_vec());
        Ok(())
    }

    async fn remove_stale_product_infos(&mut self, shop_id: i64, keep: &[i64]) -> StoreResult<u64> {
        let d = &mut self.draft;
        let stale: Vec<i64> =
            d.product_infos.iter().filter(|(id, r)| r.shop_id == shop_id && !keep.contains(id)).map(|(id, _)| *id).collect();
        for id in &stale {
            d.remove_product_info(*id);
        }
        Ok(stale.len() as u64)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryCatalogTx { mut guard, draft } = *self;
        *guard = draft;
        Ok(())
    }
}
