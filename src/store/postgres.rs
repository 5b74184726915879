//! PostgreSQL store on sqlx

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

use super::{new_token_key, CatalogTx, ProductInfoRow, Store, StoreError, StoreResult, TokenPurpose};
use crate::domain::aggregates::{
    Category, Contact, ContactFields, NewItem, NewUser, Offer, Order, OrderLine, OrderState, OrderView, OrderedItem,
    ProductFilter, ProductInfoView, ProductParameterView, ProductView, Shop, User,
};
use crate::domain::value_objects::Email;

const USER_COLUMNS: &str = "id, email, first_name, last_name, company, position, password_hash, is_active, user_type, created_at";
const CONTACT_COLUMNS: &str = "id, city, street, house, structure, building, apartment, phone";
const SHOP_COLUMNS: &str = "id, name, url, user_id, state";
const ORDER_COLUMNS: &str = "o.id, o.user_id, o.dt, o.state, o.contact_id";
const INFO_SELECT: &str = "SELECT pi.id, pi.model, pi.shop_id, pi.quantity, pi.price, pi.price_rrc, \
     p.name AS product_name, c.name AS category_name \
     FROM product_infos pi \
     JOIN products p ON p.id = pi.product_id \
     JOIN categories c ON c.id = p.category_id \
     JOIN shops s ON s.id = pi.shop_id";

#[derive(FromRow)]
struct UserRow {
    id: i64,
    email: String,
    first_name: String,
    last_name: String,
    company: String,
    position: String,
    password_hash: String,
    is_active: bool,
    user_type: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: r.id,
            email: Email::new(&r.email).map_err(|e| StoreError::Corrupt(format!("user {}: {e}", r.id)))?,
            first_name: r.first_name,
            last_name: r.last_name,
            company: r.company,
            position: r.position,
            password_hash: r.password_hash,
            is_active: r.is_active,
            user_type: r.user_type.parse().map_err(StoreError::Corrupt)?,
            created_at: r.created_at,
        })
    }
}

#[derive(FromRow)]
struct OrderRow { id: i64, user_id: i64, dt: DateTime<Utc>, state: String, contact_id: Option<i64> }

#[derive(FromRow)]
struct ItemRow { id: i64, order_id: i64, product_info_id: i64, quantity: i64 }

#[derive(FromRow)]
struct InfoRow {
    id: i64,
    model: String,
    shop_id: i64,
    quantity: i64,
    price: i64,
    price_rrc: Option<i64>,
    product_name: String,
    category_name: String,
}

#[derive(FromRow)]
struct ParamRow { product_info_id: i64, name: String, value: String }

fn parse_state(raw: &str) -> StoreResult<OrderState> {
    raw.parse().map_err(|e: crate::domain::aggregates::OrderError| StoreError::Corrupt(e.to_string()))
}

/// Maps constraint violations of a write to domain-level store errors.
fn write_error(e: sqlx::Error, conflict: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(conflict.to_string()),
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => StoreError::NotFound("referenced record"),
        _ => StoreError::Database(e),
    }
}

/// Locks the order row until `tx` ends, so placement waits for item writes and vice versa.
async fn lock_basket(tx: &mut Transaction<'static, Postgres>, order_id: i64) -> StoreResult<()> {
    let state: Option<String> = sqlx::query_scalar("SELECT state FROM orders WHERE id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(&mut **tx)
        .await?;
    match state.as_deref() {
        None => Err(StoreError::NotFound("referenced record")),
        Some("basket") => Ok(()),
        Some(_) => Err(StoreError::Conflict(format!("order {order_id} is no longer a basket"))),
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self { Self { pool } }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("migrations completed");
        Ok(())
    }

    async fn with_parameters(&self, rows: Vec<InfoRow>) -> StoreResult<Vec<ProductInfoView>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let params = sqlx::query_as::<_, ParamRow>(
            "SELECT pp.product_info_id, pa.name, pp.value FROM product_parameters pp \
             JOIN parameters pa ON pa.id = pp.parameter_id \
             WHERE pp.product_info_id = ANY($1) ORDER BY pa.name",
        )
        .bind(&ids[..])
        .fetch_all(&self.pool)
        .await?;

        let mut by_info: HashMap<i64, Vec<ProductParameterView>> = HashMap::new();
        for p in params {
            by_info.entry(p.product_info_id).or_default().push(ProductParameterView { parameter: p.name, value: p.value });
        }
        Ok(rows
            .into_iter()
            .map(|r| ProductInfoView {
                id: r.id,
                model: r.model,
                product: ProductView { name: r.product_name, category: r.category_name },
                shop: r.shop_id,
                quantity: r.quantity,
                price: r.price,
                price_rrc: r.price_rrc,
                product_parameters: by_info.remove(&r.id).unwrap_or_default(),
            })
            .collect())
    }

    async fn load_order(&self, row: OrderRow) -> StoreResult<Order> {
        let lines = sqlx::query_as::<_, (i64, i64, i64, i64)>(
            "SELECT oi.id, oi.product_info_id, oi.quantity, pi.price FROM order_items oi \
             JOIN product_infos pi ON pi.id = oi.product_info_id \
             WHERE oi.order_id = $1 ORDER BY oi.id",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(id, product_info_id, quantity, price)| OrderLine { id, product_info_id, quantity, price })
        .collect();
        Ok(Order::restore(row.id, row.user_id, parse_state(&row.state)?, row.contact_id, row.dt, lines))
    }

    /// Builds order projections; with `shop_id` only that shop's items are kept.
    async fn assemble(&self, orders: Vec<OrderRow>, shop_id: Option<i64>) -> StoreResult<Vec<OrderView>> {
        if orders.is_empty() {
            return Ok(vec![]);
        }
        let order_ids: Vec<i64> = orders.iter().map(|o| o.id).collect();
        let items = sqlx::query_as::<_, ItemRow>(
            "SELECT oi.id, oi.order_id, oi.product_info_id, oi.quantity FROM order_items oi \
             JOIN product_infos pi ON pi.id = oi.product_info_id \
             WHERE oi.order_id = ANY($1) AND ($2::BIGINT IS NULL OR pi.shop_id = $2) ORDER BY oi.id",
        )
        .bind(&order_ids[..])
        .bind(shop_id)
        .fetch_all(&self.pool)
        .await?;

        let mut info_ids: Vec<i64> = items.iter().map(|i| i.product_info_id).collect();
        info_ids.sort_unstable();
        info_ids.dedup();
        let sql = format!("{INFO_SELECT} WHERE pi.id = ANY($1)");
        let rows = sqlx::query_as::<_, InfoRow>(&sql).bind(&info_ids[..]).fetch_all(&self.pool).await?;
        let infos: HashMap<i64, ProductInfoView> =
            self.with_parameters(rows).await?.into_iter().map(|i| (i.id, i)).collect();

        let contact_ids: Vec<i64> = orders.iter().filter_map(|o| o.contact_id).collect();
        let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ANY($1)");
        let contacts: HashMap<i64, Contact> = sqlx::query_as::<_, Contact>(&sql)
            .bind(&contact_ids[..])
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let mut by_order: HashMap<i64, Vec<OrderedItem>> = HashMap::new();
        for item in items {
            let Some(info) = infos.get(&item.product_info_id).cloned() else { continue };
            by_order.entry(item.order_id).or_default().push(OrderedItem { id: item.id, quantity: item.quantity, product_info: info });
        }

        orders
            .into_iter()
            .map(|o| {
                let contact = o.contact_id.and_then(|c| contacts.get(&c).cloned());
                let items = by_order.remove(&o.id).unwrap_or_default();
                Ok(OrderView::new(o.id, o.dt, parse_state(&o.state)?, contact, items))
            })
            .collect()
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let sql = format!(
            "INSERT INTO users (email, first_name, last_name, company, position, password_hash, user_type) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user.email.as_str())
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.company)
            .bind(&user.position)
            .bind(&user.password_hash)
            .bind(user.user_type.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| write_error(e, "a user with this email already exists"))?;
        row.try_into()
    }

    async fn user(&self, id: i64) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, UserRow>(&sql).bind(id).fetch_optional(&self.pool).await?.map(User::try_from).transpose()
    }

    async fn user_by_email(&self, email: &Email) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(email.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn save_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users SET first_name = $2, last_name = $3, company = $4, position = $5, \
             password_hash = $6, is_active = $7 WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.company)
        .bind(&user.position)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn issue_token(&self, user_id: i64, purpose: TokenPurpose) -> StoreResult<String> {
        let (key,): (String,) = sqlx::query_as(
            "INSERT INTO confirm_tokens (user_id, purpose, key) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, purpose) DO UPDATE SET purpose = EXCLUDED.purpose RETURNING key",
        )
        .bind(user_id)
        .bind(purpose.as_str())
        .bind(new_token_key())
        .fetch_one(&self.pool)
        .await?;
        Ok(key)
    }

    async fn redeem_token(&self, email: &Email, key: &str, purpose: TokenPurpose) -> StoreResult<Option<User>> {
        let owner: Option<(i64,)> = sqlx::query_as(
            "DELETE FROM confirm_tokens t USING users u \
             WHERE t.user_id = u.id AND u.email = $1 AND t.key = $2 AND t.purpose = $3 RETURNING t.user_id",
        )
        .bind(email.as_str())
        .bind(key)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await?;
        match owner {
            Some((id,)) => self.user(id).await,
            None => Ok(None),
        }
    }

    async fn contacts(&self, user_id: i64) -> StoreResult<Vec<Contact>> {
        let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE user_id = $1 ORDER BY id");
        Ok(sqlx::query_as::<_, Contact>(&sql).bind(user_id).fetch_all(&self.pool).await?)
    }

    async fn contact(&self, user_id: i64, id: i64) -> StoreResult<Option<Contact>> {
        let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE user_id = $1 AND id = $2");
        Ok(sqlx::query_as::<_, Contact>(&sql).bind(user_id).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn create_contact(&self, user_id: i64, f: ContactFields) -> StoreResult<Contact> {
        let sql = format!(
            "INSERT INTO contacts (user_id, city, street, house, structure, building, apartment, phone) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {CONTACT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Contact>(&sql)
            .bind(user_id)
            .bind(&f.city)
            .bind(&f.street)
            .bind(&f.house)
            .bind(&f.structure)
            .bind(&f.building)
            .bind(&f.apartment)
            .bind(&f.phone)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn save_contact(&self, user_id: i64, c: &Contact) -> StoreResult<()> {
        let done = sqlx::query(
            "UPDATE contacts SET city = $3, street = $4, house = $5, structure = $6, building = $7, \
             apartment = $8, phone = $9 WHERE id = $1 AND user_id = $2",
        )
        .bind(c.id)
        .bind(user_id)
        .bind(&c.city)
        .bind(&c.street)
        .bind(&c.house)
        .bind(&c.structure)
        .bind(&c.building)
        .bind(&c.apartment)
        .bind(&c.phone)
        .execute(&self.pool)
        .await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound("contact"));
        }
        Ok(())
    }

    async fn delete_contacts(&self, user_id: i64, ids: &[i64]) -> StoreResult<u64> {
        let done = sqlx::query("DELETE FROM contacts WHERE user_id = $1 AND id = ANY($2)")
            .bind(user_id)
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    async fn categories(&self) -> StoreResult<Vec<Category>> {
        Ok(sqlx::query_as::<_, Category>("SELECT id, name FROM categories ORDER BY name DESC, id")
            .fetch_all(&self.pool)
            .await?)
    }

    async fn category(&self, id: i64) -> StoreResult<Option<Category>> {
        Ok(sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn shops(&self) -> StoreResult<Vec<Shop>> {
        let sql = format!("SELECT {SHOP_COLUMNS} FROM shops WHERE state ORDER BY name DESC, id");
        Ok(sqlx::query_as::<_, Shop>(&sql).fetch_all(&self.pool).await?)
    }

    async fn shop(&self, id: i64) -> StoreResult<Option<Shop>> {
        let sql = format!("SELECT {SHOP_COLUMNS} FROM shops WHERE id = $1");
        Ok(sqlx::query_as::<_, Shop>(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn shop_of(&self, user_id: i64) -> StoreResult<Option<Shop>> {
        let sql = format!("SELECT {SHOP_COLUMNS} FROM shops WHERE user_id = $1");
        Ok(sqlx::query_as::<_, Shop>(&sql).bind(user_id).fetch_optional(&self.pool).await?)
    }

    async fn set_shop_state(&self, user_id: i64, state: bool) -> StoreResult<Option<Shop>> {
        let sql = format!("UPDATE shops SET state = $1 WHERE user_id = $2 RETURNING {SHOP_COLUMNS}");
        Ok(sqlx::query_as::<_, Shop>(&sql).bind(state).bind(user_id).fetch_optional(&self.pool).await?)
    }

    async fn product_infos(&self, filter: ProductFilter) -> StoreResult<Vec<ProductInfoView>> {
        let sql = format!(
            "{INFO_SELECT} WHERE s.state AND ($1::BIGINT IS NULL OR pi.shop_id = $1) \
             AND ($2::BIGINT IS NULL OR p.category_id = $2) ORDER BY pi.id DESC"
        );
        let rows = sqlx::query_as::<_, InfoRow>(&sql)
            .bind(filter.shop_id)
            .bind(filter.category_id)
            .fetch_all(&self.pool)
            .await?;
        self.with_parameters(rows).await
    }

    async fn product_info(&self, id: i64) -> StoreResult<Option<ProductInfoView>> {
        let sql = format!("{INFO_SELECT} WHERE pi.id = $1");
        let rows = sqlx::query_as::<_, InfoRow>(&sql).bind(id).fetch_all(&self.pool).await?;
        Ok(self.with_parameters(rows).await?.pop())
    }

    async fn begin_import(&self) -> StoreResult<Box<dyn CatalogTx>> {
        Ok(Box::new(PgCatalogTx { tx: self.pool.begin().await? }))
    }

    async fn basket(&self, user_id: i64) -> StoreResult<Order> {
        sqlx::query(
            "INSERT INTO orders (user_id, state) VALUES ($1, 'basket') \
             ON CONFLICT (user_id) WHERE state = 'basket' DO NOTHING",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders o WHERE o.user_id = $1 AND o.state = 'basket'");
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound("basket"))?;
        self.load_order(row).await
    }

    async fn basket_view(&self, user_id: i64) -> StoreResult<Option<OrderView>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders o WHERE o.user_id = $1 AND o.state = 'basket'");
        let rows = sqlx::query_as::<_, OrderRow>(&sql).bind(user_id).fetch_all(&self.pool).await?;
        Ok(self.assemble(rows, None).await?.pop())
    }

    async fn order(&self, user_id: i64, order_id: i64) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders o WHERE o.user_id = $1 AND o.id = $2");
        match sqlx::query_as::<_, OrderRow>(&sql).bind(user_id).bind(order_id).fetch_optional(&self.pool).await? {
            Some(row) => Ok(Some(self.load_order(row).await?)),
            None => Ok(None),
        }
    }

    async fn offers(&self, product_info_ids: &[i64]) -> StoreResult<Vec<Offer>> {
        let rows: Vec<(i64, i64, bool)> = sqlx::query_as(
            "SELECT pi.id, pi.price, s.state FROM product_infos pi JOIN shops s ON s.id = pi.shop_id WHERE pi.id = ANY($1)",
        )
        .bind(product_info_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(product_info_id, price, shop_open)| Offer { product_info_id, price, shop_open })
            .collect())
    }

    async fn insert_items(&self, order_id: i64, items: &[NewItem]) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;
        lock_basket(&mut tx, order_id).await?;
        for item in items {
            sqlx::query("INSERT INTO order_items (order_id, product_info_id, quantity) VALUES ($1, $2, $3)")
                .bind(order_id)
                .bind(item.product_info_id)
                .bind(item.quantity)
                .execute(&mut *tx)
                .await
                .map_err(|e| write_error(e, &format!("product info {} is already in the basket", item.product_info_id)))?;
        }
        tx.commit().await?;
        Ok(items.len())
    }

    async fn update_quantities(&self, order_id: i64, items: &[(i64, i64)]) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        lock_basket(&mut tx, order_id).await?;
        let mut updated = 0;
        for (id, quantity) in items {
            updated += sqlx::query("UPDATE order_items SET quantity = $1 WHERE id = $2 AND order_id = $3")
                .bind(quantity)
                .bind(id)
                .bind(order_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_items(&self, order_id: i64, ids: &[i64]) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        lock_basket(&mut tx, order_id).await?;
        let done = sqlx::query("DELETE FROM order_items WHERE order_id = $1 AND id = ANY($2)")
            .bind(order_id)
            .bind(ids)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(done.rows_affected())
    }

    async fn place_order(&self, order: &Order) -> StoreResult<bool> {
        let done = sqlx::query(
            "UPDATE orders SET state = $1, contact_id = $2 WHERE id = $3 AND user_id = $4 AND state = 'basket'",
        )
        .bind(order.state().as_str())
        .bind(order.contact_id())
        .bind(order.id())
        .bind(order.user_id())
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, "order cannot be placed"))?;
        Ok(done.rows_affected() == 1)
    }

    async fn orders(&self, user_id: i64) -> StoreResult<Vec<OrderView>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders o WHERE o.user_id = $1 AND o.state <> 'basket' ORDER BY o.dt DESC, o.id DESC"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql).bind(user_id).fetch_all(&self.pool).await?;
        self.assemble(rows, None).await
    }

    async fn partner_orders(&self, user_id: i64) -> StoreResult<Vec<OrderView>> {
        let Some(shop) = self.shop_of(user_id).await? else { return Ok(vec![]) };
        let sql = format!(
            "SELECT DISTINCT {ORDER_COLUMNS} FROM orders o \
             JOIN order_items oi ON oi.order_id = o.id \
             JOIN product_infos pi ON pi.id = oi.product_info_id \
             WHERE pi.shop_id = $1 AND o.state <> 'basket' ORDER BY o.dt DESC, o.id DESC"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql).bind(shop.id).fetch_all(&self.pool).await?;
        self.assemble(rows, Some(shop.id)).await
    }
}

pub struct PgCatalogTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CatalogTx for PgCatalogTx {
    async fn upsert_shop(&mut self, user_id: i64, name: &str, url: Option<&str>) -> StoreResult<Shop> {
        let sql = format!(
            "INSERT INTO shops (name, url, user_id) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) DO UPDATE SET name = EXCLUDED.name, url = COALESCE(EXCLUDED.url, shops.url) \
             RETURNING {SHOP_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Shop>(&sql).bind(name).bind(url).bind(user_id).fetch_one(&mut *self.tx).await?)
    }

    async fn upsert_category(&mut self, id: i64, name: &str) -> StoreResult<()> {
        sqlx::query("INSERT INTO categories (id, name) VALUES ($1, $2) ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name")
            .bind(id)
            .bind(name)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn link_category(&mut self, category_id: i64, shop_id: i64) -> StoreResult<()> {
        sqlx::query("INSERT INTO shop_categories (shop_id, category_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(shop_id)
            .bind(category_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn product_id(&mut self, name: &str, category_id: i64) -> StoreResult<i64> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO products (name, category_id) VALUES ($1, $2) \
             ON CONFLICT (name, category_id) DO UPDATE SET name = EXCLUDED.name RETURNING id",
        )
        .bind(name)
        .bind(category_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn parameter_id(&mut self, name: &str) -> StoreResult<i64> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO parameters (name) VALUES ($1) ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name RETURNING id",
        )
        .bind(name)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn upsert_product_info(&mut self, row: &ProductInfoRow) -> StoreResult<i64> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO product_infos (model, external_id, product_id, shop_id, price, price_rrc, quantity) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (product_id, shop_id, external_id) DO UPDATE SET \
             model = EXCLUDED.model, price = EXCLUDED.price, price_rrc = EXCLUDED.price_rrc, quantity = EXCLUDED.quantity \
             RETURNING id",
        )
        .bind(&row.model)
        .bind(row.external_id)
        .bind(row.product_id)
        .bind(row.shop_id)
        .bind(row.price)
        .bind(row.price_rrc)
        .bind(row.quantity)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn replace_parameters(&mut self, product_info_id: i64, values: &[(i64, String)]) -> StoreResult<()> {
        sqlx::query("DELETE FROM product_parameters WHERE product_info_id = $1")
            .bind(product_info_id)
            .execute(&mut *self.tx)
            .await?;
        for (parameter_id, value) in values {
            sqlx::query("INSERT INTO product_parameters (product_info_id, parameter_id, value) VALUES ($1, $2, $3)")
                .bind(product_info_id)
                .bind(parameter_id)
                .bind(value)
                .execute(&mut *self.tx)
                .await?;
        }
        Ok(())
    }

    async fn remove_stale_product_infos(&mut self, shop_id: i64, keep: &[i64]) -> StoreResult<u64> {
        let done = sqlx::query("DELETE FROM product_infos WHERE shop_id = $1 AND NOT (id = ANY($2))")
            .bind(shop_id)
            .bind(keep)
            .execute(&mut *self.tx)
            .await?;
        Ok(done.rows_affected())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
