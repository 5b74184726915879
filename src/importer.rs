//! Partner price-list import
//!
//! Applies a [`PriceList`] to the catalog in a single [`CatalogTx`]: the
//! partner's shop, the declared categories, products, parameters and the
//! shop's ProductInfo set. ProductInfo rows keep their ids across imports when
//! (product, shop, external id) matches; rows missing from the document are
//! removed together with basket items pointing at them.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::domain::aggregates::User;
use crate::domain::price_list::{PriceList, PriceListError};
use crate::store::{ProductInfoRow, Store, StoreError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub shop_id: i64,
    pub categories: usize,
    pub products: usize,
    pub product_infos: usize,
    pub parameters: usize,
    pub removed: u64,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("only partners can upload price lists")]
    NotPartner,
    #[error(transparent)]
    PriceList(#[from] PriceListError),
    #[error("invalid price list url: {0}")]
    InvalidUrl(String),
    #[error("price list download failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub async fn import_price_list(store: &dyn Store, partner: &User, list: &PriceList) -> Result<ImportSummary, ImportError> {
    if !partner.is_partner() {
        return Err(ImportError::NotPartner);
    }
    list.validate()?;

    let mut tx = store.begin_import().await?;
    let shop = tx.upsert_shop(partner.id, list.shop.trim(), list.url.as_deref()).await?;

    for category in &list.categories {
        tx.upsert_category(category.id, category.name.trim()).await?;
        tx.link_category(category.id, shop.id).await?;
    }

    let mut parameter_ids: HashMap<&str, i64> = HashMap::new();
    for name in list.parameter_names() {
        parameter_ids.insert(name, tx.parameter_id(name).await?);
    }

    let mut products = BTreeSet::new();
    let mut keep = Vec::with_capacity(list.goods.len());
    for goods in &list.goods {
        let product_id = tx.product_id(goods.name.trim(), goods.category).await?;
        products.insert(product_id);
        let row = ProductInfoRow {
            shop_id: shop.id,
            product_id,
            external_id: goods.id,
            model: goods.model.clone(),
            price: goods.price,
            price_rrc: goods.price_rrc,
            quantity: goods.quantity,
        };
        let product_info_id = tx.upsert_product_info(&row).await?;
        let values: Vec<(i64, String)> = goods
            .parameters
            .iter()
            .filter_map(|(name, value)| parameter_ids.get(name.as_str()).map(|id| (*id, value.to_string())))
            .collect();
        tx.replace_parameters(product_info_id, &values).await?;
        keep.push(product_info_id);
    }

    let removed = tx.remove_stale_product_infos(shop.id, &keep).await?;
    tx.commit().await?;

    let summary = ImportSummary {
        shop_id: shop.id,
        categories: list.categories.len(),
        products: products.len(),
        product_infos: keep.len(),
        parameters: parameter_ids.len(),
        removed,
    };
    info!(partner = partner.id, shop = shop.id, goods = summary.product_infos, removed, "price list imported");
    Ok(summary)
}

/// Downloads price lists referenced by URL.
#[derive(Clone)]
pub struct PriceListFetcher {
    client: reqwest::Client,
}

impl PriceListFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self { client: reqwest::Client::builder().timeout(timeout).build()? })
    }

    pub async fn fetch(&self, raw_url: &str) -> Result<String, ImportError> {
        let url = reqwest::Url::parse(raw_url.trim()).map_err(|e| ImportError::InvalidUrl(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ImportError::InvalidUrl(format!("unsupported scheme {}", url.scheme())));
        }
        info!(%url, "downloading price list");
        let body = self.client.get(url).send().await?.error_for_status()?.text().await?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{NewItem, NewUser, ProductFilter, UserType};
    use crate::domain::price_list::SAMPLE;
    use crate::domain::value_objects::Email;
    use crate::store::MemoryStore;

    async fn partner(store: &MemoryStore, email: &str, user_type: UserType) -> User {
        store
            .create_user(NewUser {
                email: Email::new(email).unwrap(),
                first_name: "Test".into(),
                last_name: "Partner".into(),
                company: "Connected".into(),
                position: "Manager".into(),
                password_hash: "x".into(),
                user_type,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_import_creates_catalog() {
        let store = MemoryStore::new();
        let owner = partner(&store, "shop@example.com", UserType::Shop).await;
        let list = PriceList::from_yaml(SAMPLE).unwrap();

        let summary = import_price_list(&store, &owner, &list).await.unwrap();
        assert_eq!(summary.categories, 2);
        assert_eq!(summary.product_infos, 3);
        assert_eq!(summary.removed, 0);

        let shop = store.shop_of(owner.id).await.unwrap().unwrap();
        assert_eq!(shop.name, "Connected");
        assert!(shop.state);
        let infos = store.product_infos(ProductFilter { shop_id: Some(shop.id), category_id: Some(224) }).await.unwrap();
        assert!(!infos.is_empty());
        assert!(infos.iter().all(|i| i.product.category == "Smartphones"));
        assert!(infos.windows(2).all(|w| w[0].id > w[1].id));
    }

    #[tokio::test]
    async fn test_reimport_keeps_ids_and_drops_missing_goods() {
        let store = MemoryStore::new();
        let owner = partner(&store, "shop@example.com", UserType::Shop).await;
        let list = PriceList::from_yaml(SAMPLE).unwrap();
        import_price_list(&store, &owner, &list).await.unwrap();
        let before: Vec<i64> = store.product_infos(ProductFilter::default()).await.unwrap().iter().map(|i| i.id).collect();

        let again = import_price_list(&store, &owner, &list).await.unwrap();
        let after: Vec<i64> = store.product_infos(ProductFilter::default()).await.unwrap().iter().map(|i| i.id).collect();
        assert_eq!(before, after);
        assert_eq!(again.removed, 0);

        let mut trimmed = list.clone();
        let dropped = trimmed.goods.remove(0);
        trimmed.shop = "Connected Store".into();
        let summary = import_price_list(&store, &owner, &trimmed).await.unwrap();
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.shop_id, again.shop_id);
        let names: Vec<String> =
            store.product_infos(ProductFilter::default()).await.unwrap().into_iter().map(|i| i.product.name).collect();
        assert!(!names.contains(&dropped.name));
        assert_eq!(store.shop(summary.shop_id).await.unwrap().unwrap().name, "Connected Store");
    }

    #[tokio::test]
    async fn test_dropped_goods_leave_baskets() {
        let store = MemoryStore::new();
        let owner = partner(&store, "shop@example.com", UserType::Shop).await;
        let buyer = partner(&store, "buyer@example.com", UserType::Buyer).await;
        let list = PriceList::from_yaml(SAMPLE).unwrap();
        import_price_list(&store, &owner, &list).await.unwrap();

        let infos = store.product_infos(ProductFilter::default()).await.unwrap();
        let id_of = |name: &str| infos.iter().find(|i| i.product.name == name).map(|i| i.id).unwrap();
        let dropped = id_of(&list.goods[0].name);
        let kept = id_of(&list.goods[2].name);
        let basket = store.basket(buyer.id).await.unwrap();
        let items = [NewItem { product_info_id: dropped, quantity: 1 }, NewItem { product_info_id: kept, quantity: 2 }];
        store.insert_items(basket.id(), &items).await.unwrap();
        let before = store.basket_view(buyer.id).await.unwrap().unwrap();
        assert_eq!(before.total_sum, list.goods[0].price + 2 * list.goods[2].price);

        let mut trimmed = list.clone();
        trimmed.goods.remove(0);
        import_price_list(&store, &owner, &trimmed).await.unwrap();

        let after = store.basket_view(buyer.id).await.unwrap().unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.ordered_items.len(), 1);
        assert_eq!(after.ordered_items[0].product_info.id, kept);
        assert_eq!(after.total_sum, 2 * list.goods[2].price);
    }

    #[tokio::test]
    async fn test_buyers_cannot_import() {
        let store = MemoryStore::new();
        let buyer = partner(&store, "buyer@example.com", UserType::Buyer).await;
        let list = PriceList::from_yaml(SAMPLE).unwrap();
        assert!(matches!(import_price_list(&store, &buyer, &list).await, Err(ImportError::NotPartner)));
        assert!(store.categories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_http_urls() {
        let fetcher = PriceListFetcher::new(Duration::from_secs(1)).unwrap();
        assert!(matches!(fetcher.fetch("ftp://example.com/list.yaml").await, Err(ImportError::InvalidUrl(_))));
        assert!(matches!(fetcher.fetch("not a url").await, Err(ImportError::InvalidUrl(_))));
    }
}
