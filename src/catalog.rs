use crate::models::{Product, Recipient, Shop};
use async_trait::async_trait;
use serde::Deserialize;
use std::{collections::HashMap, path::Path};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response: {0}")]
    Deserialize(String),
    #[error("invalid seed file: {0}")]
    Seed(String),
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn product(&self, id: &str) -> Result<Option<Product>, CatalogError>;
    async fn shop(&self, id: &str) -> Result<Option<Shop>, CatalogError>;
}

#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    /// Deliverable recipients, at most `limit` of them.
    async fn recipients(&self, limit: usize) -> Result<Vec<Recipient>, CatalogError>;
}

#[derive(Debug, Default, Deserialize)]
struct SeedFile {
    #[serde(default)]
    products: Vec<Product>,
    #[serde(default)]
    shops: Vec<Shop>,
    #[serde(default)]
    users: Vec<Recipient>,
}

/// In-process catalog loaded from a YAML seed file.
#[derive(Default)]
pub struct SeedCatalog {
    products: RwLock<HashMap<String, Product>>,
    shops: RwLock<HashMap<String, Shop>>,
    recipients: RwLock<Vec<Recipient>>,
}

impl SeedCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(products: Vec<Product>, shops: Vec<Shop>, users: Vec<Recipient>) -> Self {
        Self {
            products: RwLock::new(
                products
                    .into_iter()
                    .map(|product| (product.id.clone(), product))
                    .collect(),
            ),
            shops: RwLock::new(shops.into_iter().map(|shop| (shop.id.clone(), shop)).collect()),
            recipients: RwLock::new(users),
        }
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, CatalogError> {
        let seed: SeedFile =
            serde_yaml::from_str(raw).map_err(|err| CatalogError::Seed(err.to_string()))?;
        Ok(Self::from_parts(seed.products, seed.shops, seed.users))
    }

    /// Missing file yields an empty catalog; a malformed one is an error.
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                let catalog = Self::from_yaml_str(&raw)?;
                info!(
                    target = "campaign.catalog",
                    path = %path.display(),
                    "loaded seed catalog"
                );
                Ok(catalog)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    target = "campaign.catalog",
                    path = %path.display(),
                    "seed catalog not found; starting empty"
                );
                Ok(Self::new())
            }
            Err(err) => Err(CatalogError::Seed(format!("{}: {err}", path.display()))),
        }
    }

    #[cfg(test)]
    pub async fn insert_product(&self, product: Product) {
        self.products
            .write()
            .await
            .insert(product.id.clone(), product);
    }

    #[cfg(test)]
    pub async fn add_recipient(&self, recipient: Recipient) {
        self.recipients.write().await.push(recipient);
    }
}

#[async_trait]
impl Catalog for SeedCatalog {
    async fn product(&self, id: &str) -> Result<Option<Product>, CatalogError> {
        Ok(self.products.read().await.get(id).cloned())
    }

    async fn shop(&self, id: &str) -> Result<Option<Shop>, CatalogError> {
        Ok(self.shops.read().await.get(id).cloned())
    }
}

#[async_trait]
impl RecipientDirectory for SeedCatalog {
    async fn recipients(&self, limit: usize) -> Result<Vec<Recipient>, CatalogError> {
        Ok(self
            .recipients
            .read()
            .await
            .iter()
            .filter(|recipient| recipient.is_deliverable())
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r#"
products:
  - id: p1
    shop_id: s1
    product_name: Desk Lamp
    price: 19.99
shops:
  - id: s1
    shop_name: Brightside
users:
  - email: ana@example.com
    name: Ana
  - email: ""
    name: Ghost
  - email: bo@example.com
"#;

    #[tokio::test]
    async fn seed_yaml_resolves_entities() {
        let catalog = SeedCatalog::from_yaml_str(SEED).expect("seed");
        let product = catalog.product("p1").await.unwrap().expect("product");
        assert_eq!(product.shop_id, "s1");
        assert_eq!(product.quantity, 0);
        assert!(catalog.shop("s1").await.unwrap().is_some());
        assert!(catalog.product("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn directory_skips_blank_addresses_and_honours_limit() {
        let catalog = SeedCatalog::from_yaml_str(SEED).expect("seed");
        let all = catalog.recipients(10).await.unwrap();
        assert_eq!(
            all,
            vec![
                Recipient::new("ana@example.com", "Ana"),
                Recipient::new("bo@example.com", "Valued Customer"),
            ]
        );
        assert_eq!(catalog.recipients(1).await.unwrap().len(), 1);
    }

    #[test]
    fn malformed_seed_is_an_error() {
        assert!(matches!(
            SeedCatalog::from_yaml_str("products: 12"),
            Err(CatalogError::Seed(_))
        ));
    }

    #[tokio::test]
    async fn bundled_seed_is_consistent() {
        let catalog = SeedCatalog::from_yaml_str(include_str!("../seed/catalog.yaml")).unwrap();
        let product = catalog.product("lamp-001").await.unwrap().expect("product");
        assert!(catalog.shop(&product.shop_id).await.unwrap().is_some());
        assert_eq!(catalog.recipients(1000).await.unwrap().len(), 3);
    }

    #[test]
    fn missing_seed_file_is_empty() {
        let catalog = SeedCatalog::from_path(Path::new("does/not/exist.yaml"));
        assert!(catalog.is_ok());
    }
}
