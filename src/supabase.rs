use crate::{
    catalog::{Catalog, CatalogError, RecipientDirectory},
    config::non_empty,
    http::{HttpSettings, build_client},
    models::{Product, Recipient, Shop},
};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use urlencoding::encode;

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub base_url: String,
    pub service_key: String,
}

impl SupabaseConfig {
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Option<Self> {
        let base_url = non_empty(lookup, "SUPABASE_URL")?;
        let service_key = non_empty(lookup, "SUPABASE_SERVICE_ROLE_KEY")
            .or_else(|| non_empty(lookup, "SUPABASE_SERVICE_KEY"))
            .or_else(|| non_empty(lookup, "SUPABASE_KEY"))?;
        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
        })
    }
}

/// Catalog and recipient directory backed by the marketplace's PostgREST tables.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    config: SupabaseConfig,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct UserRow {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl SupabaseClient {
    pub fn new(config: SupabaseConfig, http: HttpSettings) -> Self {
        Self {
            config,
            http: build_client(http),
        }
    }

    fn table_url(&self, table: &str, query: &str) -> String {
        format!("{}/rest/v1/{table}?{query}", self.config.base_url)
    }

    async fn fetch_rows<T: DeserializeOwned>(&self, url: String) -> Result<Vec<T>, CatalogError> {
        let response = self
            .http
            .get(url)
            .header("apikey", &self.config.service_key)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.service_key),
            )
            .send()
            .await
            .map_err(|err| CatalogError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(CatalogError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|err| CatalogError::Deserialize(err.to_string()))
    }

    async fn fetch_one<T: DeserializeOwned>(
        &self,
        table: &str,
        id: &str,
    ) -> Result<Option<T>, CatalogError> {
        let url = self.table_url(table, &format!("id=eq.{}&select=*&limit=1", encode(id)));
        let mut rows: Vec<T> = self.fetch_rows(url).await?;
        Ok(rows.pop())
    }
}

#[async_trait]
impl Catalog for SupabaseClient {
    async fn product(&self, id: &str) -> Result<Option<Product>, CatalogError> {
        self.fetch_one("products", id).await
    }

    async fn shop(&self, id: &str) -> Result<Option<Shop>, CatalogError> {
        self.fetch_one("shops", id).await
    }
}

#[async_trait]
impl RecipientDirectory for SupabaseClient {
    async fn recipients(&self, limit: usize) -> Result<Vec<Recipient>, CatalogError> {
        let url = self.table_url(
            "users",
            &format!("select=email,name&email=not.is.null&limit={limit}"),
        );
        let rows: Vec<UserRow> = self.fetch_rows(url).await?;
        Ok(recipients_from_rows(rows))
    }
}

fn recipients_from_rows(rows: Vec<UserRow>) -> Vec<Recipient> {
    rows.into_iter()
        .filter_map(|row| {
            let address = row.email?;
            let name = row
                .name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| "Valued Customer".to_string());
            Some(Recipient::new(address, name))
        })
        .filter(Recipient::is_deliverable)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_requires_url_and_key() {
        let only_url = |key: &str| (key == "SUPABASE_URL").then(|| "https://db.test/".to_string());
        assert!(SupabaseConfig::from_lookup(&only_url).is_none());

        let both = |key: &str| match key {
            "SUPABASE_URL" => Some("https://db.test/".to_string()),
            "SUPABASE_KEY" => Some("secret".to_string()),
            _ => None,
        };
        let config = SupabaseConfig::from_lookup(&both).expect("config");
        assert_eq!(config.base_url, "https://db.test");
    }

    #[test]
    fn product_lookup_url_escapes_id() {
        let client = SupabaseClient::new(
            SupabaseConfig {
                base_url: "https://db.test".into(),
                service_key: "k".into(),
            },
            HttpSettings::default(),
        );
        let url = client.table_url("products", &format!("id=eq.{}", encode("a b&c")));
        assert_eq!(url, "https://db.test/rest/v1/products?id=eq.a%20b%26c");
    }

    #[test]
    fn user_rows_become_deliverable_recipients() {
        let rows: Vec<UserRow> = serde_json::from_str(
            r#"[{"email":"ana@example.com","name":"Ana"},{"email":null,"name":"X"},{"email":" ","name":"Y"},{"email":"bo@example.com","name":""}]"#,
        )
        .unwrap();
        assert_eq!(
            recipients_from_rows(rows),
            vec![
                Recipient::new("ana@example.com", "Ana"),
                Recipient::new("bo@example.com", "Valued Customer"),
            ]
        );
    }
}
