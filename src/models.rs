use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub shop_id: String,
    pub product_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shop {
    pub id: String,
    pub shop_name: String,
    #[serde(default)]
    pub tagline: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub contact_number: String,
    #[serde(default)]
    pub contact_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recipient {
    #[serde(alias = "email")]
    pub address: String,
    #[serde(alias = "name", default = "default_display_name")]
    pub display_name: String,
}

fn default_display_name() -> String {
    "Valued Customer".to_string()
}

impl Recipient {
    pub fn new(address: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            display_name: display_name.into(),
        }
    }

    /// Entries without an address can never be delivered to and are kept out
    /// of campaign snapshots.
    pub fn is_deliverable(&self) -> bool {
        !self.address.trim().is_empty()
    }
}

/// Product and shop pair a campaign generates content for.
#[derive(Debug, Clone)]
pub struct CampaignContext {
    pub product: Product,
    pub shop: Shop,
}

impl CampaignContext {
    pub fn new(product: Product, shop: Shop) -> Self {
        Self { product, shop }
    }

    pub fn describe(&self) -> String {
        let p = &self.product;
        let s = &self.shop;
        format!(
            "Product details:\n- name: {}\n- description: {}\n- price: {:.2}\n- quantity: {}\n\
             Shop details:\n- name: {}\n- tagline: {}\n- description: {}\n- address: {}\n\
             - contact number: {}\n- contact email: {}",
            p.product_name,
            p.description,
            p.price,
            p.quantity,
            s.shop_name,
            s.tagline,
            s.description,
            s.address,
            s.contact_number,
            s.contact_email,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarketingStrategy {
    pub target_audience: String,
    pub poster_design: String,
    pub gender: String,
    pub age: String,
    pub social_media: String,
    pub email_marketing: String,
    pub campaign_duration: String,
}

/// Persistent progress of one campaign. Keyed by `product_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignRecord {
    pub id: String,
    pub product_id: String,
    pub shop_id: String,
    pub target_count: u32,
    pub sent_count: u32,
    pub poster: Option<Vec<u8>>,
    pub copy: Option<String>,
    pub strategy: Option<MarketingStrategy>,
    pub created_at: DateTime<Utc>,
}

impl CampaignRecord {
    pub fn new(product_id: &str, shop_id: &str, target_count: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            product_id: product_id.to_string(),
            shop_id: shop_id.to_string(),
            target_count,
            sent_count: 0,
            poster: None,
            copy: None,
            strategy: None,
            created_at: Utc::now(),
        }
    }
}

/// Result view of a campaign. Poster bytes are served by their own route.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSummary {
    pub id: String,
    pub product_id: String,
    pub shop_id: String,
    pub target_count: u32,
    pub sent_count: u32,
    pub poster_ready: bool,
    pub copy: Option<String>,
    pub strategy: Option<MarketingStrategy>,
    pub created_at: DateTime<Utc>,
}

impl From<CampaignRecord> for CampaignSummary {
    fn from(record: CampaignRecord) -> Self {
        Self {
            id: record.id,
            product_id: record.product_id,
            shop_id: record.shop_id,
            target_count: record.target_count,
            sent_count: record.sent_count,
            poster_ready: record.poster.is_some(),
            copy: record.copy,
            strategy: record.strategy,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize)]
pub struct StartCampaignResponse {
    pub started: bool,
    pub campaign_id: Option<String>,
    pub reason: Option<String>,
}

impl StartCampaignResponse {
    pub fn started(campaign_id: String) -> Self {
        Self {
            started: true,
            campaign_id: Some(campaign_id),
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            started: false,
            campaign_id: None,
            reason: Some(reason.into()),
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize)]
pub struct CampaignStatusResponse {
    pub exists: bool,
    pub run_state: Option<crate::jobs::RunState>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
