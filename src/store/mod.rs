//! Campaign record persistence.
//!
//! Every mutation is an isolated partial update against a single record:
//! artifacts are written only while absent, and `sent_count` moves by atomic
//! single-step increments capped at `target_count`. No method reads the whole
//! record, edits it and writes it back.

pub mod memory;
pub mod redis_store;

use crate::models::{CampaignRecord, MarketingStrategy};
use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryCampaignStore;
pub use redis_store::RedisCampaignStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend failed: {0}")]
    Backend(String),
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// One sub-stage result destined for its own record field.
#[derive(Debug, Clone)]
pub enum Artifact {
    Poster(Vec<u8>),
    Copy(String),
    Strategy(MarketingStrategy),
}

impl Artifact {
    pub fn field(&self) -> &'static str {
        match self {
            Artifact::Poster(_) => "poster",
            Artifact::Copy(_) => "copy",
            Artifact::Strategy(_) => "strategy",
        }
    }
}

#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Create-if-absent keyed by `record.product_id`.
    async fn insert(&self, record: CampaignRecord) -> Result<InsertOutcome, StoreError>;

    async fn find(&self, product_id: &str) -> Result<Option<CampaignRecord>, StoreError>;

    async fn exists(&self, product_id: &str) -> Result<bool, StoreError>;

    /// Returns `false` when the field was already set or the record is missing.
    async fn set_artifact(&self, product_id: &str, artifact: Artifact)
    -> Result<bool, StoreError>;

    /// Adds one to `sent_count`. Returns `false` when the count already
    /// equals `target_count` or the record is missing.
    async fn increment_sent(&self, product_id: &str) -> Result<bool, StoreError>;
}
