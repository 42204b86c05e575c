pub mod runner;

pub use runner::CampaignRunner;

use crate::{
    catalog::{Catalog, CatalogError, RecipientDirectory},
    jobs::{JobQueue, QueueError, QueueSlot},
    models::{
        CampaignContext, CampaignRecord, CampaignStatusResponse, CampaignSummary, Recipient,
    },
    store::{CampaignStore, InsertOutcome, StoreError},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Everything a background run needs, captured when the campaign starts.
#[derive(Debug, Clone)]
pub struct CampaignRun {
    pub campaign_id: String,
    pub context: CampaignContext,
    /// Snapshot taken at start; later directory changes do not apply.
    pub recipients: Vec<Recipient>,
}

impl CampaignRun {
    pub fn product_id(&self) -> &str {
        &self.context.product.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedCampaign {
    pub campaign_id: String,
    pub target_count: u32,
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn CampaignStore>,
    catalog: Arc<dyn Catalog>,
    directory: Arc<dyn RecipientDirectory>,
    queue: JobQueue,
    recipient_limit: usize,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        catalog: Arc<dyn Catalog>,
        directory: Arc<dyn RecipientDirectory>,
        queue: JobQueue,
        recipient_limit: usize,
    ) -> Self {
        Self {
            store,
            catalog,
            directory,
            queue,
            recipient_limit,
        }
    }

    /// Creates the campaign record and schedules its run. Returns once the
    /// record exists; generation and delivery happen in the background.
    pub async fn start_campaign(
        &self,
        product_id: &str,
    ) -> Result<StartedCampaign, CampaignError> {
        let product = self.catalog.product(product_id).await?.ok_or_else(|| {
            CampaignError::not_found("product", format!("product `{product_id}` not found"))
        })?;
        let shop = self.catalog.shop(&product.shop_id).await?.ok_or_else(|| {
            CampaignError::not_found("shop", format!("shop `{}` not found", product.shop_id))
        })?;

        if self.store.exists(&product.id).await? {
            return Err(CampaignError::already_started(&product.id));
        }

        let recipients: Vec<Recipient> = self
            .directory
            .recipients(self.recipient_limit)
            .await?
            .into_iter()
            .filter(Recipient::is_deliverable)
            .take(self.recipient_limit)
            .collect();
        let target_count = u32::try_from(recipients.len())
            .map_err(|_| CampaignError::internal("snapshot", "recipient count overflow"))?;

        let slot = self.queue.reserve().map_err(|err| match err {
            QueueError::Full => CampaignError::busy(err.to_string()),
            QueueError::Closed => CampaignError::internal("enqueue", err.to_string()),
        })?;

        let record = CampaignRecord::new(&product.id, &shop.id, target_count);
        let campaign_id = record.id.clone();
        let run = CampaignRun {
            campaign_id: campaign_id.clone(),
            context: CampaignContext::new(product, shop),
            recipients,
        };

        // Completes even if this future is dropped mid-await.
        let outcome = tokio::spawn(commit(self.store.clone(), record, slot, run))
            .await
            .map_err(|err| CampaignError::internal("start", err.to_string()))??;
        if outcome == InsertOutcome::AlreadyExists {
            return Err(CampaignError::already_started(product_id));
        }

        info!(
            target = "campaign.api",
            product_id,
            campaign_id = %campaign_id,
            target_count,
            "campaign_created"
        );

        Ok(StartedCampaign {
            campaign_id,
            target_count,
        })
    }

    pub async fn status(&self, product_id: &str) -> Result<CampaignStatusResponse, CampaignError> {
        let exists = self.store.exists(product_id).await?;
        let run_state = if exists {
            self.queue.state(product_id).await
        } else {
            None
        };
        Ok(CampaignStatusResponse { exists, run_state })
    }

    pub async fn result(&self, product_id: &str) -> Result<CampaignSummary, CampaignError> {
        self.store
            .find(product_id)
            .await?
            .map(CampaignSummary::from)
            .ok_or_else(|| Self::no_campaign(product_id))
    }

    pub async fn poster(&self, product_id: &str) -> Result<Vec<u8>, CampaignError> {
        let record = self
            .store
            .find(product_id)
            .await?
            .ok_or_else(|| Self::no_campaign(product_id))?;
        record.poster.ok_or_else(|| {
            CampaignError::not_ready("poster", format!("no poster for product `{product_id}`"))
        })
    }

    fn no_campaign(product_id: &str) -> CampaignError {
        CampaignError::not_found(
            "campaign",
            format!("no campaign for product `{product_id}`"),
        )
    }
}

/// Writes the record and enqueues its run as one step: the run is sent only
/// when the insert created the record, otherwise the slot is released.
async fn commit(
    store: Arc<dyn CampaignStore>,
    record: CampaignRecord,
    slot: QueueSlot,
    run: CampaignRun,
) -> Result<InsertOutcome, StoreError> {
    let outcome = store.insert(record).await?;
    if outcome == InsertOutcome::Inserted {
        slot.send(run).await;
    }
    Ok(outcome)
}

#[derive(Debug, Error)]
#[error("campaign `{stage}` failed: {message}")]
pub struct CampaignError {
    stage: &'static str,
    message: String,
    kind: CampaignErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignErrorKind {
    NotFound,
    AlreadyStarted,
    NotReady,
    Busy,
    Internal,
}

impl CampaignErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            CampaignErrorKind::NotFound => "not_found",
            CampaignErrorKind::AlreadyStarted => "already_started",
            CampaignErrorKind::NotReady => "not_ready",
            CampaignErrorKind::Busy => "busy",
            CampaignErrorKind::Internal => "internal",
        }
    }
}

impl CampaignError {
    pub fn not_found(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, CampaignErrorKind::NotFound)
    }

    pub fn already_started(product_id: &str) -> Self {
        Self::new(
            "start",
            format!("campaign for product `{product_id}` already started"),
            CampaignErrorKind::AlreadyStarted,
        )
    }

    pub fn not_ready(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, CampaignErrorKind::NotReady)
    }

    pub fn busy(message: impl Into<String>) -> Self {
        Self::new("enqueue", message, CampaignErrorKind::Busy)
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, CampaignErrorKind::Internal)
    }

    fn new(stage: &'static str, message: impl Into<String>, kind: CampaignErrorKind) -> Self {
        Self {
            stage,
            message: message.into(),
            kind,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> CampaignErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

impl From<StoreError> for CampaignError {
    fn from(value: StoreError) -> Self {
        Self::internal("store", value.to_string())
    }
}

impl From<CatalogError> for CampaignError {
    fn from(value: CatalogError) -> Self {
        Self::internal("catalog", value.to_string())
    }
}
