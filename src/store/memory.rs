use super::{Artifact, CampaignStore, InsertOutcome, StoreError};
use crate::models::CampaignRecord;
use async_trait::async_trait;
use std::collections::{HashMap, hash_map::Entry};
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryCampaignStore {
    records: Mutex<HashMap<String, CampaignRecord>>,
}

impl MemoryCampaignStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[async_trait]
impl CampaignStore for MemoryCampaignStore {
    async fn insert(&self, record: CampaignRecord) -> Result<InsertOutcome, StoreError> {
        let mut guard = self.records.lock().await;
        match guard.entry(record.product_id.clone()) {
            Entry::Occupied(_) => Ok(InsertOutcome::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn find(&self, product_id: &str) -> Result<Option<CampaignRecord>, StoreError> {
        Ok(self.records.lock().await.get(product_id).cloned())
    }

    async fn exists(&self, product_id: &str) -> Result<bool, StoreError> {
        Ok(self.records.lock().await.contains_key(product_id))
    }

    async fn set_artifact(
        &self,
        product_id: &str,
        artifact: Artifact,
    ) -> Result<bool, StoreError> {
        let mut guard = self.records.lock().await;
        let Some(record) = guard.get_mut(product_id) else {
            return Ok(false);
        };
        let written = match artifact {
            Artifact::Poster(bytes) => set_once(&mut record.poster, bytes),
            Artifact::Copy(text) => set_once(&mut record.copy, text),
            Artifact::Strategy(strategy) => set_once(&mut record.strategy, strategy),
        };
        Ok(written)
    }

    async fn increment_sent(&self, product_id: &str) -> Result<bool, StoreError> {
        let mut guard = self.records.lock().await;
        match guard.get_mut(product_id) {
            Some(record) if record.sent_count < record.target_count => {
                record.sent_count += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T) -> bool {
    if slot.is_some() {
        return false;
    }
    *slot = Some(value);
    true
}
