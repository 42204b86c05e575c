use super::CampaignRun;
use crate::{
    generator::{ContentGenerator, GenerationError},
    models::{EmailMessage, Recipient},
    notify::NotificationSink,
    prompts,
    store::{Artifact, CampaignStore},
};
use std::{future::Future, sync::Arc, time::Instant};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, info, warn};

/// Executes the detached part of a campaign: content generation and email
/// fan-out. Failures are logged and never reach the caller.
#[derive(Clone)]
pub struct CampaignRunner {
    store: Arc<dyn CampaignStore>,
    generator: Arc<dyn ContentGenerator>,
    sink: Arc<dyn NotificationSink>,
    fanout_concurrency: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Stored,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub poster: StageStatus,
    pub copy: StageStatus,
    pub strategy: StageStatus,
    pub delivered: u32,
    pub failed: u32,
}

impl RunReport {
    pub fn artifacts_stored(&self) -> usize {
        [self.poster, self.copy, self.strategy]
            .iter()
            .filter(|status| **status == StageStatus::Stored)
            .count()
    }
}

impl CampaignRunner {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        generator: Arc<dyn ContentGenerator>,
        sink: Arc<dyn NotificationSink>,
        fanout_concurrency: usize,
    ) -> Self {
        Self {
            store,
            generator,
            sink,
            fanout_concurrency: fanout_concurrency.max(1),
        }
    }

    pub async fn execute(&self, run: CampaignRun) -> RunReport {
        let started = Instant::now();
        info!(
            target = "campaign.run",
            product_id = %run.product_id(),
            campaign_id = %run.campaign_id,
            recipients = run.recipients.len(),
            "campaign_run_started"
        );

        let context = &run.context;
        let (poster, copy, strategy, (delivered, failed)) = tokio::join!(
            self.stage(
                &run,
                "poster",
                self.generator.poster(context),
                Artifact::Poster
            ),
            self.stage(&run, "copy", self.generator.copy(context), Artifact::Copy),
            self.stage(
                &run,
                "strategy",
                self.generator.strategy(context),
                Artifact::Strategy
            ),
            self.fan_out(&run),
        );

        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed("run", elapsed_ms);
        info!(
            target = "campaign.run",
            product_id = %run.product_id(),
            delivered,
            failed,
            elapsed_ms = elapsed_ms as u64,
            "campaign_run_finished"
        );

        RunReport {
            poster,
            copy,
            strategy,
            delivered,
            failed,
        }
    }

    async fn stage<T, Fut>(
        &self,
        run: &CampaignRun,
        name: &'static str,
        fut: Fut,
        into_artifact: fn(T) -> Artifact,
    ) -> StageStatus
    where
        Fut: Future<Output = Result<T, GenerationError>>,
    {
        let started = Instant::now();
        let outcome = fut.await;
        crate::metrics::stage_elapsed(name, started.elapsed().as_millis());

        let value = match outcome {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    target = "campaign.run",
                    product_id = %run.product_id(),
                    stage = name,
                    error = %err,
                    "stage_failed"
                );
                return StageStatus::Failed;
            }
        };

        match self
            .store
            .set_artifact(run.product_id(), into_artifact(value))
            .await
        {
            Ok(true) => StageStatus::Stored,
            Ok(false) => {
                warn!(
                    target = "campaign.store",
                    product_id = %run.product_id(),
                    stage = name,
                    "artifact already present or record missing"
                );
                StageStatus::Failed
            }
            Err(err) => {
                warn!(
                    target = "campaign.store",
                    product_id = %run.product_id(),
                    stage = name,
                    error = %err,
                    "artifact_write_failed"
                );
                StageStatus::Failed
            }
        }
    }

    /// One attempt per snapshotted recipient, at most `fanout_concurrency`
    /// in flight. Returns `(delivered, failed)`.
    async fn fan_out(&self, run: &CampaignRun) -> (u32, u32) {
        let message = Arc::new(prompts::announcement(&run.context));
        let product_id: Arc<str> = Arc::from(run.product_id());
        let limiter = Arc::new(Semaphore::new(self.fanout_concurrency));
        let mut tasks = JoinSet::new();

        for recipient in run.recipients.iter().cloned() {
            let limiter = limiter.clone();
            let store = self.store.clone();
            let sink = self.sink.clone();
            let message = message.clone();
            let product_id = product_id.clone();
            tasks.spawn(async move {
                let _permit = limiter.acquire_owned().await.ok()?;
                Some(deliver_one(store, sink, &product_id, &recipient, &message).await)
            });
        }

        let (mut delivered, mut failed) = (0u32, 0u32);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(true)) => delivered += 1,
                Ok(_) => failed += 1,
                Err(err) => {
                    warn!(
                        target = "campaign.notify",
                        product_id = %product_id,
                        error = %err,
                        "delivery task aborted"
                    );
                    failed += 1;
                }
            }
        }
        (delivered, failed)
    }
}

async fn deliver_one(
    store: Arc<dyn CampaignStore>,
    sink: Arc<dyn NotificationSink>,
    product_id: &str,
    recipient: &Recipient,
    message: &EmailMessage,
) -> bool {
    if let Err(err) = sink.deliver(recipient, message).await {
        warn!(
            target = "campaign.notify",
            product_id,
            to = %recipient.address,
            error = %err,
            "delivery_failed"
        );
        crate::metrics::delivery_outcome(false);
        return false;
    }
    crate::metrics::delivery_outcome(true);

    match store.increment_sent(product_id).await {
        Ok(true) => {}
        Ok(false) => debug!(
            target = "campaign.store",
            product_id,
            "sent_count already at target"
        ),
        Err(err) => warn!(
            target = "campaign.store",
            product_id,
            error = %err,
            "sent_count increment failed"
        ),
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{CampaignContext, CampaignRecord},
        store::MemoryCampaignStore,
        testing::{FakeGenerator, FakeSink, sample_product, sample_shop},
    };

    fn run_for(recipients: usize) -> CampaignRun {
        CampaignRun {
            campaign_id: "c-1".into(),
            context: CampaignContext::new(sample_product("P1", "S1"), sample_shop("S1")),
            recipients: (0..recipients)
                .map(|i| Recipient::new(format!("user{i}@example.com"), format!("User {i}")))
                .collect(),
        }
    }

    fn runner(
        store: Arc<MemoryCampaignStore>,
        generator: FakeGenerator,
        sink: Arc<FakeSink>,
        fanout: usize,
    ) -> CampaignRunner {
        CampaignRunner::new(store, Arc::new(generator), sink, fanout)
    }

    #[tokio::test]
    async fn every_recipient_gets_one_attempt() {
        let store = Arc::new(MemoryCampaignStore::new());
        store.insert(CampaignRecord::new("P1", "S1", 12)).await.unwrap();
        let sink = Arc::new(FakeSink::new());

        let report = runner(store.clone(), FakeGenerator::ok(), sink.clone(), 3)
            .execute(run_for(12))
            .await;

        assert_eq!(report.delivered, 12);
        assert_eq!(report.failed, 0);
        assert_eq!(report.poster, StageStatus::Stored);
        assert_eq!(report.artifacts_stored(), 3);
        let mut delivered = sink.delivered();
        delivered.sort();
        delivered.dedup();
        assert_eq!(delivered.len(), 12);
        assert!(sink.max_in_flight() <= 3);
        assert_eq!(store.find("P1").await.unwrap().unwrap().sent_count, 12);
    }

    #[tokio::test]
    async fn sent_count_never_exceeds_target() {
        let store = Arc::new(MemoryCampaignStore::new());
        store.insert(CampaignRecord::new("P1", "S1", 2)).await.unwrap();
        let sink = Arc::new(FakeSink::new());

        let report = runner(store.clone(), FakeGenerator::ok(), sink, 4)
            .execute(run_for(5))
            .await;

        assert_eq!(report.delivered, 5);
        let record = store.find("P1").await.unwrap().unwrap();
        assert_eq!(record.sent_count, 2);
    }

    #[tokio::test]
    async fn failing_stage_leaves_field_absent() {
        let store = Arc::new(MemoryCampaignStore::new());
        store.insert(CampaignRecord::new("P1", "S1", 1)).await.unwrap();

        let report = runner(
            store.clone(),
            FakeGenerator::failing(&["strategy"]),
            Arc::new(FakeSink::new()),
            1,
        )
        .execute(run_for(1))
        .await;

        assert_eq!(report.strategy, StageStatus::Failed);
        assert_eq!(report.copy, StageStatus::Stored);
        let record = store.find("P1").await.unwrap().unwrap();
        assert!(record.strategy.is_none());
        assert!(record.poster.is_some());
        assert_eq!(record.sent_count, 1);
    }

    #[tokio::test]
    async fn announcement_reaches_sink() {
        let store = Arc::new(MemoryCampaignStore::new());
        store.insert(CampaignRecord::new("P1", "S1", 1)).await.unwrap();
        let sink = Arc::new(FakeSink::new());

        runner(store, FakeGenerator::ok(), sink.clone(), 1)
            .execute(run_for(1))
            .await;

        let subjects = sink.subjects();
        assert_eq!(subjects.len(), 1);
        assert!(subjects[0].starts_with("Introducing Our Latest Product: "));
    }
}
