//! Fakes and fixtures shared by the unit tests.

use crate::{
    campaign::{CampaignRunner, Orchestrator},
    catalog::SeedCatalog,
    generator::{ContentGenerator, GenerationError},
    jobs::{JobQueue, RunState},
    models::{CampaignContext, EmailMessage, MarketingStrategy, Product, Recipient, Shop},
    notify::{DeliveryError, NotificationSink},
    store::MemoryCampaignStore,
};
use async_trait::async_trait;
use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

#[derive(Default)]
pub struct FakeGenerator {
    failing: HashSet<&'static str>,
    delay: Option<Duration>,
    panics: bool,
}

impl FakeGenerator {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failing(stages: &[&'static str]) -> Self {
        Self {
            failing: stages.iter().copied().collect(),
            ..Self::default()
        }
    }

    /// Every stage sleeps for `delay` before answering.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::default()
        }
    }

    async fn check(&self, stage: &'static str) -> Result<(), GenerationError> {
        if self.panics {
            panic!("{stage} generator blew up");
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(stage) {
            return Err(GenerationError::InvalidResponse(format!("{stage} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentGenerator for FakeGenerator {
    async fn poster(&self, _context: &CampaignContext) -> Result<Vec<u8>, GenerationError> {
        self.check("poster").await?;
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn copy(&self, context: &CampaignContext) -> Result<String, GenerationError> {
        self.check("copy").await?;
        Ok(format!("Meet {}", context.product.product_name))
    }

    async fn strategy(
        &self,
        _context: &CampaignContext,
    ) -> Result<MarketingStrategy, GenerationError> {
        self.check("strategy").await?;
        Ok(MarketingStrategy {
            target_audience: "remote workers".into(),
            poster_design: "warm minimal".into(),
            gender: "all".into(),
            age: "25-40".into(),
            social_media: "instagram".into(),
            email_marketing: "launch announcement".into(),
            campaign_duration: "2 weeks".into(),
        })
    }
}

/// Records deliveries; addresses listed in `failing` are rejected.
#[derive(Default)]
pub struct FakeSink {
    failing: HashSet<String>,
    delivered: Mutex<Vec<String>>,
    subjects: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(addresses: &[&str]) -> Self {
        Self {
            failing: addresses.iter().map(|a| a.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.subjects.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSink for FakeSink {
    async fn deliver(
        &self,
        recipient: &Recipient,
        message: &EmailMessage,
    ) -> Result<(), DeliveryError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&recipient.address) {
            return Err(DeliveryError::Transport("mailbox unavailable".into()));
        }
        self.delivered
            .lock()
            .unwrap()
            .push(recipient.address.clone());
        self.subjects.lock().unwrap().push(message.subject.clone());
        Ok(())
    }
}

pub fn sample_product(id: &str, shop_id: &str) -> Product {
    Product {
        id: id.into(),
        shop_id: shop_id.into(),
        product_name: "Aurora Desk Lamp".into(),
        description: "Dimmable LED lamp with USB-C charging.".into(),
        price: 49.5,
        quantity: 120,
    }
}

pub fn sample_shop(id: &str) -> Shop {
    Shop {
        id: id.into(),
        shop_name: "Brightside".into(),
        tagline: "Light for every desk".into(),
        description: "Independent lighting studio.".into(),
        address: "12 Harbour St".into(),
        contact_number: "+1 555 0100".into(),
        contact_email: "hello@brightside.test".into(),
    }
}

/// Product `P1` in shop `S1` plus `recipients` users `user{i}@example.com`.
pub fn seeded_catalog(recipients: usize) -> Arc<SeedCatalog> {
    let users = (0..recipients)
        .map(|i| Recipient::new(format!("user{i}@example.com"), format!("User {i}")))
        .collect();
    Arc::new(SeedCatalog::from_parts(
        vec![sample_product("P1", "S1")],
        vec![sample_shop("S1")],
        users,
    ))
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub store: Arc<MemoryCampaignStore>,
    pub sink: Arc<FakeSink>,
    queue: JobQueue,
}

impl Harness {
    pub fn new(catalog: Arc<SeedCatalog>, generator: FakeGenerator, sink: FakeSink) -> Self {
        Self::with_queue(catalog, generator, sink, 8, 2)
    }

    pub fn with_queue(
        catalog: Arc<SeedCatalog>,
        generator: FakeGenerator,
        sink: FakeSink,
        capacity: usize,
        concurrency: usize,
    ) -> Self {
        let store = Arc::new(MemoryCampaignStore::new());
        let sink = Arc::new(sink);
        let runner = CampaignRunner::new(store.clone(), Arc::new(generator), sink.clone(), 2);
        let (queue, _worker) = JobQueue::spawn(runner, capacity, concurrency);
        let orchestrator = Orchestrator::new(
            store.clone(),
            catalog.clone(),
            catalog,
            queue.clone(),
            1000,
        );
        Self {
            orchestrator,
            store,
            sink,
            queue,
        }
    }

    pub async fn wait_finished(&self, product_id: &str) -> RunState {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(state @ RunState::Finished { .. }) = self.queue.state(product_id).await
                {
                    return state;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("campaign run finished")
    }
}
