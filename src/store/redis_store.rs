use super::{Artifact, CampaignStore, InsertOutcome, StoreError};
use crate::models::{CampaignRecord, MarketingStrategy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use redis::{AsyncCommands, Script, aio::MultiplexedConnection};
use std::collections::HashMap;
use tokio::sync::OnceCell;

// Each record is one hash at `campaign:{product_id}`. Writes that must not
// race go through scripts so they stay single round-trip and atomic.

static CREATE: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call('EXISTS', KEYS[1]) == 1 then return 0 end
redis.call('HSET', KEYS[1], 'id', ARGV[1], 'product_id', ARGV[2], 'shop_id', ARGV[3],
  'target_count', ARGV[4], 'sent_count', 0, 'created_at', ARGV[5])
return 1
"#,
    )
});

static SET_ONCE: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call('EXISTS', KEYS[1]) == 0 then return 0 end
return redis.call('HSETNX', KEYS[1], ARGV[1], ARGV[2])
"#,
    )
});

static INCREMENT_SENT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local target = tonumber(redis.call('HGET', KEYS[1], 'target_count'))
if not target then return -1 end
local sent = tonumber(redis.call('HGET', KEYS[1], 'sent_count') or '0')
if sent >= target then return -1 end
return redis.call('HINCRBY', KEYS[1], 'sent_count', 1)
"#,
    )
});

pub struct RedisCampaignStore {
    client: redis::Client,
    conn: OnceCell<MultiplexedConnection>,
}

impl RedisCampaignStore {
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(backend)?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
        })
    }

    /// One multiplexed connection, opened on first use and cloned per call.
    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        self.conn
            .get_or_try_init(|| async {
                self.client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(backend)
            })
            .await
            .cloned()
    }
}

fn record_key(product_id: &str) -> String {
    format!("campaign:{product_id}")
}

fn backend(err: redis::RedisError) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[async_trait]
impl CampaignStore for RedisCampaignStore {
    async fn insert(&self, record: CampaignRecord) -> Result<InsertOutcome, StoreError> {
        let mut conn = self.connection().await?;
        let mut invocation = CREATE.key(record_key(&record.product_id));
        invocation
            .arg(&record.id)
            .arg(&record.product_id)
            .arg(&record.shop_id)
            .arg(record.target_count)
            .arg(record.created_at.to_rfc3339());
        let created: i64 = invocation.invoke_async(&mut conn).await.map_err(backend)?;
        Ok(if created == 1 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::AlreadyExists
        })
    }

    async fn find(&self, product_id: &str) -> Result<Option<CampaignRecord>, StoreError> {
        let mut conn = self.connection().await?;
        let raw: HashMap<String, Vec<u8>> = conn
            .hgetall(record_key(product_id))
            .await
            .map_err(backend)?;
        if raw.is_empty() {
            return Ok(None);
        }
        decode_record(raw).map(Some)
    }

    async fn exists(&self, product_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        conn.exists(record_key(product_id)).await.map_err(backend)
    }

    async fn set_artifact(
        &self,
        product_id: &str,
        artifact: Artifact,
    ) -> Result<bool, StoreError> {
        let field = artifact.field();
        let value = encode_artifact(artifact)?;
        let mut conn = self.connection().await?;
        let mut invocation = SET_ONCE.key(record_key(product_id));
        invocation.arg(field).arg(value);
        let written: i64 = invocation.invoke_async(&mut conn).await.map_err(backend)?;
        Ok(written == 1)
    }

    async fn increment_sent(&self, product_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        let invocation = INCREMENT_SENT.key(record_key(product_id));
        let count: i64 = invocation.invoke_async(&mut conn).await.map_err(backend)?;
        Ok(count >= 0)
    }
}

fn encode_artifact(artifact: Artifact) -> Result<Vec<u8>, StoreError> {
    match artifact {
        Artifact::Poster(bytes) => Ok(bytes),
        Artifact::Copy(text) => Ok(text.into_bytes()),
        Artifact::Strategy(strategy) => {
            serde_json::to_vec(&strategy).map_err(|err| StoreError::Corrupt(err.to_string()))
        }
    }
}

fn decode_record(mut raw: HashMap<String, Vec<u8>>) -> Result<CampaignRecord, StoreError> {
    let created_at = text(&raw, "created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|err| StoreError::Corrupt(format!("created_at: {err}")))?
        .with_timezone(&Utc);
    let strategy = match raw.remove("strategy") {
        Some(bytes) => Some(
            serde_json::from_slice::<MarketingStrategy>(&bytes)
                .map_err(|err| StoreError::Corrupt(format!("strategy: {err}")))?,
        ),
        None => None,
    };
    let copy = match raw.remove("copy") {
        Some(bytes) => Some(
            String::from_utf8(bytes).map_err(|err| StoreError::Corrupt(format!("copy: {err}")))?,
        ),
        None => None,
    };
    Ok(CampaignRecord {
        id: text(&raw, "id")?,
        product_id: text(&raw, "product_id")?,
        shop_id: text(&raw, "shop_id")?,
        target_count: count(&raw, "target_count")?,
        sent_count: count(&raw, "sent_count")?,
        poster: raw.remove("poster"),
        copy,
        strategy,
        created_at,
    })
}

fn text(raw: &HashMap<String, Vec<u8>>, field: &str) -> Result<String, StoreError> {
    let bytes = raw
        .get(field)
        .ok_or_else(|| StoreError::Corrupt(format!("missing {field}")))?;
    String::from_utf8(bytes.clone()).map_err(|err| StoreError::Corrupt(format!("{field}: {err}")))
}

fn count(raw: &HashMap<String, Vec<u8>>, field: &str) -> Result<u32, StoreError> {
    text(raw, field)?
        .parse()
        .map_err(|err| StoreError::Corrupt(format!("{field}: {err}")))
}
