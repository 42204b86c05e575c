use crate::{
    http::HttpSettings, llm::LlmConfig, notify::SmtpConfig, supabase::SupabaseConfig,
};
use std::{path::PathBuf, str::FromStr};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub body_limit: usize,
    pub queue_capacity: usize,
    pub campaign_concurrency: usize,
    pub fanout_concurrency: usize,
    pub recipient_limit: usize,
    pub redis_url: Option<String>,
    pub catalog_seed_path: PathBuf,
    pub http: HttpSettings,
    pub llm: LlmConfig,
    pub smtp: Option<SmtpConfig>,
    pub supabase: Option<SupabaseConfig>,
    /// Required as `X-Metrics-Key` on `/metrics` when set.
    pub metrics_key: Option<String>,
    /// Required as `X-Docs-Key` on `/openapi.json` when set.
    pub openapi_key: Option<String>,
}

impl AppConfig {
    /// Reads process env. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Self {
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        Self {
            port: positive(lookup, "PORT").unwrap_or(8000),
            body_limit: positive(lookup, "REQUEST_MAX_BYTES").unwrap_or(256 * 1024),
            queue_capacity: positive(lookup, "QUEUE_CAPACITY").unwrap_or(64),
            campaign_concurrency: positive(lookup, "CAMPAIGN_CONCURRENCY").unwrap_or(4),
            fanout_concurrency: positive(lookup, "FANOUT_CONCURRENCY").unwrap_or(4),
            recipient_limit: positive(lookup, "RECIPIENT_LIMIT").unwrap_or(1000),
            redis_url: non_empty(lookup, "REDIS_URL"),
            catalog_seed_path: non_empty(lookup, "CATALOG_SEED_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("seed/catalog.yaml")),
            http: HttpSettings::from_lookup(lookup),
            llm: LlmConfig::from_lookup(lookup),
            smtp: SmtpConfig::from_lookup(lookup),
            supabase: SupabaseConfig::from_lookup(lookup),
            metrics_key: non_empty(lookup, "METRICS_KEY"),
            openapi_key: non_empty(lookup, "OPENAPI_KEY"),
        }
    }
}

/// Parsed value of `key`, ignoring blanks, parse failures and zero.
pub fn positive<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr + PartialOrd + Default,
{
    lookup(key)
        .and_then(|value| value.trim().parse::<T>().ok())
        .filter(|value| *value > T::default())
}

pub fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
