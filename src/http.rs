use reqwest::Client;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            connect_timeout_secs: 5,
        }
    }
}

impl HttpSettings {
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            timeout_secs: crate::config::positive(lookup, "HTTP_TIMEOUT_SECS")
                .unwrap_or(defaults.timeout_secs),
            connect_timeout_secs: crate::config::positive(lookup, "HTTP_CONNECT_TIMEOUT_SECS")
                .unwrap_or(defaults.connect_timeout_secs),
        }
    }
}

pub fn build_client(settings: HttpSettings) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
        .user_agent(concat!("campaign-api-rs/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| Client::new())
}
