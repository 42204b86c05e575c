use crate::{
    config::{non_empty, positive},
    models::{EmailMessage, Recipient},
    prompts,
};
use async_trait::async_trait;
use lettre::{
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid address `{address}`: {reason}")]
    Address { address: String, reason: String },
    #[error("could not build message: {0}")]
    Build(String),
    #[error("transport failed: {0}")]
    Transport(String),
}

/// Delivers one message to one recipient.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(
        &self,
        recipient: &Recipient,
        message: &EmailMessage,
    ) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub timeout_secs: u64,
}

impl SmtpConfig {
    /// `None` unless `SMTP_HOST` is set. Sender defaults to the login user.
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Option<Self> {
        let host = non_empty(lookup, "SMTP_HOST")?;
        let username = non_empty(lookup, "SMTP_USER");
        let from = non_empty(lookup, "SMTP_FROM")
            .or_else(|| username.clone())
            .unwrap_or_else(|| format!("no-reply@{host}"));
        Some(Self {
            port: positive(lookup, "SMTP_PORT").unwrap_or(587),
            password: non_empty(lookup, "SMTP_PASS"),
            timeout_secs: positive(lookup, "SMTP_TIMEOUT_SECS").unwrap_or(20),
            host,
            username,
            from,
        })
    }
}

pub struct SmtpSink {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpSink {
    pub fn new(config: &SmtpConfig) -> Result<Self, DeliveryError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|err| DeliveryError::Transport(err.to_string()))?
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|err| DeliveryError::Address {
                address: config.from.clone(),
                reason: err.to_string(),
            })?;
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl NotificationSink for SmtpSink {
    async fn deliver(
        &self,
        recipient: &Recipient,
        message: &EmailMessage,
    ) -> Result<(), DeliveryError> {
        let email = build_message(&self.from, recipient, message)?;
        self.transport
            .send(email)
            .await
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;
        Ok(())
    }
}

fn build_message(
    from: &Mailbox,
    recipient: &Recipient,
    message: &EmailMessage,
) -> Result<Message, DeliveryError> {
    let address = recipient
        .address
        .trim()
        .parse::<Address>()
        .map_err(|err| DeliveryError::Address {
            address: recipient.address.clone(),
            reason: err.to_string(),
        })?;
    let to = Mailbox::new(Some(recipient.display_name.clone()), address);
    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(message.subject.clone())
        .header(ContentType::TEXT_PLAIN)
        .body(prompts::personalize(&recipient.display_name, &message.body))
        .map_err(|err| DeliveryError::Build(err.to_string()))
}

/// Used when no SMTP relay is configured: logs the message and reports it delivered.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(
        &self,
        recipient: &Recipient,
        message: &EmailMessage,
    ) -> Result<(), DeliveryError> {
        info!(
            target = "campaign.notify",
            to = %recipient.address,
            subject = %message.subject,
            "delivery_logged"
        );
        Ok(())
    }
}
