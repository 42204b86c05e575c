use crate::{
    llm::{LlmClient, LlmError, LlmMessage},
    models::{CampaignContext, MarketingStrategy},
    prompts,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generator not configured: {0}")]
    Unconfigured(String),
    #[error("generation request failed: {0}")]
    Http(String),
    #[error("unusable generator output: {0}")]
    InvalidResponse(String),
}

impl From<LlmError> for GenerationError {
    fn from(value: LlmError) -> Self {
        match value {
            LlmError::MissingGateway => Self::Unconfigured("missing gateway url".into()),
            LlmError::Http(msg) => Self::Http(msg),
            LlmError::InvalidResponse(msg) => Self::InvalidResponse(msg),
        }
    }
}

/// Produces the three campaign artifacts. Calls are independent; any of them
/// may fail without affecting the others.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn poster(&self, context: &CampaignContext) -> Result<Vec<u8>, GenerationError>;
    async fn copy(&self, context: &CampaignContext) -> Result<String, GenerationError>;
    async fn strategy(
        &self,
        context: &CampaignContext,
    ) -> Result<MarketingStrategy, GenerationError>;
}

pub struct TensorZeroGenerator {
    llm: Arc<LlmClient>,
}

impl TensorZeroGenerator {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ContentGenerator for TensorZeroGenerator {
    async fn poster(&self, context: &CampaignContext) -> Result<Vec<u8>, GenerationError> {
        let function = &self.llm.config().poster_function;
        let bytes = self
            .llm
            .image(function, &[LlmMessage::user(prompts::poster_prompt(context))])
            .await?;
        Ok(bytes)
    }

    async fn copy(&self, context: &CampaignContext) -> Result<String, GenerationError> {
        let function = &self.llm.config().copy_function;
        let response = self
            .llm
            .chat(function, &[LlmMessage::user(prompts::copy_prompt(context))])
            .await?;
        let text = response.text.trim();
        if text.is_empty() {
            return Err(GenerationError::InvalidResponse("empty blog post".into()));
        }
        Ok(text.to_string())
    }

    async fn strategy(
        &self,
        context: &CampaignContext,
    ) -> Result<MarketingStrategy, GenerationError> {
        let function = &self.llm.config().strategy_function;
        let response = self
            .llm
            .chat(
                function,
                &[LlmMessage::user(prompts::strategy_prompt(context))],
            )
            .await?;
        parse_strategy(&response.text)
    }
}

pub fn parse_strategy(raw: &str) -> Result<MarketingStrategy, GenerationError> {
    serde_json::from_str(json_object(raw))
        .map_err(|err| GenerationError::InvalidResponse(format!("strategy json: {err}")))
}

/// Span from the first `{` to the last `}`. Models wrap the object in code
/// fences or a sentence of chatter on either side.
fn json_object(raw: &str) -> &str {
    let trimmed = raw.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}
