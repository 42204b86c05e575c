use crate::http::{HttpSettings, build_client};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub gateway_url: String,
    pub api_key: Option<String>,
    pub copy_function: String,
    pub strategy_function: String,
    pub poster_function: String,
    pub model: Option<String>,
}

impl LlmConfig {
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        use crate::config::non_empty;
        Self {
            gateway_url: non_empty(lookup, "TENSORZERO_GATEWAY_URL")
                .unwrap_or_else(|| "http://localhost:3000".into()),
            api_key: non_empty(lookup, "TENSORZERO_API_KEY"),
            copy_function: non_empty(lookup, "TENSORZERO_COPY_FUNCTION")
                .unwrap_or_else(|| "campaign_blog_post".into()),
            strategy_function: non_empty(lookup, "TENSORZERO_STRATEGY_FUNCTION")
                .unwrap_or_else(|| "campaign_strategy".into()),
            poster_function: non_empty(lookup, "TENSORZERO_POSTER_FUNCTION")
                .unwrap_or_else(|| "campaign_poster".into()),
            model: non_empty(lookup, "TENSORZERO_MODEL"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing gateway url")]
    MissingGateway,
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

impl LlmMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug)]
pub struct LlmResponse {
    pub text: String,
    #[allow(dead_code)]
    pub usage: Option<LlmUsage>,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
pub struct LlmUsage {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

pub struct LlmClient {
    http: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig, http: HttpSettings) -> Self {
        Self {
            http: build_client(http),
            config,
        }
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Runs `function_name` and returns its first text block.
    pub async fn chat(
        &self,
        function_name: &str,
        messages: &[LlmMessage],
    ) -> Result<LlmResponse, LlmError> {
        let payload = self.infer(function_name, messages).await?;
        let text = first_text(&payload.content)
            .ok_or_else(|| LlmError::InvalidResponse("missing text".into()))?;
        Ok(LlmResponse {
            text,
            usage: payload.usage,
        })
    }

    /// Runs `function_name` and decodes its first inline image block.
    pub async fn image(
        &self,
        function_name: &str,
        messages: &[LlmMessage],
    ) -> Result<Vec<u8>, LlmError> {
        let payload = self.infer(function_name, messages).await?;
        first_image(&payload.content)
    }

    async fn infer(
        &self,
        function_name: &str,
        messages: &[LlmMessage],
    ) -> Result<InferenceResponse, LlmError> {
        let gateway = self.config.gateway_url.trim().trim_end_matches('/');
        if gateway.is_empty() {
            return Err(LlmError::MissingGateway);
        }

        let body = InferenceRequest {
            function_name: function_name.to_string(),
            model_name: self.config.model.clone(),
            input: InferenceInput {
                messages: messages.to_vec(),
            },
        };

        let mut request = self.http.post(format!("{gateway}/inference")).json(&body);

        if let Some(key) = &self.config.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| LlmError::Http(err.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::Http(format!("HTTP {}", response.status())));
        }

        response
            .json()
            .await
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))
    }
}

fn first_text(content: &[ResponseContent]) -> Option<String> {
    content
        .iter()
        .find(|item| item.r#type == "text")
        .and_then(|item| item.text.clone())
}

fn first_image(content: &[ResponseContent]) -> Result<Vec<u8>, LlmError> {
    let encoded = content
        .iter()
        .find(|item| item.r#type == "image")
        .and_then(|item| item.data.as_deref())
        .ok_or_else(|| LlmError::InvalidResponse("missing image".into()))?;
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|err| LlmError::InvalidResponse(format!("image payload: {err}")))?;
    if bytes.is_empty() {
        return Err(LlmError::InvalidResponse("empty image".into()));
    }
    Ok(bytes)
}

#[derive(Debug, Serialize)]
struct InferenceRequest {
    function_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_name: Option<String>,
    input: InferenceInput,
}

#[derive(Debug, Serialize)]
struct InferenceInput {
    messages: Vec<LlmMessage>,
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    content: Vec<ResponseContent>,
    #[serde(default)]
    usage: Option<LlmUsage>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    r#type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    data: Option<String>,
}
