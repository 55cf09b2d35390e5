use crate::error::{ReconcileError, Result};
use crate::extractor::{InferenceRequest, InferenceService};
use crate::llm::prompts::{build_user_prompt, SYSTEM_PROMPT};
use crate::llm::types::*;
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use std::time::Duration;

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

/// Chat-completions client for Groq and other OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct GroqClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GroqClient {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_timeout(api_key, Duration::from_secs(60))
    }

    pub fn with_timeout(api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: GROQ_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GROQ_API_KEY").map_err(|_| {
            ReconcileError::InvalidConfig("GROQ_API_KEY is not set".to_string())
        })?;
        Self::new(api_key)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn build_request(&self, request: &InferenceRequest) -> Result<ChatCompletionRequest> {
        Ok(ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(build_user_prompt(request)?),
            ],
            temperature: 0.0,
            response_format: Some(ResponseFormat::json_object()),
        })
    }

    pub async fn chat(&self, payload: &ChatCompletionRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(ReconcileError::Inference(format!(
                "Groq API Error (status {}): {}",
                status, err_text
            )));
        }

        let body: ChatCompletionResponse = res.json().await?;
        let content = body
            .first_content()
            .ok_or_else(|| ReconcileError::Inference("No content returned".to_string()))?
            .trim()
            .to_string();

        let preview: String = content.chars().take(400).collect();
        debug!("Model output preview: {}", preview);
        Ok(content)
    }
}

#[async_trait]
impl InferenceService for GroqClient {
    async fn complete(&self, request: &InferenceRequest) -> Result<String> {
        let payload = self.build_request(request)?;
        self.chat(&payload).await
    }
}
