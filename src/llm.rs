use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::ClientBuilder;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::prompts::PromptsConfig;

// Structs for the OpenAI-compatible /chat/completions endpoint (non-streaming)
#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// The completion collaborator. The pipeline only ever talks to this trait,
/// so tests can swap in a canned implementation.
#[async_trait]
pub trait CompletionClient {
    /// Sends one request built from the current buffer text and the composed
    /// instruction prompt, returning the model's raw reply.
    async fn complete(&self, buffer_text: &str, full_prompt: &str) -> Result<String>;
}

#[derive(Debug)]
pub struct OpenAiClient {
    config: LlmConfig,
    prompts: PromptsConfig,
    api_key: String,
}

impl OpenAiClient {
    /// Fails up front when no API key is configured, before any network call.
    pub fn new(config: &LlmConfig, prompts: &PromptsConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            anyhow::anyhow!(
                "No API key found. Set the OPENAI_API_KEY environment variable or add it to the config file."
            )
        })?;

        Ok(Self {
            config: config.clone(),
            prompts: prompts.clone(),
            api_key,
        })
    }
}

/// The fixed four-message template: system instructions, a digest of the
/// current buffer, a canned acknowledgment, then the composed request.
pub fn build_messages(
    prompts: &PromptsConfig,
    buffer_text: &str,
    full_prompt: &str,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage {
            role: "system".to_string(),
            content: prompts.get_system_instructions().to_string(),
        },
        ChatMessage {
            role: "user".to_string(),
            content: prompts.build_digest_prompt(buffer_text),
        },
        ChatMessage {
            role: "assistant".to_string(),
            content: "OK".to_string(),
        },
        ChatMessage {
            role: "user".to_string(),
            content: full_prompt.to_string(),
        },
    ]
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, buffer_text: &str, full_prompt: &str) -> Result<String> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .connect_timeout(Duration::from_secs(self.config.connect_timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        let request_payload = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: build_messages(&self.prompts, buffer_text, full_prompt),
            stream: false,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            top_p: self.config.top_p,
            frequency_penalty: self.config.frequency_penalty,
            presence_penalty: self.config.presence_penalty,
        };

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let response = client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    anyhow::anyhow!("Failed to connect to {}. Please check the endpoint and your network.", url)
                } else if e.is_timeout() {
                    anyhow::anyhow!("Request to the completion endpoint timed out")
                } else {
                    anyhow::anyhow!("Failed to send request to the completion endpoint: {}", e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            let error_msg = match status.as_u16() {
                401 => format!("Authentication failed; check your API key. Status {}: {}", status, error_text),
                404 => format!("Model or endpoint not found. Status {}: {}", status, error_text),
                429 => format!("Rate limited by the completion endpoint. Status {}: {}", status, error_text),
                500 => format!("Completion endpoint server error. Status {}: {}", status, error_text),
                _ => format!("Completion request failed with status {}: {}", status, error_text),
            };

            return Err(anyhow::anyhow!(error_msg));
        }

        let completion = response
            .json::<ChatCompletionResponse>()
            .await
            .context("failed to parse JSON response from the completion endpoint")?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("Completion response contained no choices"))?;

        Ok(content)
    }
}
