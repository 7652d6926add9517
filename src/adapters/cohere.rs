//! Cohere v2 chat adapter.

use super::{build_http_client, empty_response, endpoint, send_json, AdapterError, ModelAdapter};
use crate::config::{ModelConfig, Provider};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.cohere.com";

pub struct CohereAdapter {
    client: Client,
}

impl CohereAdapter {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, AdapterError> {
        Ok(Self {
            client: build_http_client(Provider::Cohere, timeout)?,
        })
    }
}

impl ModelAdapter for CohereAdapter {
    fn name(&self) -> &str {
        Provider::Cohere.as_str()
    }

    fn generate(&self, prompt: &str, config: &ModelConfig) -> Result<String, AdapterError> {
        let url = endpoint(config, DEFAULT_BASE_URL, "/v2/chat");
        let request = self
            .client
            .post(url)
            .bearer_auth(&config.api_key)
            .json(&build_request(prompt, config));
        let response: ChatResponse = send_json(Provider::Cohere, request)?;
        extract_text(response)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(rename = "p", skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(rename = "k", skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

fn build_request<'a>(prompt: &'a str, config: &'a ModelConfig) -> ChatRequest<'a> {
    ChatRequest {
        model: &config.model,
        messages: vec![ChatMessage {
            role: "user",
            content: prompt,
        }],
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        top_p: config.top_p,
        top_k: config.top_k,
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

fn extract_text(response: ChatResponse) -> Result<String, AdapterError> {
    let text: String = response
        .message
        .map(|message| {
            message
                .content
                .into_iter()
                .filter(|block| block.kind == "text")
                .filter_map(|block| block.text)
                .collect()
        })
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        let reason = response.finish_reason.as_deref().unwrap_or("unknown");
        return Err(empty_response(
            Provider::Cohere,
            &format!("finish reason {reason}"),
        ));
    }
    Ok(text.to_string())
}
