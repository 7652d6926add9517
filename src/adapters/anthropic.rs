//! Anthropic Messages API adapter.

use super::{
    build_http_client, empty_response, endpoint, send_json, AdapterError, ErrorKind, ModelAdapter,
};
use crate::config::{ModelConfig, Provider};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicAdapter {
    client: Client,
}

impl AnthropicAdapter {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, AdapterError> {
        Ok(Self {
            client: build_http_client(Provider::Anthropic, timeout)?,
        })
    }
}

impl ModelAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        Provider::Anthropic.as_str()
    }

    fn generate(&self, prompt: &str, config: &ModelConfig) -> Result<String, AdapterError> {
        let url = endpoint(config, DEFAULT_BASE_URL, "/v1/messages");

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&config.api_key).map_err(|e| {
                AdapterError::new(
                    ErrorKind::Auth,
                    Provider::Anthropic.as_str(),
                    format!("invalid API key header: {e}"),
                )
            })?,
        );

        let request = self
            .client
            .post(url)
            .headers(headers)
            .json(&build_request(prompt, config));
        let response: MessagesResponse = send_json(Provider::Anthropic, request)?;
        extract_text(response)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

fn build_request<'a>(prompt: &'a str, config: &'a ModelConfig) -> MessagesRequest<'a> {
    MessagesRequest {
        model: &config.model,
        max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        messages: vec![Message {
            role: "user",
            content: prompt,
        }],
        temperature: config.temperature,
        top_p: config.top_p,
        top_k: config.top_k,
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

fn extract_text(response: MessagesResponse) -> Result<String, AdapterError> {
    let text: String = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect();

    let text = text.trim();
    if text.is_empty() {
        let reason = response.stop_reason.as_deref().unwrap_or("unknown");
        return Err(empty_response(
            Provider::Anthropic,
            &format!("stop reason {reason}"),
        ));
    }
    Ok(text.to_string())
}
