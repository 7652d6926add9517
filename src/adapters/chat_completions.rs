//! OpenAI-compatible chat completions adapter.
//!
//! Serves both Mistral and OpenAI: the two expose the same request and
//! response shape under `/v1/chat/completions` with bearer auth.

use super::{build_http_client, empty_response, endpoint, send_json, AdapterError, ModelAdapter};
use crate::config::{ModelConfig, Provider};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const MISTRAL_BASE_URL: &str = "https://api.mistral.ai";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

pub struct ChatCompletionsAdapter {
    client: Client,
    provider: Provider,
    default_base_url: &'static str,
}

impl ChatCompletionsAdapter {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn mistral(timeout: Duration) -> Result<Self, AdapterError> {
        Ok(Self {
            client: build_http_client(Provider::Mistral, timeout)?,
            provider: Provider::Mistral,
            default_base_url: MISTRAL_BASE_URL,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn openai(timeout: Duration) -> Result<Self, AdapterError> {
        Ok(Self {
            client: build_http_client(Provider::OpenAi, timeout)?,
            provider: Provider::OpenAi,
            default_base_url: OPENAI_BASE_URL,
        })
    }
}

impl ModelAdapter for ChatCompletionsAdapter {
    fn name(&self) -> &str {
        self.provider.as_str()
    }

    fn generate(&self, prompt: &str, config: &ModelConfig) -> Result<String, AdapterError> {
        let url = endpoint(config, self.default_base_url, "/v1/chat/completions");
        let request = self
            .client
            .post(url)
            .bearer_auth(&config.api_key)
            .json(&build_request(prompt, config));
        let response: ChatResponse = send_json(self.provider, request)?;
        extract_text(self.provider, response)
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
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
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
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Value,
}

/// Content is a plain string, or a list of typed chunks on newer Mistral models
fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(chunks) => chunks
            .iter()
            .filter_map(|chunk| chunk.get("text").and_then(Value::as_str))
            .collect(),
        _ => String::new(),
    }
}

fn extract_text(provider: Provider, response: ChatResponse) -> Result<String, AdapterError> {
    let Some(choice) = response.choices.into_iter().next() else {
        return Err(empty_response(provider, "no choices"));
    };

    let text = content_text(&choice.message.content);
    let text = text.trim();
    if text.is_empty() {
        let reason = choice.finish_reason.as_deref().unwrap_or("unknown");
        return Err(empty_response(provider, &format!("finish reason {reason}")));
    }
    Ok(text.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::adapters::test_server::{header, serve_once};
    use crate::adapters::ErrorKind;

    fn parse(json: &str) -> ChatResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_build_request_shape() {
        let config = ModelConfig::new("mistral", Provider::Mistral, "k");
        let value = serde_json::to_value(build_request("say hi", &config)).unwrap();
        assert_eq!(value["model"], "mistral-large-latest");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "say hi");
        assert_eq!(value["max_tokens"], 200);
        assert!(value.get("top_p").is_none());
    }

    #[test]
    fn test_build_request_openai_defaults_omit_decoding() {
        let config = ModelConfig::new("gpt", Provider::OpenAi, "k");
        let value = serde_json::to_value(build_request("x", &config)).unwrap();
        assert!(value.get("temperature").is_none());
        assert!(value.get("max_tokens").is_none());
    }

    #[test]
    fn test_extract_text_trims() {
        let response = parse(
            r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"  We was just chillin.\n"},"finish_reason":"stop"}]}"#,
        );
        assert_eq!(
            extract_text(Provider::Mistral, response).unwrap(),
            "We was just chillin."
        );
    }

    #[test]
    fn test_extract_text_chunked_content() {
        let response = parse(
            r#"{"choices":[{"message":{"content":[{"type":"text","text":"Ay, "},{"type":"text","text":"no cap."}]}}]}"#,
        );
        assert_eq!(extract_text(Provider::Mistral, response).unwrap(), "Ay, no cap.");
    }

    #[test]
    fn test_extract_text_empty_is_provider_error() {
        let response = parse(r#"{"choices":[{"message":{"content":null},"finish_reason":"length"}]}"#);
        let err = extract_text(Provider::OpenAi, response).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert!(err.message().contains("length"));

        let err = extract_text(Provider::OpenAi, parse(r#"{"choices":[]}"#)).unwrap_err();
        assert!(err.message().contains("no choices"));
    }

    #[test]
    fn test_generate_against_local_server() {
        let (base, captured) = serve_once(
            200,
            r#"{"choices":[{"message":{"role":"assistant","content":"Bet."}}]}"#,
        );
        let mut config = ModelConfig::new("mistral", Provider::Mistral, "m-key");
        config.base_url = Some(base);

        let adapter = ChatCompletionsAdapter::mistral(Duration::from_secs(5)).unwrap();
        assert_eq!(adapter.generate("prompt", &config).unwrap(), "Bet.");

        let (line, headers, _body) = captured.recv().unwrap();
        assert_eq!(line, "POST /v1/chat/completions HTTP/1.1");
        assert_eq!(header(&headers, "authorization"), Some("Bearer m-key"));
    }

    #[test]
    fn test_generate_rate_limited() {
        let (base, _captured) = serve_once(429, r#"{"message":"Requests rate limit exceeded"}"#);
        let mut config = ModelConfig::new("mistral", Provider::Mistral, "m-key");
        config.base_url = Some(base);

        let adapter = ChatCompletionsAdapter::mistral(Duration::from_secs(5)).unwrap();
        let err = adapter.generate("prompt", &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimit);
    }

    #[test]
    fn test_generate_malformed_body_is_provider_error() {
        let (base, _captured) = serve_once(200, "not json");
        let mut config = ModelConfig::new("gpt", Provider::OpenAi, "o-key");
        config.base_url = Some(base);

        let adapter = ChatCompletionsAdapter::openai(Duration::from_secs(5)).unwrap();
        let err = adapter.generate("prompt", &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
    }

    #[test]
    #[ignore = "Requires MISTRAL_API_KEY and network access"]
    fn test_mistral_live() {
        let key = std::env::var("MISTRAL_API_KEY").unwrap();
        let config = ModelConfig::new("mistral", Provider::Mistral, &key);
        let adapter = ChatCompletionsAdapter::mistral(Duration::from_secs(30)).unwrap();
        let text = adapter
            .generate("Paraphrase in one sentence: We was finna go", &config)
            .unwrap();
        assert!(!text.is_empty());
    }
}
