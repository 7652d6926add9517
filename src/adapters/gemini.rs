//! Google Gemini `generateContent` adapter.

use super::{build_http_client, empty_response, endpoint, send_json, AdapterError, ModelAdapter};
use crate::config::{ModelConfig, Provider};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Harm categories and thresholds sent with every request
const SAFETY_SETTINGS: [(&str, &str); 4] = [
    ("HARM_CATEGORY_HARASSMENT", "BLOCK_ONLY_HIGH"),
    ("HARM_CATEGORY_HATE_SPEECH", "BLOCK_ONLY_HIGH"),
    ("HARM_CATEGORY_SEXUALLY_EXPLICIT", "BLOCK_MEDIUM_AND_ABOVE"),
    ("HARM_CATEGORY_DANGEROUS_CONTENT", "BLOCK_MEDIUM_AND_ABOVE"),
];

pub struct GeminiAdapter {
    client: Client,
}

impl GeminiAdapter {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, AdapterError> {
        Ok(Self {
            client: build_http_client(Provider::Gemini, timeout)?,
        })
    }
}

impl ModelAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        Provider::Gemini.as_str()
    }

    fn generate(&self, prompt: &str, config: &ModelConfig) -> Result<String, AdapterError> {
        let url = endpoint(
            config,
            DEFAULT_BASE_URL,
            &format!("/v1beta/models/{}:generateContent", config.model),
        );

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&config.api_key).map_err(|e| {
                AdapterError::new(
                    super::ErrorKind::Auth,
                    Provider::Gemini.as_str(),
                    format!("invalid API key header: {e}"),
                )
            })?,
        );

        let request = self
            .client
            .post(url)
            .headers(headers)
            .json(&build_request(prompt, config));
        let response: GenerateContentResponse = send_json(Provider::Gemini, request)?;
        extract_text(response)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    candidate_count: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

fn build_request(prompt: &str, config: &ModelConfig) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: prompt.to_string(),
            }],
        }],
        generation_config: GenerationConfig {
            temperature: config.temperature,
            max_output_tokens: config.max_tokens,
            top_p: config.top_p,
            top_k: config.top_k,
            candidate_count: 1,
        },
        safety_settings: SAFETY_SETTINGS
            .iter()
            .map(|&(category, threshold)| SafetySetting {
                category,
                threshold,
            })
            .collect(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

fn extract_text(response: GenerateContentResponse) -> Result<String, AdapterError> {
    if let Some(reason) = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(AdapterError::new(
            super::ErrorKind::Provider,
            Provider::Gemini.as_str(),
            format!("prompt blocked: {reason}"),
        ));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(empty_response(Provider::Gemini, "no candidates"));
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        let reason = candidate.finish_reason.as_deref().unwrap_or("unknown");
        return Err(empty_response(
            Provider::Gemini,
            &format!("finish reason {reason}"),
        ));
    }
    Ok(text.to_string())
}
