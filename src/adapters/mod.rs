//! Provider adapters for LLM text generation.
//!
//! Every provider sits behind the same contract, [`ModelAdapter::generate`]:
//! a prompt and a [`ModelConfig`] go in, generated text or a classified
//! [`AdapterError`] comes out. Provider-specific HTTP status codes and body
//! shapes are mapped onto four [`ErrorKind`]s so the batch runner can apply a
//! single retry policy.
//!
//! Adapters make exactly one HTTPS request per call and never retry.

mod anthropic;
mod chat_completions;
mod cohere;
mod gemini;

pub use anthropic::AnthropicAdapter;
pub use chat_completions::ChatCompletionsAdapter;
pub use cohere::CohereAdapter;
pub use gemini::GeminiAdapter;

use crate::config::{ModelConfig, Provider};
use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Classification of a failed generation call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Invalid or revoked key. Fatal for the model.
    #[serde(rename = "AuthError")]
    Auth,
    /// Provider throttling. Retryable with backoff.
    #[serde(rename = "RateLimitError")]
    RateLimit,
    /// Network or provider latency. Retryable.
    #[serde(rename = "TimeoutError")]
    Timeout,
    /// Unexpected status or malformed response. Retried once.
    #[serde(rename = "ProviderError")]
    Provider,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "AuthError",
            Self::RateLimit => "RateLimitError",
            Self::Timeout => "TimeoutError",
            Self::Provider => "ProviderError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by adapters, already classified
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("{provider}: authentication failed: {message}")]
    Auth { provider: String, message: String },

    #[error("{provider}: rate limited: {message}")]
    RateLimit { provider: String, message: String },

    #[error("{provider}: request timed out: {message}")]
    Timeout { provider: String, message: String },

    #[error("{provider}: provider error: {message}")]
    Provider { provider: String, message: String },
}

impl AdapterError {
    /// Build an error of the given kind
    #[must_use]
    pub fn new(kind: ErrorKind, provider: &str, message: impl Into<String>) -> Self {
        let provider = provider.to_string();
        let message = message.into();
        match kind {
            ErrorKind::Auth => Self::Auth { provider, message },
            ErrorKind::RateLimit => Self::RateLimit { provider, message },
            ErrorKind::Timeout => Self::Timeout { provider, message },
            ErrorKind::Provider => Self::Provider { provider, message },
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth { .. } => ErrorKind::Auth,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Provider { .. } => ErrorKind::Provider,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Auth { message, .. }
            | Self::RateLimit { message, .. }
            | Self::Timeout { message, .. }
            | Self::Provider { message, .. } => message,
        }
    }
}

/// Uniform text-generation contract implemented once per provider
pub trait ModelAdapter {
    /// Provider label used in logs and records
    fn name(&self) -> &str;

    /// Generate text for `prompt` using the model described by `config`.
    ///
    /// # Errors
    ///
    /// Returns a classified [`AdapterError`] when the call cannot be completed.
    fn generate(&self, prompt: &str, config: &ModelConfig) -> Result<String, AdapterError>;
}

/// Construct the adapter for a provider
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn adapter_for(
    provider: Provider,
    timeout: Duration,
) -> Result<Box<dyn ModelAdapter>, AdapterError> {
    Ok(match provider {
        Provider::Gemini => Box::new(GeminiAdapter::new(timeout)?),
        Provider::Mistral => Box::new(ChatCompletionsAdapter::mistral(timeout)?),
        Provider::OpenAi => Box::new(ChatCompletionsAdapter::openai(timeout)?),
        Provider::Cohere => Box::new(CohereAdapter::new(timeout)?),
        Provider::Anthropic => Box::new(AnthropicAdapter::new(timeout)?),
    })
}

/// Build a blocking HTTP client with a bounded per-request timeout
pub(crate) fn build_http_client(provider: Provider, timeout: Duration) -> Result<Client, AdapterError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .user_agent(concat!("codeswitch-bench/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            AdapterError::new(
                ErrorKind::Provider,
                provider.as_str(),
                format!("failed to build HTTP client: {e}"),
            )
        })
}

/// Join a configured or default base URL with an API path
pub(crate) fn endpoint(config: &ModelConfig, default_base: &str, path: &str) -> String {
    let base = config.base_url.as_deref().unwrap_or(default_base);
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Send a request and decode a JSON success body, classifying every failure
pub(crate) fn send_json<T: DeserializeOwned>(
    provider: Provider,
    request: RequestBuilder,
) -> Result<T, AdapterError> {
    let response = request
        .send()
        .map_err(|e| classify_transport(provider, &e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        return Err(classify_status(provider, status.as_u16(), &body));
    }

    let body = response
        .text()
        .map_err(|e| classify_transport(provider, &e))?;
    serde_json::from_str(&body).map_err(|e| {
        AdapterError::new(
            ErrorKind::Provider,
            provider.as_str(),
            format!("failed to parse response: {e}"),
        )
    })
}

/// Map an HTTP error status (and body) to a classified error
#[must_use]
pub fn classify_status(provider: Provider, status: u16, body: &str) -> AdapterError {
    let kind = match status {
        401 | 403 => ErrorKind::Auth,
        400 if mentions_invalid_key(body) => ErrorKind::Auth,
        429 | 503 | 529 => ErrorKind::RateLimit,
        408 | 504 => ErrorKind::Timeout,
        _ => ErrorKind::Provider,
    };
    AdapterError::new(
        kind,
        provider.as_str(),
        format!("HTTP {status}: {}", truncate(body.trim(), 300)),
    )
}

fn classify_transport(provider: Provider, err: &reqwest::Error) -> AdapterError {
    let kind = if err.is_timeout() || err.is_connect() {
        ErrorKind::Timeout
    } else {
        ErrorKind::Provider
    };
    AdapterError::new(kind, provider.as_str(), err.to_string())
}

// Gemini reports bad keys as 400 rather than 401
fn mentions_invalid_key(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("api_key_invalid")
        || lower.contains("api key not valid")
        || lower.contains("invalid api key")
        || lower.contains("invalid_api_key")
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Error for a successful call that produced no usable text
pub(crate) fn empty_response(provider: Provider, detail: &str) -> AdapterError {
    AdapterError::new(
        ErrorKind::Provider,
        provider.as_str(),
        format!("response contained no text ({detail})"),
    )
}

/// One-shot HTTP server on loopback for adapter tests
#[cfg(test)]
pub(crate) mod test_server {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// Captured request: (request line, lowercase headers, body)
    pub type Captured = (String, Vec<(String, String)>, String);

    /// Serve a single canned response; returns the base URL and the captured request
    #[allow(clippy::unwrap_used)]
    pub fn serve_once(status: u16, body: &str) -> (String, mpsc::Receiver<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let body = body.to_string();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();

            let mut headers = Vec::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((k, v)) = line.split_once(':') {
                    let key = k.trim().to_lowercase();
                    let value = v.trim().to_string();
                    if key == "content-length" {
                        content_length = value.parse().unwrap_or(0);
                    }
                    headers.push((key, value));
                }
            }

            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).unwrap();

            let response = format!(
                "HTTP/1.1 {status} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let mut stream = stream;
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();

            tx.send((
                request_line.trim_end().to_string(),
                headers,
                String::from_utf8_lossy(&request_body).to_string(),
            ))
            .ok();
        });

        (format!("http://{addr}"), rx)
    }

    /// Look up a captured header by lowercase name
    pub fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
        headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}
