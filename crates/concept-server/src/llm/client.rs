//! Minimal OpenAI-compatible chat-completions client.
//!
//! Every failure is classified into a [`ProviderError`] kind so the engine's
//! retry loop can tell a rate limit from a broken request.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tournament_engine::ProviderError;
use tracing::debug;

use crate::config::LlmConfig;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Shared HTTP client for one chat endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    url: String,
    config: LlmConfig,
}

impl ChatClient {
    pub fn new(config: LlmConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            url: config.completions_url(),
            config,
        })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Send one system + user exchange and return the reply text.
    pub async fn complete(
        &self,
        operation: &str,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let mut builder = self.http.post(&self.url).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_transport(operation, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(operation, status, &body));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            ProviderError::invalid_response(operation, format!("malformed completion body: {e}"))
        })?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::invalid_response(operation, "empty completion"))?;

        debug!(operation, chars = content.len(), "Completion received");
        Ok(content)
    }
}

fn classify_transport(operation: &str, error: &reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::timeout(operation, error.to_string())
    } else if error.is_builder() {
        ProviderError::permanent(operation, error.to_string())
    } else {
        ProviderError::transient(operation, error.to_string())
    }
}

/// Map a non-success HTTP status onto a provider error kind.
pub fn classify_status(operation: &str, status: StatusCode, body: &str) -> ProviderError {
    let message = format!("HTTP {status}: {}", truncate(body, 300));
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::rate_limited(operation, message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            ProviderError::timeout(operation, message)
        }
        s if s.is_server_error() => ProviderError::transient(operation, message),
        _ => ProviderError::permanent(operation, message),
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
