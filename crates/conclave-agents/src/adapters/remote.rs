//! Remote HTTP API adapter.
//!
//! One shared `reqwest::Client`; the request and response shapes follow the
//! descriptor's [`ApiStyle`]:
//!
//! | Style       | Auth header                     | Completion path                    |
//! |-------------|---------------------------------|------------------------------------|
//! | `Anthropic` | `x-api-key`                     | `content[].text`                   |
//! | `OpenAi`    | `Authorization: Bearer`         | `choices[0].message.content`       |
//! | `Gemini`    | `x-goog-api-key`                | `candidates[0].content.parts[].text` |
//!
//! Status classification: 401/403 auth, 429 rate limited (with `retry-after`),
//! 5xx and transport errors network, anything else malformed.

use std::time::Duration;

use async_trait::async_trait;
use coordination::errors::{FailureKind, InvocationFailure};
use coordination::invocation::InvocationRequest;
use coordination::registry::{ApiStyle, ProviderConfig, ProviderKind};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Credentials, ProviderAdapter};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;
/// Longest slice of an error body kept in a failure message.
const ERROR_BODY_LIMIT: usize = 300;

#[derive(Debug, Clone)]
pub struct RemoteAdapter {
    http: reqwest::Client,
    credentials: Credentials,
}

impl RemoteAdapter {
    pub fn new(http: reqwest::Client, credentials: Credentials) -> Self {
        Self { http, credentials }
    }

    async fn call(
        &self,
        request: &InvocationRequest,
        deadline: Duration,
    ) -> Result<String, InvocationFailure> {
        let model_id = request.model_id();
        let ProviderConfig::RemoteApi {
            api_style,
            endpoint,
            model,
            api_key_env,
        } = request.model.provider()
        else {
            return Err(InvocationFailure::new(
                FailureKind::InvalidModelConfig,
                model_id,
                "descriptor is not a remote API model",
            ));
        };

        let api_key = match api_key_env {
            Some(name) => Some(self.credentials.get(name).ok_or_else(|| {
                InvocationFailure::new(
                    FailureKind::AuthError,
                    model_id,
                    format!("credential {name} is not set"),
                )
            })?),
            None => None,
        };

        let url = request_url(*api_style, endpoint, model);
        let body = request_body(*api_style, model, request);
        let mut builder = self.http.post(&url).timeout(deadline).json(&body);
        builder = match (*api_style, api_key) {
            (ApiStyle::Anthropic, key) => {
                let builder = builder.header("anthropic-version", ANTHROPIC_VERSION);
                match key {
                    Some(key) => builder.header("x-api-key", key),
                    None => builder,
                }
            }
            (ApiStyle::OpenAi, Some(key)) => builder.bearer_auth(key),
            (ApiStyle::Gemini, Some(key)) => builder.header("x-goog-api-key", key),
            (_, None) => builder,
        };

        debug!(model_id, style = %api_style, url = %url, "sending completion request");
        let response = builder
            .send()
            .await
            .map_err(|e| transport_failure(model_id, &e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(status_failure(model_id, status, &text, retry_after));
        }

        let text = response
            .text()
            .await
            .map_err(|e| transport_failure(model_id, &e))?;
        let value: Value = serde_json::from_str(&text).map_err(|e| {
            InvocationFailure::new(
                FailureKind::MalformedResponse,
                model_id,
                format!("response is not JSON: {e}"),
            )
        })?;
        completion_text(*api_style, &value).ok_or_else(|| {
            InvocationFailure::new(
                FailureKind::MalformedResponse,
                model_id,
                format!("no completion text in response: {}", truncate(&text)),
            )
        })
    }
}

#[async_trait]
impl ProviderAdapter for RemoteAdapter {
    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::RemoteApi
    }

    async fn invoke(
        &self,
        request: &InvocationRequest,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, InvocationFailure> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(InvocationFailure::cancelled(request.model_id())),
            outcome = self.call(request, deadline) => outcome,
        }
    }
}

fn request_url(style: ApiStyle, endpoint: &str, model: &str) -> String {
    match style {
        ApiStyle::Gemini => format!("{}/{}:generateContent", endpoint.trim_end_matches('/'), model),
        ApiStyle::Anthropic | ApiStyle::OpenAi => endpoint.to_string(),
    }
}

/// Serialize prompt and context into the provider's request shape.
pub fn request_body(style: ApiStyle, model: &str, request: &InvocationRequest) -> Value {
    let text = request.render();
    let options = &request.options;
    match style {
        ApiStyle::Anthropic => {
            let mut body = json!({
                "model": model,
                "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
                "messages": [{ "role": "user", "content": text }],
            });
            if let Some(t) = options.temperature {
                body["temperature"] = json!(t);
            }
            body
        }
        ApiStyle::OpenAi => {
            let mut body = json!({
                "model": model,
                "messages": [{ "role": "user", "content": text }],
            });
            if let Some(max) = options.max_tokens {
                body["max_tokens"] = json!(max);
            }
            if let Some(t) = options.temperature {
                body["temperature"] = json!(t);
            }
            body
        }
        ApiStyle::Gemini => {
            let mut config = serde_json::Map::new();
            if let Some(max) = options.max_tokens {
                config.insert("maxOutputTokens".into(), json!(max));
            }
            if let Some(t) = options.temperature {
                config.insert("temperature".into(), json!(t));
            }
            let mut body = json!({
                "contents": [{ "role": "user", "parts": [{ "text": text }] }],
            });
            if !config.is_empty() {
                body["generationConfig"] = Value::Object(config);
            }
            body
        }
    }
}

/// Pull the completion out of a decoded response. `None` when absent or blank.
pub fn completion_text(style: ApiStyle, value: &Value) -> Option<String> {
    let text = match style {
        ApiStyle::Anthropic => join_text(value["content"].as_array()?),
        ApiStyle::OpenAi => value["choices"][0]["message"]["content"].as_str()?.to_string(),
        ApiStyle::Gemini => join_text(value["candidates"][0]["content"]["parts"].as_array()?),
    };
    (!text.trim().is_empty()).then_some(text)
}

fn join_text(parts: &[Value]) -> String {
    parts
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect::<Vec<_>>()
        .join("")
}

fn transport_failure(model_id: &str, err: &reqwest::Error) -> InvocationFailure {
    let message = if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else if err.is_decode() || err.is_body() {
        return InvocationFailure::new(
            FailureKind::MalformedResponse,
            model_id,
            format!("unreadable response body: {err}"),
        );
    } else {
        format!("request failed: {err}")
    };
    InvocationFailure::new(FailureKind::NetworkError, model_id, message)
}

fn status_failure(
    model_id: &str,
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
) -> InvocationFailure {
    let kind = match status.as_u16() {
        401 | 403 => FailureKind::AuthError,
        429 => FailureKind::RateLimited,
        500..=599 => FailureKind::NetworkError,
        _ => FailureKind::MalformedResponse,
    };
    let failure = InvocationFailure::new(kind, model_id, format!("HTTP {status}: {}", truncate(body)));
    match (kind, retry_after) {
        (FailureKind::RateLimited, Some(wait)) => failure.with_retry_after(wait),
        _ => failure,
    }
}

/// `retry-after` in delta-seconds. HTTP-date values are ignored.
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn truncate(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}
