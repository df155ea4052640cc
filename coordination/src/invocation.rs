//! Invocation requests and results exchanged with the dispatcher.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::InvocationFailure;
use crate::registry::ModelDescriptor;

/// One block of context (file excerpt, prior turn, peer output) sent with a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ContextBlock {
    /// Label shown to the model, e.g. a file path.
    pub label: String,
    pub content: String,
}

impl ContextBlock {
    pub fn new(label: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            content: content.into(),
        }
    }
}

/// Per-call knobs forwarded to the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InvocationOptions {
    /// Sampling temperature, if the provider supports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Completion length cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Overrides the dispatcher's per-request timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl InvocationOptions {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// A single model invocation. Immutable once handed to the dispatcher.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub model: ModelDescriptor,
    pub prompt: String,
    pub context: Vec<ContextBlock>,
    pub options: InvocationOptions,
}

impl InvocationRequest {
    pub fn new(model: ModelDescriptor, prompt: impl Into<String>) -> Self {
        Self {
            model,
            prompt: prompt.into(),
            context: Vec::new(),
            options: InvocationOptions::default(),
        }
    }

    pub fn with_context(mut self, context: Vec<ContextBlock>) -> Self {
        self.context = context;
        self
    }

    pub fn with_options(mut self, options: InvocationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn model_id(&self) -> &str {
        self.model.id()
    }

    /// Prompt followed by every context block, as one text body.
    pub fn render(&self) -> String {
        if self.context.is_empty() {
            return self.prompt.clone();
        }
        let mut out = self.prompt.clone();
        for block in &self.context {
            out.push_str("\n\n--- ");
            out.push_str(&block.label);
            out.push_str(" ---\n");
            out.push_str(&block.content);
        }
        out
    }
}

/// Either the completion text or a typed failure, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvocationOutcome {
    Completed { text: String },
    Failed { failure: InvocationFailure },
}

/// Result of one request after retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub model_id: String,
    pub outcome: InvocationOutcome,
    /// Wall-clock time across all attempts.
    pub latency: Duration,
    pub retries_used: u32,
}

impl InvocationResult {
    pub fn completed(
        model_id: impl Into<String>,
        text: impl Into<String>,
        latency: Duration,
        retries_used: u32,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            outcome: InvocationOutcome::Completed { text: text.into() },
            latency,
            retries_used,
        }
    }

    pub fn failed(failure: InvocationFailure, latency: Duration, retries_used: u32) -> Self {
        Self {
            model_id: failure.model_id.clone(),
            outcome: InvocationOutcome::Failed { failure },
            latency,
            retries_used,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, InvocationOutcome::Completed { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match &self.outcome {
            InvocationOutcome::Completed { text } => Some(text),
            InvocationOutcome::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&InvocationFailure> {
        match &self.outcome {
            InvocationOutcome::Completed { .. } => None,
            InvocationOutcome::Failed { failure } => Some(failure),
        }
    }
}
