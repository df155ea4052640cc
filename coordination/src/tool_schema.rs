//! Tool Input/Output Schemas: the contract with the transport layer
//!
//! The transport (not part of this crate) decodes a [`ToolRequest`], hands it
//! to the engine, and renders the [`ToolResponse`]. Request types derive
//! `JsonSchema` so the transport can publish input schemas.
//!
//! # Tools
//!
//! ```text
//! codereview : one batch, findings scored for consensus
//! chat       : one batch, optionally threaded through a session
//! compare    : one batch across at least two models, side by side
//! debate     : three-round deliberation, returns a sealed DebateSession
//! ```

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::consensus::ConsensusReport;
use crate::debate::DebateSession;
use crate::invocation::{ContextBlock, InvocationOptions, InvocationResult};
use crate::session::SessionId;

// ── Requests ──────────────────────────────────────────────────────────

/// Which tool to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    #[serde(rename = "codereview")]
    CodeReview,
    Chat,
    Compare,
    Debate,
}

impl ToolKind {
    /// Fewest model names the tool accepts.
    pub fn min_models(self) -> usize {
        match self {
            Self::Compare => 2,
            Self::CodeReview | Self::Chat | Self::Debate => 1,
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CodeReview => write!(f, "codereview"),
            Self::Chat => write!(f, "chat"),
            Self::Compare => write!(f, "compare"),
            Self::Debate => write!(f, "debate"),
        }
    }
}

impl FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "codereview" | "code_review" | "review" => Ok(Self::CodeReview),
            "chat" => Ok(Self::Chat),
            "compare" => Ok(Self::Compare),
            "debate" => Ok(Self::Debate),
            other => Err(format!("unknown tool: {other}")),
        }
    }
}

/// One tool invocation from the transport.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolRequest {
    pub tool: ToolKind,
    /// Model aliases or ids, in the order results should come back.
    pub models: Vec<String>,
    /// The prompt, or the debate topic.
    pub prompt: String,
    /// Ordered context payload (file contents, prior turns).
    #[serde(default)]
    pub context: Vec<ContextBlock>,
    #[serde(default)]
    pub options: InvocationOptions,
    /// Chat session to thread this turn through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl ToolRequest {
    pub fn new(tool: ToolKind, models: Vec<String>, prompt: impl Into<String>) -> Self {
        Self {
            tool,
            models,
            prompt: prompt.into(),
            context: Vec::new(),
            options: InvocationOptions::default(),
            session_id: None,
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

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Shape checks that need no registry.
    pub fn validate(&self) -> Result<(), String> {
        if self.prompt.trim().is_empty() {
            return Err("prompt must not be empty".to_string());
        }
        let named = self.models.iter().filter(|m| !m.trim().is_empty()).count();
        if named < self.tool.min_models() {
            return Err(format!(
                "{} needs at least {} model(s), got {}",
                self.tool,
                self.tool.min_models(),
                named
            ));
        }
        if self.session_id.is_some() && self.tool != ToolKind::Chat {
            return Err(format!("session_id is only valid for chat, not {}", self.tool));
        }
        Ok(())
    }
}

/// JSON schema for [`ToolRequest`].
pub fn request_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(ToolRequest)
}

// ── Responses ─────────────────────────────────────────────────────────

/// Structured result handed back to the transport for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolResponse {
    /// codereview, chat and compare.
    SingleShot {
        tool: ToolKind,
        /// One per requested model, in request order.
        results: Vec<InvocationResult>,
        consensus: ConsensusReport,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },
    Debate { session: Box<DebateSession> },
}

impl ToolResponse {
    pub fn tool(&self) -> ToolKind {
        match self {
            Self::SingleShot { tool, .. } => *tool,
            Self::Debate { .. } => ToolKind::Debate,
        }
    }

    /// The batch consensus, or the debate's final consensus.
    pub fn consensus(&self) -> Option<&ConsensusReport> {
        match self {
            Self::SingleShot { consensus, .. } => Some(consensus),
            Self::Debate { session } => session.final_consensus.as_ref(),
        }
    }

    pub fn results(&self) -> &[InvocationResult] {
        match self {
            Self::SingleShot { results, .. } => results.as_slice(),
            Self::Debate { .. } => &[],
        }
    }

    pub fn debate(&self) -> Option<&DebateSession> {
        match self {
            Self::SingleShot { .. } => None,
            Self::Debate { session } => Some(session.as_ref()),
        }
    }
}
