//! Session Context Manager: conversation history across turns.
//!
//! Each session owns an append-only list of turns plus shared context blocks
//! that are replayed into every turn. A session processes one turn at a time:
//! [`SessionManager::begin_turn`] hands out an exclusive [`TurnGuard`] that a
//! caller holds across its whole dispatch, so a second turn on the same
//! session waits. Different sessions never contend.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use crate::invocation::ContextBlock;

/// Opaque session handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One completed exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// 1-indexed position in the session.
    pub index: usize,
    pub prompt: String,
    /// Consensus summary or response text.
    pub response: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(SessionId),
}

/// History for one session. Only reachable through the manager.
#[derive(Debug)]
pub struct ConversationContext {
    id: SessionId,
    topic: String,
    turns: Vec<Turn>,
    shared_context: Vec<ContextBlock>,
}

impl ConversationContext {
    fn new(id: SessionId, topic: String) -> Self {
        Self {
            id,
            topic,
            turns: Vec::new(),
            shared_context: Vec::new(),
        }
    }

    fn push(&mut self, prompt: String, response: String) -> usize {
        let index = self.turns.len() + 1;
        self.turns.push(Turn {
            index,
            prompt,
            response,
            recorded_at: Utc::now(),
        });
        index
    }

    /// Shared context followed by one block per prior turn.
    fn context_blocks(&self) -> Vec<ContextBlock> {
        let mut blocks = self.shared_context.clone();
        for turn in &self.turns {
            blocks.push(ContextBlock::new(
                format!("turn {}", turn.index),
                format!("prompt:\n{}\n\nresponse:\n{}", turn.prompt, turn.response),
            ));
        }
        blocks
    }
}

/// Exclusive access to one session for the duration of a turn.
pub struct TurnGuard {
    context: OwnedMutexGuard<ConversationContext>,
}

impl TurnGuard {
    pub fn session_id(&self) -> &SessionId {
        &self.context.id
    }

    pub fn topic(&self) -> &str {
        &self.context.topic
    }

    pub fn history(&self) -> &[Turn] {
        &self.context.turns
    }

    /// Blocks to prepend to this turn's request context.
    pub fn context_blocks(&self) -> Vec<ContextBlock> {
        self.context.context_blocks()
    }

    /// Append the finished turn and release the session.
    pub fn record(mut self, prompt: impl Into<String>, response: impl Into<String>) -> usize {
        let index = self.context.push(prompt.into(), response.into());
        debug!(session_id = %self.context.id, turn = index, "turn recorded");
        index
    }
}

/// Registry of live sessions.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<ConversationContext>>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open(&self, topic: impl Into<String>) -> SessionId {
        let id = SessionId::new();
        let context = ConversationContext::new(id.clone(), topic.into());
        self.sessions
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(context)));
        debug!(session_id = %id, "session opened");
        id
    }

    async fn handle(&self, id: &SessionId) -> Result<Arc<Mutex<ConversationContext>>, SessionError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.clone()))
    }

    /// Wait for the session to be idle and take it for one turn.
    pub async fn begin_turn(&self, id: &SessionId) -> Result<TurnGuard, SessionError> {
        let handle = self.handle(id).await?;
        Ok(TurnGuard {
            context: handle.lock_owned().await,
        })
    }

    /// Append a turn, waiting for any turn in progress.
    pub async fn append_turn(
        &self,
        id: &SessionId,
        prompt: impl Into<String>,
        response: impl Into<String>,
    ) -> Result<usize, SessionError> {
        Ok(self.begin_turn(id).await?.record(prompt, response))
    }

    /// Ordered turns so far.
    pub async fn history(&self, id: &SessionId) -> Result<Vec<Turn>, SessionError> {
        let handle = self.handle(id).await?;
        let context = handle.lock().await;
        Ok(context.turns.clone())
    }

    /// Add a block replayed into every later turn (e.g. a file under discussion).
    pub async fn attach_context(&self, id: &SessionId, block: ContextBlock) -> Result<(), SessionError> {
        let handle = self.handle(id).await?;
        handle.lock().await.shared_context.push(block);
        Ok(())
    }

    /// Drop the session. A turn already in progress finishes against the
    /// detached history, which is then freed.
    pub async fn close(&self, id: &SessionId) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .remove(id)
            .map(|_| debug!(session_id = %id, "session closed"))
            .ok_or_else(|| SessionError::NotFound(id.clone()))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
