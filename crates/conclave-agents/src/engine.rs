//! Engine facade: serves `codereview`, `chat`, `compare` and `debate`.
//!
//! ```text
//! ToolRequest ─► validate ─► resolve_many ─┬─ none resolved ─► NoResolvableModels
//!                                          │
//!             ┌────────── single shot ─────┴───────── debate ──────────┐
//!             ▼                                                        ▼
//!   dispatch resolved models                               DebateDriver (3 rounds)
//!   registry failures keep their slot                                  │
//!   all failed? ─► AllModelsFailed                                     │
//!   score_results ─► ToolResponse::SingleShot          ToolResponse::Debate (sealed)
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use coordination::config::EngineConfig;
use coordination::consensus::ConsensusScorer;
use coordination::errors::InvocationFailure;
use coordination::invocation::{InvocationRequest, InvocationResult};
use coordination::registry::{ModelDescriptor, ModelRegistry, RegistryError};
use coordination::session::{SessionId, SessionManager};
use coordination::tool_schema::{ToolKind, ToolRequest, ToolResponse};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::adapters::{AdapterFactory, Credentials, DefaultAdapterFactory};
use crate::debate::{DebateDriver, DebatePlan};
use crate::dispatcher::Dispatcher;
use crate::errors::EngineError;

type Resolved = Vec<Result<ModelDescriptor, RegistryError>>;

#[derive(Debug)]
pub struct Engine {
    registry: Arc<ModelRegistry>,
    dispatcher: Arc<Dispatcher>,
    scorer: Arc<ConsensusScorer>,
    debate: DebateDriver,
    synthesizer: Option<String>,
    sessions: SessionManager,
}

impl Engine {
    pub fn new(
        registry: Arc<ModelRegistry>,
        config: &EngineConfig,
        factory: Arc<dyn AdapterFactory>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let dispatcher = Arc::new(Dispatcher::new(config.dispatch.clone(), factory));
        let scorer = Arc::new(ConsensusScorer::new(config.scoring.clone()));
        let debate = DebateDriver::new(dispatcher.clone(), scorer.clone(), config.debate.clone());
        Ok(Self {
            registry,
            dispatcher,
            scorer,
            debate,
            synthesizer: config.debate.synthesizer.clone(),
            sessions: SessionManager::new(),
        })
    }

    /// Registry built from `config`, adapters backed by `credentials`.
    pub fn from_config(config: &EngineConfig, credentials: Credentials) -> Result<Self, EngineError> {
        let registry = Arc::new(config.build_registry()?);
        Self::new(registry, config, Arc::new(DefaultAdapterFactory::new(credentials)))
    }

    /// Parse a TOML document and read the credentials its models name from
    /// the environment.
    pub fn from_toml(document: &str) -> anyhow::Result<Self> {
        let config = EngineConfig::from_toml_str(document).context("parsing engine config")?;
        let registry = config
            .build_registry()
            .context("building model registry")?;
        let credentials = Credentials::for_registry(&registry);
        info!(
            models = registry.len(),
            credentials = credentials.len(),
            "engine configured"
        );
        let factory = Arc::new(DefaultAdapterFactory::new(credentials));
        Self::new(Arc::new(registry), &config, factory).context("building engine")
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Open a chat session for later `chat` requests.
    pub async fn open_session(&self, topic: impl Into<String>) -> SessionId {
        self.sessions.open(topic).await
    }

    pub async fn close_session(&self, id: &SessionId) -> Result<(), EngineError> {
        Ok(self.sessions.close(id).await?)
    }

    pub async fn run(&self, request: ToolRequest) -> Result<ToolResponse, EngineError> {
        self.run_with_cancel(request, &CancellationToken::new())
            .await
    }

    #[instrument(skip_all, fields(tool = %request.tool, models = request.models.len()))]
    pub async fn run_with_cancel(
        &self,
        request: ToolRequest,
        cancel: &CancellationToken,
    ) -> Result<ToolResponse, EngineError> {
        request.validate().map_err(EngineError::InvalidRequest)?;

        let names: Vec<&str> = request
            .models
            .iter()
            .map(String::as_str)
            .filter(|name| !name.trim().is_empty())
            .collect();
        let resolved = self.registry.resolve_many(&names);
        if resolved.len() < request.tool.min_models() {
            return Err(EngineError::InvalidRequest(format!(
                "{} needs at least {} distinct models",
                request.tool,
                request.tool.min_models()
            )));
        }

        let unresolved: Vec<InvocationFailure> = resolved
            .iter()
            .filter_map(|r| r.as_ref().err())
            .map(RegistryError::to_failure)
            .collect();
        if unresolved.len() == resolved.len() {
            return Err(EngineError::NoResolvableModels {
                failures: unresolved,
            });
        }
        for failure in &unresolved {
            warn!(model = %failure.model_id, kind = %failure.kind, "model not resolved, slot recorded as failed");
        }

        match request.tool {
            ToolKind::Debate => self.run_debate(request, resolved, cancel).await,
            ToolKind::CodeReview | ToolKind::Chat | ToolKind::Compare => {
                self.run_single_shot(request, resolved, cancel).await
            }
        }
    }

    async fn run_single_shot(
        &self,
        request: ToolRequest,
        resolved: Resolved,
        cancel: &CancellationToken,
    ) -> Result<ToolResponse, EngineError> {
        let turn = match &request.session_id {
            Some(id) => Some(self.sessions.begin_turn(id).await?),
            None => None,
        };

        let mut context = turn
            .as_ref()
            .map(|guard| guard.context_blocks())
            .unwrap_or_default();
        context.extend(request.context.iter().cloned());

        // Registry failures keep their slot; the rest are dispatched.
        let mut slots: Vec<Option<InvocationResult>> = Vec::with_capacity(resolved.len());
        let mut positions = Vec::new();
        let mut batch = Vec::new();
        for (index, entry) in resolved.into_iter().enumerate() {
            match entry {
                Ok(model) => {
                    positions.push(index);
                    batch.push(
                        InvocationRequest::new(model, request.prompt.clone())
                            .with_context(context.clone())
                            .with_options(request.options.clone()),
                    );
                    slots.push(None);
                }
                Err(err) => slots.push(Some(InvocationResult::failed(
                    err.to_failure(),
                    Duration::ZERO,
                    0,
                ))),
            }
        }

        let dispatched = self.dispatcher.dispatch_with_cancel(batch, cancel).await;
        for (index, result) in positions.into_iter().zip(dispatched) {
            slots[index] = Some(result);
        }
        let results: Vec<InvocationResult> = slots.into_iter().flatten().collect();

        if !results.iter().any(InvocationResult::is_success) {
            return Err(EngineError::AllModelsFailed {
                failures: results.iter().filter_map(|r| r.failure().cloned()).collect(),
            });
        }

        let consensus = self.scorer.score_results(&results);
        if consensus.degraded {
            warn!(
                responding = consensus.responding_models(),
                requested = consensus.requested_models,
                "degraded consensus"
            );
        }
        info!(tier = %consensus.confidence_tier, "tool call scored");

        let session_id = turn.map(|guard| {
            let id = guard.session_id().clone();
            guard.record(request.prompt.clone(), consensus.summary());
            id
        });

        Ok(ToolResponse::SingleShot {
            tool: request.tool,
            results,
            consensus,
            session_id,
        })
    }

    async fn run_debate(
        &self,
        request: ToolRequest,
        resolved: Resolved,
        cancel: &CancellationToken,
    ) -> Result<ToolResponse, EngineError> {
        let mut participants: Vec<ModelDescriptor> = Vec::new();
        let mut unresolved: Vec<String> = Vec::new();
        for entry in resolved {
            match entry {
                Ok(model) => participants.push(model),
                Err(err) => unresolved.push(err.to_failure().model_id),
            }
        }
        let synthesizer = match self.synthesizer.as_deref() {
            Some(name) => match self.registry.resolve(name) {
                Ok(model) => Some(model.clone()),
                Err(err) => {
                    warn!(error = %err, "synthesizer not resolved, using aggregation only");
                    None
                }
            },
            None => None,
        };

        let plan = DebatePlan {
            topic: request.prompt,
            participants,
            unresolved,
            context: request.context,
            options: request.options,
            synthesizer,
        };
        let session = self.debate.run(plan, cancel).await?;
        Ok(ToolResponse::Debate {
            session: Box::new(session),
        })
    }
}
