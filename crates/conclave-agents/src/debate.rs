//! Debate driver: runs the three rounds of a debate against the dispatcher.
//!
//! The driver owns the I/O and the round deadlines; every state change goes
//! through [`coordination::debate::transition`]. A round's batch always fully
//! returns before the next round starts. When the round deadline elapses,
//! the round's in-flight invocations are cancelled and recorded as such.

use std::sync::Arc;

use coordination::consensus::ConsensusScorer;
use coordination::debate::{
    prompts, synthesis, transition, DebateConfig, DebateSession, RoundInput, RoundKind,
    TransitionError,
};
use coordination::invocation::{
    ContextBlock, InvocationOptions, InvocationRequest, InvocationResult,
};
use coordination::registry::ModelDescriptor;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::dispatcher::Dispatcher;

/// One debate's inputs.
#[derive(Debug, Clone)]
pub struct DebatePlan {
    pub topic: String,
    /// Resolved participants, in request order.
    pub participants: Vec<ModelDescriptor>,
    /// Requested names the registry could not resolve.
    pub unresolved: Vec<String>,
    /// Shared context sent with every round.
    pub context: Vec<ContextBlock>,
    pub options: InvocationOptions,
    /// Model asked for a narrative synthesis.
    pub synthesizer: Option<ModelDescriptor>,
}

#[derive(Debug, Clone)]
pub struct DebateDriver {
    dispatcher: Arc<Dispatcher>,
    scorer: Arc<ConsensusScorer>,
    config: DebateConfig,
}

impl DebateDriver {
    pub fn new(dispatcher: Arc<Dispatcher>, scorer: Arc<ConsensusScorer>, config: DebateConfig) -> Self {
        Self {
            dispatcher,
            scorer,
            config,
        }
    }

    /// Run all three rounds and return the sealed session.
    #[instrument(skip_all, fields(participants = plan.participants.len()))]
    pub async fn run(
        &self,
        plan: DebatePlan,
        cancel: &CancellationToken,
    ) -> Result<DebateSession, TransitionError> {
        let ids = plan.participants.iter().map(|m| m.id().to_string()).collect();
        let mut session =
            DebateSession::new(plan.topic.clone(), ids).with_unresolved(plan.unresolved.clone());
        info!(session_id = %session.id, "debate started");

        // ── Round 1: Independent ──
        let prompt = prompts::independent_prompt(&plan.topic);
        let requests = plan
            .participants
            .iter()
            .map(|model| self.request(&plan, model, prompt.clone(), Vec::new()))
            .collect();
        let input = self.run_round(RoundKind::Independent, requests, cancel).await;
        transition(&mut session, input, &self.scorer)?;

        // ── Round 2: Cross-examination ──
        let input = if session.has_independent_data() {
            let requests = prompts::cross_examination_requests(&session)
                .into_iter()
                .filter_map(|(id, prompt, context)| {
                    let model = plan.participants.iter().find(|m| m.id() == id)?;
                    Some(self.request(&plan, model, prompt, context))
                })
                .collect();
            self.run_round(RoundKind::CrossExamination, requests, cancel)
                .await
        } else {
            warn!(session_id = %session.id, "no independent answers, skipping cross-examination");
            RoundInput::new(Vec::new())
        };
        transition(&mut session, input, &self.scorer)?;

        // ── Round 3: Synthesis ──
        let input = match &plan.synthesizer {
            Some(model) if session.has_independent_data() => {
                let preview = synthesis::synthesize(&session, &self.scorer);
                let (prompt, context) = prompts::synthesis(&session, &preview.report);
                let request = self.request(&plan, model, prompt, context);
                let input = self
                    .run_round(RoundKind::Synthesis, vec![request], cancel)
                    .await;
                let narrative = input
                    .results
                    .iter()
                    .find_map(InvocationResult::text)
                    .map(str::to_string);
                input.with_narrative(narrative)
            }
            _ => RoundInput::new(Vec::new()),
        };
        transition(&mut session, input, &self.scorer)?;

        info!(session_id = %session.id, status = %session.status_line(), "debate sealed");
        Ok(session)
    }

    /// Caller context first, then the round's own blocks.
    fn request(
        &self,
        plan: &DebatePlan,
        model: &ModelDescriptor,
        prompt: String,
        round_context: Vec<ContextBlock>,
    ) -> InvocationRequest {
        let mut context = plan.context.clone();
        context.extend(round_context);
        InvocationRequest::new(model.clone(), prompt)
            .with_context(context)
            .with_options(plan.options.clone())
    }

    #[instrument(skip_all, fields(round = %kind, batch = requests.len()))]
    async fn run_round(
        &self,
        kind: RoundKind,
        requests: Vec<InvocationRequest>,
        cancel: &CancellationToken,
    ) -> RoundInput {
        let mut input = RoundInput::new(Vec::new());
        let round_cancel = cancel.child_token();
        let dispatch = self.dispatcher.dispatch_with_cancel(requests, &round_cancel);
        tokio::pin!(dispatch);

        match tokio::time::timeout(self.config.round_timeout(), &mut dispatch).await {
            Ok(results) => input.results = results,
            Err(_) => {
                warn!(
                    timeout_secs = self.config.round_timeout_secs,
                    "round deadline elapsed, cancelling stragglers"
                );
                round_cancel.cancel();
                input.results = dispatch.await;
                input.timed_out = true;
            }
        }
        input
    }
}
