//! Dispatcher: concurrent fan-out of invocation requests.
//!
//! ```text
//! requests ──► JoinSet (one task per request)
//!                 │  acquire slot ─► invoke (deadline) ─► release slot
//!                 │  transient failure? backoff + jitter, retry
//!                 ▼
//!              results, re-ordered to match the requests
//! ```
//!
//! The slot pool is shared by every batch run through one `Dispatcher`, so
//! `max_concurrency` bounds in-flight invocations across concurrent tool
//! calls as well. Extra work queues on the semaphore instead of failing.
//! Permits are owned by the attempt and released on every exit path,
//! including timeouts and cancellation. Backoff sleeps hold no slot.

use std::sync::Arc;
use std::time::Duration;

use coordination::errors::{FailureKind, InvocationFailure};
use coordination::invocation::{InvocationRequest, InvocationResult};
use coordination::perf_control::{DispatchConfig, RetryPolicy};
use coordination::registry::ProviderKind;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::adapters::{AdapterFactory, ProviderAdapter};

pub struct Dispatcher {
    config: DispatchConfig,
    slots: Arc<Semaphore>,
    factory: Arc<dyn AdapterFactory>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("available_slots", &self.slots.available_permits())
            .finish()
    }
}

/// Everything one unit of work needs besides its request.
struct Unit {
    adapter: Arc<dyn ProviderAdapter>,
    slots: Arc<Semaphore>,
    policy: RetryPolicy,
    timeout: Duration,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig, factory: Arc<dyn AdapterFactory>) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            config,
            slots,
            factory,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Slots not currently held by an in-flight invocation.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Run every request; one result per request, in request order.
    pub async fn dispatch(&self, requests: Vec<InvocationRequest>) -> Vec<InvocationResult> {
        self.dispatch_with_cancel(requests, &CancellationToken::new())
            .await
    }

    /// As [`dispatch`](Self::dispatch). Firing `cancel` abandons in-flight and
    /// queued work, which comes back as `Cancelled`; finished results are kept.
    #[instrument(skip_all, fields(batch = requests.len()))]
    pub async fn dispatch_with_cancel(
        &self,
        requests: Vec<InvocationRequest>,
        cancel: &CancellationToken,
    ) -> Vec<InvocationResult> {
        let batch_started = Instant::now();
        let model_ids: Vec<String> = requests.iter().map(|r| r.model_id().to_string()).collect();
        let mut slots: Vec<Option<InvocationResult>> = (0..requests.len()).map(|_| None).collect();
        let mut join_set: JoinSet<(usize, InvocationResult)> = JoinSet::new();

        for (index, request) in requests.into_iter().enumerate() {
            let unit = Unit {
                adapter: self.factory.adapter_for(&request.model),
                slots: self.slots.clone(),
                policy: self.config.retry.clone(),
                timeout: request
                    .options
                    .timeout()
                    .unwrap_or_else(|| self.config.request_timeout()),
                cancel: cancel.child_token(),
            };
            join_set.spawn(async move { (index, run_unit(unit, request).await) });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => {
                    debug!(
                        model_id = %result.model_id,
                        success = result.is_success(),
                        retries = result.retries_used,
                        latency_ms = result.latency.as_millis() as u64,
                        "invocation finished"
                    );
                    slots[index] = Some(result);
                }
                Err(e) => {
                    // Its slot is filled below.
                    warn!(error = %e, "invocation worker panicked");
                }
            }
        }

        let results: Vec<InvocationResult> = slots
            .into_iter()
            .zip(model_ids)
            .map(|(slot, model_id)| {
                slot.unwrap_or_else(|| {
                    InvocationResult::failed(
                        InvocationFailure::new(
                            FailureKind::Cancelled,
                            model_id,
                            "worker ended without a result",
                        ),
                        Duration::ZERO,
                        0,
                    )
                })
            })
            .collect();

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(
            succeeded,
            failed = results.len() - succeeded,
            elapsed_ms = batch_started.elapsed().as_millis() as u64,
            "batch dispatched"
        );
        results
    }
}

/// Deadline expiry classification for an attempt the dispatcher timed out.
fn timeout_failure(kind: ProviderKind, model_id: &str, timeout: Duration) -> InvocationFailure {
    let failure_kind = match kind {
        ProviderKind::RemoteApi => FailureKind::NetworkError,
        ProviderKind::LocalProcess => FailureKind::ProcessTimeout,
    };
    InvocationFailure::new(
        failure_kind,
        model_id,
        format!("no response within {}s", timeout.as_secs_f64()),
    )
}

async fn run_unit(unit: Unit, request: InvocationRequest) -> InvocationResult {
    let started = Instant::now();
    let model_id = request.model_id().to_string();
    let kind = unit.adapter.provider_kind();
    let mut retries: u32 = 0;

    loop {
        // ── Attempt: hold one slot for the call only ──
        let outcome = {
            let permit = tokio::select! {
                biased;
                _ = unit.cancel.cancelled() => None,
                permit = unit.slots.clone().acquire_owned() => permit.ok(),
            };
            let Some(_permit) = permit else {
                return InvocationResult::failed(
                    InvocationFailure::cancelled(model_id),
                    started.elapsed(),
                    retries,
                );
            };

            debug!(model_id = %model_id, attempt = retries + 1, "invoking");
            let call = unit.adapter.invoke(&request, unit.timeout, &unit.cancel);
            tokio::select! {
                biased;
                _ = unit.cancel.cancelled() => Err(InvocationFailure::cancelled(model_id.as_str())),
                outcome = tokio::time::timeout(unit.timeout, call) => match outcome {
                    Ok(result) => result,
                    Err(_) => Err(timeout_failure(kind, &model_id, unit.timeout)),
                },
            }
        };

        // ── Classify ──
        let failure = match outcome {
            Ok(text) => {
                return InvocationResult::completed(model_id, text, started.elapsed(), retries)
            }
            Err(failure) => failure,
        };
        if !failure.is_transient() || !unit.policy.should_retry(retries) {
            if failure.kind != FailureKind::Cancelled {
                warn!(
                    model_id = %model_id,
                    kind = %failure.kind,
                    retries,
                    error = %failure.message,
                    "invocation failed"
                );
            }
            return InvocationResult::failed(failure, started.elapsed(), retries);
        }
        // A provider wait longer than the per-request deadline is not honoured.
        if let Some(asked) = failure.retry_after().filter(|wait| *wait > unit.timeout) {
            warn!(
                model_id = %model_id,
                kind = %failure.kind,
                retry_after_ms = asked.as_millis() as u64,
                timeout_ms = unit.timeout.as_millis() as u64,
                "retry-after exceeds request timeout, giving up"
            );
            return InvocationResult::failed(failure, started.elapsed(), retries);
        }

        // ── Backoff, no slot held ──
        retries += 1;
        let wait = unit
            .policy
            .backoff_with_jitter(retries, rand::random::<f64>())
            .max(failure.retry_after().unwrap_or_default());
        warn!(
            model_id = %model_id,
            kind = %failure.kind,
            retry = retries,
            wait_ms = wait.as_millis() as u64,
            "transient failure, retrying"
        );
        tokio::select! {
            biased;
            _ = unit.cancel.cancelled() => {
                return InvocationResult::failed(
                    InvocationFailure::cancelled(model_id),
                    started.elapsed(),
                    retries,
                );
            }
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
