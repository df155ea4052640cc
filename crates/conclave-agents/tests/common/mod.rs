//! Scripted adapter shared by the dispatcher and engine tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use conclave_agents::adapters::{AdapterFactory, ProviderAdapter};
use coordination::errors::{FailureKind, InvocationFailure};
use coordination::invocation::InvocationRequest;
use coordination::registry::{ApiStyle, ModelDescriptor, ModelEntry, ModelRegistry, ProviderKind};
use tokio_util::sync::CancellationToken;

/// What a scripted model does on each call.
#[derive(Debug, Clone)]
pub enum Behaviour {
    Reply { delay: Duration, text: String },
    /// Fail `failures` times with `kind`, then reply.
    FailThenReply {
        failures: u32,
        kind: FailureKind,
        retry_after: Option<Duration>,
        text: String,
    },
    Fail(FailureKind),
    /// Never completes; only a deadline or cancellation ends it.
    Hang,
}

pub fn reply(text: &str) -> Behaviour {
    Behaviour::Reply {
        delay: Duration::from_millis(10),
        text: text.to_string(),
    }
}

pub fn reply_after(millis: u64, text: &str) -> Behaviour {
    Behaviour::Reply {
        delay: Duration::from_millis(millis),
        text: text.to_string(),
    }
}

#[derive(Debug, Default)]
pub struct ScriptedAdapter {
    behaviours: Mutex<HashMap<String, Behaviour>>,
    calls: Mutex<HashMap<String, u32>>,
    prompts: Mutex<HashMap<String, Vec<String>>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, model_id: &str, behaviour: Behaviour) {
        self.behaviours
            .lock()
            .unwrap()
            .insert(model_id.to_string(), behaviour);
    }

    pub fn calls(&self, model_id: &str) -> u32 {
        self.calls.lock().unwrap().get(model_id).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }

    /// Rendered prompts received by `model_id`, in call order.
    pub fn prompts(&self, model_id: &str) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .get(model_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::RemoteApi
    }

    async fn invoke(
        &self,
        request: &InvocationRequest,
        _deadline: Duration,
        _cancel: &CancellationToken,
    ) -> Result<String, InvocationFailure> {
        let id = request.model_id().to_string();
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(id.clone()).or_insert(0);
            *count += 1;
            *count
        };
        self.prompts
            .lock()
            .unwrap()
            .entry(id.clone())
            .or_default()
            .push(request.render());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let behaviour = self
            .behaviours
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| reply("no findings"));

        match behaviour {
            Behaviour::Reply { delay, text } => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            Behaviour::FailThenReply {
                failures,
                kind,
                retry_after,
                text,
            } => {
                tokio::time::sleep(Duration::from_millis(5)).await;
                if call <= failures {
                    let failure = InvocationFailure::new(kind, id, format!("scripted failure #{call}"));
                    Err(match retry_after {
                        Some(wait) => failure.with_retry_after(wait),
                        None => failure,
                    })
                } else {
                    Ok(text)
                }
            }
            Behaviour::Fail(kind) => Err(InvocationFailure::new(kind, id, "scripted failure")),
            Behaviour::Hang => std::future::pending().await,
        }
    }
}

pub struct ScriptedFactory(pub Arc<ScriptedAdapter>);

impl AdapterFactory for ScriptedFactory {
    fn adapter_for(&self, _model: &ModelDescriptor) -> Arc<dyn ProviderAdapter> {
        self.0.clone()
    }
}

pub fn model(id: &str) -> ModelDescriptor {
    ModelDescriptor::remote(id, ApiStyle::OpenAi, "http://fake.invalid/v1/chat/completions", id)
}

/// Empty registry holding one OpenAI-style entry per id.
pub fn registry(ids: &[&str]) -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    for id in ids {
        registry
            .register(ModelEntry {
                id: id.to_string(),
                provider: Some(ProviderKind::RemoteApi),
                endpoint: Some("http://fake.invalid/v1/chat/completions".to_string()),
                ..ModelEntry::default()
            })
            .unwrap();
    }
    registry
}
