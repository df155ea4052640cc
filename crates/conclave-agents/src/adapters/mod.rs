//! Provider adapters: one `invoke` contract, one variant per provider kind.
//!
//! Adapters never retry; the dispatcher owns retry policy. They do honour
//! the deadline handed to them and return promptly once the cancellation
//! token fires, dropping the underlying request or killing the child.

pub mod process;
pub mod remote;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coordination::errors::InvocationFailure;
use coordination::invocation::InvocationRequest;
use coordination::registry::{ModelDescriptor, ModelRegistry, ProviderConfig, ProviderKind};
use tokio_util::sync::CancellationToken;

pub use process::ProcessAdapter;
pub use remote::RemoteAdapter;

/// Uniform capability to run one completion against one backend.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider_kind(&self) -> ProviderKind;

    /// Run `request` once. `deadline` bounds this attempt only.
    async fn invoke(
        &self,
        request: &InvocationRequest,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, InvocationFailure>;
}

/// Built-in adapters, selected by [`ProviderKind`].
#[derive(Debug, Clone)]
pub enum Adapter {
    Remote(RemoteAdapter),
    Local(ProcessAdapter),
}

#[async_trait]
impl ProviderAdapter for Adapter {
    fn provider_kind(&self) -> ProviderKind {
        match self {
            Self::Remote(_) => ProviderKind::RemoteApi,
            Self::Local(_) => ProviderKind::LocalProcess,
        }
    }

    async fn invoke(
        &self,
        request: &InvocationRequest,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, InvocationFailure> {
        match self {
            Self::Remote(adapter) => adapter.invoke(request, deadline, cancel).await,
            Self::Local(adapter) => adapter.invoke(request, deadline, cancel).await,
        }
    }
}

/// Picks the adapter for a descriptor. The seam tests use to inject fakes.
pub trait AdapterFactory: Send + Sync {
    fn adapter_for(&self, model: &ModelDescriptor) -> Arc<dyn ProviderAdapter>;
}

/// Named secrets the remote adapter looks up by `api_key_env`.
#[derive(Clone, Default)]
pub struct Credentials(HashMap<String, String>);

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, secret: impl Into<String>) -> Self {
        self.0.insert(name.into(), secret.into());
        self
    }

    /// Read each named variable from the process environment, skipping unset ones.
    pub fn from_env<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut credentials = Self::new();
        for name in names {
            let name = name.as_ref();
            if let Ok(value) = std::env::var(name) {
                if !value.trim().is_empty() {
                    credentials.0.insert(name.to_string(), value);
                }
            }
        }
        credentials
    }

    /// Every credential referenced by a remote descriptor in `registry`.
    pub fn for_registry(registry: &ModelRegistry) -> Self {
        let names = registry.descriptors().filter_map(|d| match d.provider() {
            ProviderConfig::RemoteApi { api_key_env, .. } => api_key_env.clone(),
            ProviderConfig::LocalProcess { .. } => None,
        });
        Self::from_env(names)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.0.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_tuple("Credentials").field(&names).finish()
    }
}

/// Shares one HTTP client across every remote model.
#[derive(Debug, Clone)]
pub struct DefaultAdapterFactory {
    remote: Arc<Adapter>,
    local: Arc<Adapter>,
}

impl DefaultAdapterFactory {
    pub fn new(credentials: Credentials) -> Self {
        Self::with_client(reqwest::Client::new(), credentials)
    }

    pub fn with_client(http: reqwest::Client, credentials: Credentials) -> Self {
        Self {
            remote: Arc::new(Adapter::Remote(RemoteAdapter::new(http, credentials))),
            local: Arc::new(Adapter::Local(ProcessAdapter::new())),
        }
    }
}

impl AdapterFactory for DefaultAdapterFactory {
    fn adapter_for(&self, model: &ModelDescriptor) -> Arc<dyn ProviderAdapter> {
        match model.provider_kind() {
            ProviderKind::RemoteApi => self.remote.clone(),
            ProviderKind::LocalProcess => self.local.clone(),
        }
    }
}
