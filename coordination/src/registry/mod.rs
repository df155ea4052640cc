//! Model Registry: alias resolution and provider descriptors
//!
//! Resolves short aliases, descriptor ids and user-supplied custom entries
//! into invocable [`ModelDescriptor`]s. Built-in aliases and custom entries
//! share one namespace; registration order decides shadowing (last wins).
//!
//! The registry is assembled once at startup and is read-only afterwards.
//! [`install_global`] publishes one process-wide instance; tests build
//! isolated registries with [`ModelRegistry::builtin`] or [`ModelRegistry::new`].

mod builtin;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{FailureKind, InvocationFailure};

/// How a model is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// HTTP request/response API.
    RemoteApi,
    /// Command spawned on the local machine; prompt on stdin, completion on stdout.
    LocalProcess,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RemoteApi => write!(f, "remote_api"),
            Self::LocalProcess => write!(f, "local_process"),
        }
    }
}

/// Request/response shape spoken by a remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiStyle {
    /// Anthropic messages API.
    Anthropic,
    /// OpenAI chat completions, also served by vLLM and llama.cpp.
    OpenAi,
    /// Google `generateContent`.
    Gemini,
}

impl std::fmt::Display for ApiStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::OpenAi => write!(f, "open_ai"),
            Self::Gemini => write!(f, "gemini"),
        }
    }
}

/// Connection details for one provider kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    RemoteApi {
        api_style: ApiStyle,
        endpoint: String,
        /// Model name sent in the request body.
        model: String,
        /// Name of the credential the adapter looks up.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key_env: Option<String>,
    },
    LocalProcess {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl ProviderConfig {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::RemoteApi { .. } => ProviderKind::RemoteApi,
            Self::LocalProcess { .. } => ProviderKind::LocalProcess,
        }
    }
}

/// A concrete, invocable model.
///
/// Fields are private so the id cannot change after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    id: String,
    aliases: Vec<String>,
    provider: ProviderConfig,
    notes: String,
}

impl ModelDescriptor {
    pub fn remote(
        id: impl Into<String>,
        api_style: ApiStyle,
        endpoint: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            aliases: Vec::new(),
            provider: ProviderConfig::RemoteApi {
                api_style,
                endpoint: endpoint.into(),
                model: model.into(),
                api_key_env: None,
            },
            notes: String::new(),
        }
    }

    pub fn local(id: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            id: id.into(),
            aliases: Vec::new(),
            provider: ProviderConfig::LocalProcess {
                command: command.into(),
                args,
            },
            notes: String::new(),
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_api_key_env(mut self, env: impl Into<String>) -> Self {
        if let ProviderConfig::RemoteApi { api_key_env, .. } = &mut self.provider {
            *api_key_env = Some(env.into());
        }
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }
}

/// A custom model entry as written in configuration, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub provider: Option<ProviderKind>,
    #[serde(default)]
    pub api_style: Option<ApiStyle>,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Model name sent to the endpoint; defaults to `id`.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

impl ModelEntry {
    /// Check required fields and build the descriptor.
    pub fn validate(self) -> Result<ModelDescriptor, RegistryError> {
        let id = self.id.trim().to_string();
        let invalid = |reason: &str| RegistryError::InvalidModelConfig {
            id: id.clone(),
            reason: reason.to_string(),
        };

        if id.is_empty() {
            return Err(invalid("entry has an empty id"));
        }
        let kind = self.provider.ok_or_else(|| invalid("missing provider kind"))?;

        let provider = match kind {
            ProviderKind::RemoteApi => {
                if self.command.is_some() || !self.args.is_empty() {
                    return Err(invalid("remote_api entry must not set command/args"));
                }
                let endpoint = non_blank(self.endpoint)
                    .ok_or_else(|| invalid("remote_api entry lacks an endpoint"))?;
                if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                    return Err(invalid("endpoint must be an http(s) URL"));
                }
                ProviderConfig::RemoteApi {
                    api_style: self.api_style.unwrap_or(ApiStyle::OpenAi),
                    endpoint,
                    model: non_blank(self.model).unwrap_or_else(|| id.clone()),
                    api_key_env: non_blank(self.api_key_env),
                }
            }
            ProviderKind::LocalProcess => {
                if self.endpoint.is_some() || self.api_style.is_some() {
                    return Err(invalid("local_process entry must not set endpoint/api_style"));
                }
                let command = non_blank(self.command)
                    .ok_or_else(|| invalid("local_process entry lacks a command"))?;
                ProviderConfig::LocalProcess {
                    command,
                    args: self.args,
                }
            }
        };

        let aliases = self
            .aliases
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();

        Ok(ModelDescriptor {
            id,
            aliases,
            provider,
            notes: self.notes,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown model: {name}")]
    UnknownModel { name: String },

    #[error("invalid model config for '{id}': {reason}")]
    InvalidModelConfig { id: String, reason: String },

    #[error("global model registry already installed")]
    AlreadyInstalled,
}

impl RegistryError {
    /// Convert into the per-model failure recorded in a batch.
    pub fn to_failure(&self) -> InvocationFailure {
        match self {
            Self::UnknownModel { name } => {
                InvocationFailure::new(FailureKind::UnknownModel, name.clone(), self.to_string())
            }
            Self::InvalidModelConfig { id, .. } => InvocationFailure::new(
                FailureKind::InvalidModelConfig,
                id.clone(),
                self.to_string(),
            ),
            Self::AlreadyInstalled => InvocationFailure::new(
                FailureKind::InvalidModelConfig,
                "registry",
                self.to_string(),
            ),
        }
    }
}

/// Registry of resolvable models.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    descriptors: HashMap<String, ModelDescriptor>,
    /// Lowercased alias or id -> descriptor id.
    names: HashMap<String, String>,
    /// Descriptor ids in registration order.
    order: Vec<String>,
}

impl ModelRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in alias table.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for descriptor in builtin::descriptors() {
            registry.insert(descriptor);
        }
        registry
    }

    /// Built-in table followed by `entries` in order; later entries shadow earlier names.
    pub fn with_entries(entries: impl IntoIterator<Item = ModelEntry>) -> Result<Self, RegistryError> {
        let mut registry = Self::builtin();
        for entry in entries {
            registry.register(entry)?;
        }
        Ok(registry)
    }

    /// Validate and add a custom entry.
    pub fn register(&mut self, entry: ModelEntry) -> Result<&ModelDescriptor, RegistryError> {
        let descriptor = entry.validate()?;
        let id = descriptor.id.clone();
        self.insert(descriptor);
        self.descriptors
            .get(&id)
            .ok_or(RegistryError::UnknownModel { name: id })
    }

    fn insert(&mut self, descriptor: ModelDescriptor) {
        let id = descriptor.id.clone();
        if self.descriptors.contains_key(&id) {
            debug!(model_id = %id, "replacing registered descriptor");
            // Names owned by the previous descriptor stay pointed at this id.
        } else {
            self.order.push(id.clone());
        }

        let mut names: Vec<String> = vec![id.clone()];
        names.extend(descriptor.aliases.iter().cloned());
        for name in names {
            let key = normalize(&name);
            if let Some(previous) = self.names.insert(key.clone(), id.clone()) {
                if previous != id {
                    debug!(alias = %name, from = %previous, to = %id, "alias shadowed");
                    if let Some(prev) = self.descriptors.get_mut(&previous) {
                        prev.aliases.retain(|a| normalize(a) != key);
                    }
                }
            }
        }
        self.descriptors.insert(id, descriptor);
    }

    /// Resolve an alias or id (case-insensitive).
    pub fn resolve(&self, name_or_alias: &str) -> Result<&ModelDescriptor, RegistryError> {
        self.names
            .get(&normalize(name_or_alias))
            .and_then(|id| self.descriptors.get(id))
            .ok_or_else(|| RegistryError::UnknownModel {
                name: name_or_alias.trim().to_string(),
            })
    }

    /// Resolve a list of names, preserving first-seen order and collapsing
    /// names that land on the same descriptor. Unresolved names keep their slot.
    pub fn resolve_many<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Vec<Result<ModelDescriptor, RegistryError>> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            match self.resolve(name.as_ref()) {
                Ok(descriptor) => {
                    if seen.insert(descriptor.id.clone()) {
                        out.push(Ok(descriptor.clone()));
                    }
                }
                Err(err) => {
                    if seen.insert(format!("?{}", normalize(name.as_ref()))) {
                        out.push(Err(err));
                    }
                }
            }
        }
        out
    }

    /// Look up by descriptor id only.
    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.descriptors.get(id)
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.order.iter().filter_map(|id| self.descriptors.get(id))
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

static GLOBAL: OnceLock<Arc<ModelRegistry>> = OnceLock::new();

/// Publish the process-wide registry. Succeeds once.
pub fn install_global(registry: ModelRegistry) -> Result<Arc<ModelRegistry>, RegistryError> {
    let shared = Arc::new(registry);
    GLOBAL
        .set(shared.clone())
        .map_err(|_| RegistryError::AlreadyInstalled)?;
    Ok(shared)
}

/// The process-wide registry, if one was installed.
pub fn global() -> Option<Arc<ModelRegistry>> {
    GLOBAL.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_entry(id: &str, aliases: &[&str]) -> ModelEntry {
        ModelEntry {
            id: id.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            provider: Some(ProviderKind::RemoteApi),
            api_style: Some(ApiStyle::OpenAi),
            endpoint: Some("http://localhost:8080/v1/chat/completions".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_builtin_sonnet_alias() {
        let registry = ModelRegistry::builtin();
        let d = registry.resolve("sonnet").unwrap();
        assert_eq!(d.id(), "claude-sonnet-4.5");
        assert_eq!(d.provider_kind(), ProviderKind::RemoteApi);
    }

    #[test]
    fn test_unknown_alias_fails() {
        let registry = ModelRegistry::builtin();
        let err = registry.resolve("unknown-alias").unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnknownModel {
                name: "unknown-alias".to_string()
            }
        );
    }

    #[test]
    fn test_resolve_by_id_is_case_insensitive() {
        let registry = ModelRegistry::builtin();
        assert_eq!(registry.resolve("GPT-5").unwrap().id(), "gpt-5");
        assert_eq!(registry.resolve("  Claude-Sonnet-4.5 ").unwrap().id(), "claude-sonnet-4.5");
    }

    #[test]
    fn test_custom_entry_shadows_builtin_alias() {
        let mut registry = ModelRegistry::builtin();
        registry
            .register(remote_entry("local-sonnet", &["sonnet"]))
            .unwrap();
        assert_eq!(registry.resolve("sonnet").unwrap().id(), "local-sonnet");
        // the built-in descriptor no longer claims the alias
        let original = registry.get("claude-sonnet-4.5").unwrap();
        assert!(!original.aliases().iter().any(|a| a == "sonnet"));
        assert_eq!(registry.resolve("claude-sonnet-4.5").unwrap().id(), "claude-sonnet-4.5");
    }

    #[test]
    fn test_last_registered_wins() {
        let registry = ModelRegistry::with_entries(vec![
            remote_entry("first", &["shared"]),
            remote_entry("second", &["shared"]),
        ])
        .unwrap();
        assert_eq!(registry.resolve("shared").unwrap().id(), "second");
    }

    #[test]
    fn test_remote_entry_without_endpoint_is_invalid() {
        let mut registry = ModelRegistry::new();
        let mut entry = remote_entry("broken", &[]);
        entry.endpoint = None;
        let err = registry.register(entry).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidModelConfig { .. }));
    }

    #[test]
    fn test_local_entry_without_command_is_invalid() {
        let entry = ModelEntry {
            id: "local".to_string(),
            provider: Some(ProviderKind::LocalProcess),
            ..Default::default()
        };
        assert!(matches!(
            entry.validate(),
            Err(RegistryError::InvalidModelConfig { .. })
        ));
    }

    #[test]
    fn test_contradictory_entry_is_invalid() {
        let mut entry = remote_entry("mixed", &[]);
        entry.command = Some("ollama".to_string());
        let err = entry.validate().unwrap_err();
        assert!(err.to_string().contains("command"));
    }

    #[test]
    fn test_missing_provider_kind_is_invalid() {
        let entry = ModelEntry {
            id: "no-kind".to_string(),
            endpoint: Some("https://example.com".to_string()),
            ..Default::default()
        };
        assert!(entry.validate().is_err());
    }

    #[test]
    fn test_local_entry_validates() {
        let entry = ModelEntry {
            id: "ollama-llama".to_string(),
            aliases: vec!["llama".to_string(), "  ".to_string()],
            provider: Some(ProviderKind::LocalProcess),
            command: Some("ollama".to_string()),
            args: vec!["run".to_string(), "llama3".to_string()],
            ..Default::default()
        };
        let d = entry.validate().unwrap();
        assert_eq!(d.aliases(), &["llama".to_string()]);
        assert_eq!(
            d.provider(),
            &ProviderConfig::LocalProcess {
                command: "ollama".to_string(),
                args: vec!["run".to_string(), "llama3".to_string()],
            }
        );
    }

    #[test]
    fn test_remote_model_name_defaults_to_id() {
        let d = remote_entry("qwen-coder", &[]).validate().unwrap();
        match d.provider() {
            ProviderConfig::RemoteApi { model, .. } => assert_eq!(model, "qwen-coder"),
            other => panic!("unexpected provider {other:?}"),
        }
    }

    #[test]
    fn test_resolve_many_keeps_order_and_slots() {
        let registry = ModelRegistry::builtin();
        let resolved = registry.resolve_many(&["gpt", "nope", "sonnet", "gpt-5", "nope"]);
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[0].as_ref().unwrap().id(), "gpt-5");
        assert!(resolved[1].is_err());
        assert_eq!(resolved[2].as_ref().unwrap().id(), "claude-sonnet-4.5");
    }

    #[test]
    fn test_registry_error_to_failure() {
        let err = RegistryError::UnknownModel {
            name: "mystery".to_string(),
        };
        let failure = err.to_failure();
        assert_eq!(failure.kind, FailureKind::UnknownModel);
        assert_eq!(failure.model_id, "mystery");
    }

    #[test]
    fn test_descriptors_in_registration_order() {
        let registry = ModelRegistry::with_entries(vec![remote_entry("zzz-custom", &[])]).unwrap();
        let last = registry.descriptors().last().unwrap();
        assert_eq!(last.id(), "zzz-custom");
    }
}
