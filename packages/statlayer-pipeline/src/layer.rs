//! The layer contract and the registry of layers.

use crate::checkpoint::{CheckpointKey, CheckpointStore};
use crate::config::PipelineConfig;
use crate::error::{FetchError, PipelineError, Result};
use crate::fanout::{EntityFailure, FanOutExecutor};
use async_trait::async_trait;
use chrono::NaiveDate;
use statlayer_core::Table;
use statlayer_storage::IdentitySpec;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Whether a layer's fetch depends on the run date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerArity {
    /// Season-level data; the run date only scopes the checkpoint
    ZeroArg,
    DateArg,
}

/// Everything a layer needs for one fetch.
#[derive(Clone)]
pub struct LayerContext {
    layer: String,
    arity: LayerArity,
    as_of: NaiveDate,
    config: Arc<PipelineConfig>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl LayerContext {
    pub fn new(
        layer: impl Into<String>,
        arity: LayerArity,
        as_of: NaiveDate,
        config: Arc<PipelineConfig>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            layer: layer.into(),
            arity,
            as_of,
            config,
            checkpoints,
        }
    }

    pub fn layer(&self) -> &str {
        &self.layer
    }

    pub fn arity(&self) -> LayerArity {
        self.arity
    }

    /// Run date; used for cache scoping by every layer.
    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    /// The date argument, only for date-argument layers.
    pub fn date(&self) -> Option<NaiveDate> {
        match self.arity {
            LayerArity::DateArg => Some(self.as_of),
            LayerArity::ZeroArg => None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn checkpoints(&self) -> Arc<dyn CheckpointStore> {
        self.checkpoints.clone()
    }

    /// Checkpoint key for one entity of this layer's fan-out.
    pub fn entity_key(&self, scope: &str, entity: impl std::fmt::Display) -> CheckpointKey {
        CheckpointKey::entity(format!("{}-{}", self.layer, scope), self.as_of, entity)
    }

    /// Fan-out executor wired to this run's concurrency, timeout and cache.
    pub fn fan_out(&self) -> FanOutExecutor {
        FanOutExecutor::new(self.config.fanout_concurrency)
            .with_timeout(self.config.request_timeout())
            .with_checkpoints(self.checkpoints.clone())
    }
}

/// What a layer hands back: its table plus any per-entity failures it
/// absorbed along the way.
#[derive(Debug, Clone, Default)]
pub struct LayerOutput {
    pub table: Table,
    pub entity_failures: Vec<EntityFailure>,
}

impl LayerOutput {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            entity_failures: Vec::new(),
        }
    }

    pub fn with_failures(mut self, failures: Vec<EntityFailure>) -> Self {
        self.entity_failures = failures;
        self
    }
}

impl From<Table> for LayerOutput {
    fn from(table: Table) -> Self {
        Self::new(table)
    }
}

/// Uniform layer contract.
#[async_trait]
pub trait LayerFetch: Send + Sync {
    async fn fetch(&self, ctx: &LayerContext) -> std::result::Result<LayerOutput, FetchError>;
}

/// Adapter turning an async closure into a [`LayerFetch`].
pub struct FnLayer<F>(F);

#[async_trait]
impl<F, Fut> LayerFetch for FnLayer<F>
where
    F: Fn(LayerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<LayerOutput, FetchError>> + Send + 'static,
{
    async fn fetch(&self, ctx: &LayerContext) -> std::result::Result<LayerOutput, FetchError> {
        (self.0)(ctx.clone()).await
    }
}

pub fn layer_fn<F, Fut>(f: F) -> Arc<dyn LayerFetch>
where
    F: Fn(LayerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<LayerOutput, FetchError>> + Send + 'static,
{
    Arc::new(FnLayer(f))
}

#[derive(Clone)]
pub struct LayerDescriptor {
    pub name: String,
    pub arity: LayerArity,
    pub fetch: Arc<dyn LayerFetch>,
    /// Identity used when persisting; `None` means export-only
    pub identity: Option<IdentitySpec>,
    /// Overrides the configured layer timeout
    pub timeout: Option<Duration>,
}

impl LayerDescriptor {
    pub fn new(name: impl Into<String>, arity: LayerArity, fetch: Arc<dyn LayerFetch>) -> Self {
        Self {
            name: name.into(),
            arity,
            fetch,
            identity: None,
            timeout: None,
        }
    }

    pub fn with_identity(mut self, identity: IdentitySpec) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl std::fmt::Debug for LayerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerDescriptor")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("identity", &self.identity)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Append-only, insertion-ordered set of layers.
#[derive(Default, Clone, Debug)]
pub struct LayerRegistry {
    layers: Vec<LayerDescriptor>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names become checkpoint and export file names, so they are restricted
    /// to `[A-Za-z0-9_-]+`.
    pub fn register(&mut self, descriptor: LayerDescriptor) -> Result<()> {
        if !is_valid_name(&descriptor.name) {
            return Err(PipelineError::InvalidLayerName(descriptor.name));
        }
        if self.get(&descriptor.name).is_some() {
            return Err(PipelineError::DuplicateLayer(descriptor.name));
        }
        self.layers.push(descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&LayerDescriptor> {
        self.layers.iter().find(|d| d.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayerDescriptor> {
        self.layers.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.layers.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Arc<dyn LayerFetch> {
        layer_fn(|_ctx| async { Ok(LayerOutput::default()) })
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = LayerRegistry::new();
        registry
            .register(LayerDescriptor::new("team_hitting", LayerArity::ZeroArg, noop()))
            .unwrap();

        let err = registry
            .register(LayerDescriptor::new("team_hitting", LayerArity::DateArg, noop()))
            .unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateLayer(name) if name == "team_hitting"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_rejects_unsafe_names() {
        let mut registry = LayerRegistry::new();
        for bad in ["", "team hitting", "../odds", "odds.v2"] {
            assert!(registry
                .register(LayerDescriptor::new(bad, LayerArity::ZeroArg, noop()))
                .is_err());
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_keeps_insertion_order() {
        let mut registry = LayerRegistry::new();
        for name in ["teamSplits", "pitcherGameLog", "odds"] {
            registry
                .register(LayerDescriptor::new(name, LayerArity::ZeroArg, noop()))
                .unwrap();
        }
        assert_eq!(registry.names(), vec!["teamSplits", "pitcherGameLog", "odds"]);
    }

    #[test]
    fn test_date_only_for_date_layers() {
        let as_of = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let config = Arc::new(PipelineConfig::default());
        let store: Arc<dyn CheckpointStore> =
            Arc::new(crate::checkpoint::MemoryCheckpointStore::new());

        let zero = LayerContext::new("a", LayerArity::ZeroArg, as_of, config.clone(), store.clone());
        let dated = LayerContext::new("b", LayerArity::DateArg, as_of, config, store);

        assert_eq!(zero.date(), None);
        assert_eq!(zero.as_of(), as_of);
        assert_eq!(dated.date(), Some(as_of));
        assert_eq!(
            dated.entity_key("events", 2).stem(),
            "b-events_2024-04-01_2"
        );
    }
}
