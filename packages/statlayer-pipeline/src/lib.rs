/*
 * statlayer-pipeline - Incremental multi-source stats pipeline
 *
 * Fetches every registered source layer for a date, reusing checkpoints
 * where they exist, and hands the results to export and persistence.
 *
 * Architecture:
 * - Layer contract + registry (closed set of source layers)
 * - Checkpoint store (Arrow IPC files, one per layer/date or entity/date)
 * - Fan-out executor (bounded, per-entity cached, failure isolated)
 * - Orchestrator (per-layer state machine, failure manifest)
 * - Persistence via statlayer-storage upserts
 * - CSV export
 */

// Public modules
pub mod checkpoint;
pub mod codec;
pub mod config;
pub mod error;
pub mod export;
pub mod fanout;
pub mod layer;
pub mod layers;
pub mod logging;
pub mod manifest;
pub mod orchestrator;
pub mod schema;
pub mod sources;
pub mod state;

// Re-exports
pub use checkpoint::{CheckpointKey, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use config::{PipelineConfig, StoreBackend};
pub use error::{CacheIoError, ConfigError, FailureKind, FetchError, PipelineError, Result};
pub use export::{CsvExporter, Exporter};
pub use fanout::{
    entity_fetch, EntityFailure, EntityFetch, EntityId, FanOutExecutor, FanOutResult, SubEntityTask,
};
pub use layer::{
    layer_fn, LayerArity, LayerContext, LayerDescriptor, LayerFetch, LayerOutput, LayerRegistry,
};
pub use layers::{default_registry, StatsLayer};
pub use manifest::{
    CollectingReporter, FailureEntry, FailureManifest, FailureReporter, TracingReporter,
};
pub use orchestrator::{LayerOutcome, Orchestrator, RunReport};
pub use schema::{ensure_schemas, SchemaReport};
pub use state::{LayerState, LayerStateMachine, ReadySource};
