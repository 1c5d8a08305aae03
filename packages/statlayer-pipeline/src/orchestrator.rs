use crate::checkpoint::{CheckpointKey, CheckpointStore};
use crate::config::PipelineConfig;
use crate::error::{FailureKind, FetchError, PipelineError, Result};
use crate::layer::{LayerContext, LayerDescriptor, LayerOutput, LayerRegistry};
use crate::manifest::{
    gaps_from_table, gaps_to_table, FailureEntry, FailureManifest, FailureReporter, TracingReporter,
};
use crate::state::{LayerState, LayerStateMachine};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use statlayer_core::Table;
use statlayer_storage::{upsert, DurableStore, ErrorKind, UpsertReport};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Final state of one layer in a run
#[derive(Debug, Clone, PartialEq)]
pub struct LayerOutcome {
    pub layer: String,
    pub state: LayerState,
    pub rows: usize,
    pub duration_ms: u64,
}

/// Result of [`Orchestrator::run_all`]: every READY layer's table, the
/// per-layer outcomes in registry order, and everything that went wrong.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub as_of: NaiveDate,
    pub tables: BTreeMap<String, Table>,
    pub outcomes: Vec<LayerOutcome>,
    pub manifest: FailureManifest,
}

impl RunReport {
    pub fn table(&self, layer: &str) -> Option<&Table> {
        self.tables.get(layer)
    }

    pub fn outcome(&self, layer: &str) -> Option<&LayerOutcome> {
        self.outcomes.iter().find(|o| o.layer == layer)
    }

    pub fn failed_layers(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.state, LayerState::Failed { .. }))
            .map(|o| o.layer.as_str())
            .collect()
    }

    /// No layer failed and nothing but empty results was recorded.
    pub fn is_complete(&self) -> bool {
        !self.manifest.has_failures()
    }
}

struct LayerRun {
    outcome: LayerOutcome,
    table: Option<Table>,
    failures: Vec<FailureEntry>,
}

/// Runs every registered layer for a date, checkpoint first.
pub struct Orchestrator {
    registry: Arc<LayerRegistry>,
    checkpoints: Arc<dyn CheckpointStore>,
    config: Arc<PipelineConfig>,
    reporter: Arc<dyn FailureReporter>,
}

impl Orchestrator {
    pub fn new(
        registry: LayerRegistry,
        checkpoints: Arc<dyn CheckpointStore>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            checkpoints,
            config,
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn FailureReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn registry(&self) -> &LayerRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn context_for(&self, descriptor: &LayerDescriptor, as_of: NaiveDate) -> LayerContext {
        LayerContext::new(
            descriptor.name.clone(),
            descriptor.arity,
            as_of,
            self.config.clone(),
            self.checkpoints.clone(),
        )
    }

    fn record(&self, manifest: &mut FailureManifest, entry: FailureEntry) {
        self.reporter.report(&entry);
        manifest.push(entry);
    }

    /// Fetch (or load) every registered layer for `as_of`.
    ///
    /// Never fails because of a layer: failed layers are absent from
    /// `tables` and named in the manifest. Only an internal state machine
    /// violation is returned as an error.
    pub async fn run_all(&self, as_of: NaiveDate) -> Result<RunReport> {
        let start = Instant::now();
        info!(
            "Run {}: {} layers (layer concurrency {})",
            as_of,
            self.registry.len(),
            self.config.layer_concurrency
        );

        let mut runs: Vec<(usize, Result<LayerRun>)> =
            stream::iter(self.registry.iter().enumerate())
                .map(|(idx, descriptor)| async move { (idx, self.run_layer(descriptor, as_of).await) })
                .buffer_unordered(self.config.layer_concurrency.max(1))
                .collect()
                .await;
        runs.sort_by_key(|(idx, _)| *idx);

        let mut report = RunReport {
            as_of,
            tables: BTreeMap::new(),
            outcomes: Vec::with_capacity(runs.len()),
            manifest: FailureManifest::new(),
        };
        for (_, run) in runs {
            let run = run?;
            for entry in run.failures {
                self.record(&mut report.manifest, entry);
            }
            if let Some(table) = run.table {
                report.tables.insert(run.outcome.layer.clone(), table);
            }
            report.outcomes.push(run.outcome);
        }

        info!(
            "Run {} completed - {}/{} layers ready, {} failures recorded in {}ms",
            as_of,
            report.tables.len(),
            report.outcomes.len(),
            report.manifest.len(),
            start.elapsed().as_millis()
        );
        Ok(report)
    }

    async fn run_layer(&self, descriptor: &LayerDescriptor, as_of: NaiveDate) -> Result<LayerRun> {
        let start = Instant::now();
        let name = descriptor.name.as_str();
        let key = CheckpointKey::layer(name, as_of);
        let mut sm = LayerStateMachine::new(name);
        let mut failures = Vec::new();

        match self.checkpoints.get(&key).await {
            Ok(Some(table)) => match self.load_gaps(name, as_of).await {
                Ok(gaps) => {
                    sm.cache_hit()?;
                    info!(
                        "Layer {}: checkpoint hit ({} rows, {} recorded gaps)",
                        name,
                        table.num_rows(),
                        gaps.len()
                    );
                    failures.extend(gaps);
                    return Ok(LayerRun {
                        outcome: outcome(name, sm, Some(&table), start),
                        table: Some(table),
                        failures,
                    });
                }
                Err(message) => {
                    warn!("Layer {}: {}, refetching", name, message);
                    failures.push(FailureEntry::layer(name, FailureKind::CacheIo, message));
                }
            },
            Ok(None) => debug!("Layer {}: checkpoint miss", name),
            Err(e) => {
                warn!("Layer {}: checkpoint unreadable, refetching: {}", name, e);
                failures.push(FailureEntry::layer(name, FailureKind::CacheIo, e.to_string()));
            }
        }

        sm.start_fetch()?;
        info!("Layer {}: fetching", name);

        let output = match self.fetch_with_timeout(descriptor, as_of).await {
            Ok(output) => output,
            Err(e) => {
                error!("Layer {}: failed: {}", name, e);
                sm.fail(e.kind(), e.to_string())?;
                failures.push(FailureEntry::layer(name, e.kind(), e.to_string()));
                return Ok(LayerRun {
                    outcome: outcome(name, sm, None, start),
                    table: None,
                    failures,
                });
            }
        };

        let LayerOutput {
            table,
            entity_failures,
        } = output;

        // An empty table with failed entities may be an outage, not "no data"
        let cacheable = !table.is_empty()
            || entity_failures
                .iter()
                .all(|f| f.kind == FailureKind::EmptyResult);
        let gaps: Vec<FailureEntry> = entity_failures
            .into_iter()
            .map(|f| FailureEntry::entity(name, f.entity, f.kind, f.message))
            .collect();

        if cacheable {
            // Gaps go first: a table checkpoint must never outlive the record
            // of which entities it is missing.
            let saved = match self.save_gaps(name, as_of, &gaps).await {
                Ok(()) => self
                    .checkpoints
                    .put(&key, &table)
                    .await
                    .map_err(|e| e.to_string()),
                Err(message) => Err(message),
            };
            if let Err(message) = saved {
                warn!("Layer {}: checkpoint write failed, continuing: {}", name, message);
                failures.push(FailureEntry::layer(name, FailureKind::CacheIo, message));
            }
        } else {
            warn!(
                "Layer {}: empty result with entity failures, not checkpointed",
                name
            );
        }

        failures.extend(gaps);

        sm.succeed()?;
        info!(
            "Layer {}: ready - {} rows in {}ms",
            name,
            table.num_rows(),
            start.elapsed().as_millis()
        );
        Ok(LayerRun {
            outcome: outcome(name, sm, Some(&table), start),
            table: Some(table),
            failures,
        })
    }

    /// Entity failures recorded with the layer's checkpoint. A missing record
    /// means the layer had none; an unreadable one is an error so the caller
    /// refetches instead of serving rows with unknown gaps.
    async fn load_gaps(
        &self,
        name: &str,
        as_of: NaiveDate,
    ) -> std::result::Result<Vec<FailureEntry>, String> {
        match self.checkpoints.get(&CheckpointKey::gaps(name, as_of)).await {
            Ok(None) => Ok(Vec::new()),
            Ok(Some(table)) => gaps_from_table(name, &table)
                .ok_or_else(|| "gap record is malformed".to_string()),
            Err(e) => Err(format!("gap record unreadable: {}", e)),
        }
    }

    async fn save_gaps(
        &self,
        name: &str,
        as_of: NaiveDate,
        gaps: &[FailureEntry],
    ) -> std::result::Result<(), String> {
        let key = CheckpointKey::gaps(name, as_of);
        if gaps.is_empty() {
            // Clear a record left by an earlier run whose table write failed
            return self
                .checkpoints
                .remove(&key)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string());
        }
        let table = gaps_to_table(gaps).map_err(|e| e.to_string())?;
        self.checkpoints
            .put(&key, &table)
            .await
            .map_err(|e| e.to_string())
    }

    /// Runs the fetch on its own task so a panic is contained to the layer.
    async fn fetch_with_timeout(
        &self,
        descriptor: &LayerDescriptor,
        as_of: NaiveDate,
    ) -> std::result::Result<LayerOutput, FetchError> {
        let timeout = descriptor
            .timeout
            .unwrap_or_else(|| self.config.layer_timeout());
        let ctx = self.context_for(descriptor, as_of);
        let fetch = descriptor.fetch.clone();

        // Held in a set so a cancelled run aborts the layer task with it
        let mut task = JoinSet::new();
        task.spawn(async move { tokio::time::timeout(timeout, fetch.fetch(&ctx)).await });

        match task.join_next().await {
            Some(Ok(Ok(result))) => result,
            Some(Ok(Err(_))) => Err(FetchError::Timeout(timeout)),
            Some(Err(join_err)) => Err(FetchError::Panicked(join_err.to_string())),
            None => Err(FetchError::Panicked("layer task was not scheduled".to_string())),
        }
    }

    /// Upsert every READY table whose layer declares an identity.
    ///
    /// Schema mismatches are configuration defects and abort with an error.
    /// Any other storage failure is recorded as a `persistence` entry in the
    /// report's manifest so the rest still gets written; re-running retries.
    pub async fn persist(
        &self,
        report: &mut RunReport,
        store: &dyn DurableStore,
    ) -> Result<Vec<UpsertReport>> {
        let mut written = Vec::new();

        for descriptor in self.registry.iter() {
            let Some(identity) = &descriptor.identity else {
                continue;
            };
            let Some(table) = report.tables.get(&descriptor.name) else {
                continue;
            };
            if table.num_columns() == 0 {
                debug!("Persist {}: no columns, skipping", descriptor.name);
                continue;
            }

            match upsert(store, &descriptor.name, table, identity).await {
                Ok(upserted) => written.push(upserted),
                Err(e) if e.kind == ErrorKind::SchemaMismatch => {
                    let entry = FailureEntry::layer(
                        descriptor.name.as_str(),
                        FailureKind::SchemaMismatch,
                        e.to_string(),
                    );
                    self.record(&mut report.manifest, entry);
                    return Err(PipelineError::SchemaMismatch {
                        layer: descriptor.name.clone(),
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    let entry = FailureEntry::layer(
                        descriptor.name.as_str(),
                        FailureKind::Persistence,
                        e.to_string(),
                    );
                    self.record(&mut report.manifest, entry);
                }
            }
        }

        info!(
            "Persisted {} tables to {} ({} rows)",
            written.len(),
            store.backend_name(),
            written.iter().map(|r| r.rows_written).sum::<usize>()
        );
        Ok(written)
    }

    /// Record a `persistence` entry for every table `persist` would have
    /// written, for when the durable store cannot be reached at all.
    pub fn record_unpersisted(&self, report: &mut RunReport, reason: &str) -> usize {
        let pending: Vec<String> = self
            .registry
            .iter()
            .filter(|d| d.identity.is_some())
            .filter(|d| {
                report
                    .tables
                    .get(&d.name)
                    .is_some_and(|t| t.num_columns() > 0)
            })
            .map(|d| d.name.clone())
            .collect();
        for layer in &pending {
            let entry = FailureEntry::layer(
                layer.as_str(),
                FailureKind::Persistence,
                format!("not persisted: {}", reason),
            );
            self.record(&mut report.manifest, entry);
        }
        pending.len()
    }
}

fn outcome(name: &str, sm: LayerStateMachine, table: Option<&Table>, start: Instant) -> LayerOutcome {
    LayerOutcome {
        layer: name.to_string(),
        state: sm.into_state(),
        rows: table.map(Table::num_rows).unwrap_or(0),
        duration_ms: start.elapsed().as_millis() as u64,
    }
}
