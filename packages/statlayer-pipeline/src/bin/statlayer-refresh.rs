//! Refresh every layer for today: fetch (or load checkpoints), export,
//! persist, then print the failure manifest.
//!
//! Configuration comes from the environment (see `PipelineConfig::load`).
//! Exits non-zero when any failure other than an empty result was recorded.

use anyhow::Context;
use statlayer_pipeline::{
    default_registry, logging, CsvExporter, Exporter, FileCheckpointStore, Orchestrator,
    PipelineConfig, RunReport,
};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("Refresh aborted: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the run finished without recorded failures.
async fn run() -> anyhow::Result<bool> {
    let config = Arc::new(PipelineConfig::load().context("loading configuration")?);
    info!("Configuration: {:?}", config);

    let as_of = chrono::Local::now().date_naive();
    let checkpoints = Arc::new(FileCheckpointStore::new(&config.checkpoint_dir));
    let orchestrator = Orchestrator::new(default_registry()?, checkpoints, config.clone());

    let mut report = orchestrator.run_all(as_of).await?;

    // The manifest is printed even when export or persistence aborts
    let finished = export_and_persist(&orchestrator, &config, &mut report).await;

    println!("{}", report.manifest.to_json()?);
    for outcome in &report.outcomes {
        info!(
            "{}: {} ({} rows, {} ms)",
            outcome.layer,
            outcome.state.state_name(),
            outcome.rows,
            outcome.duration_ms
        );
    }

    finished?;
    Ok(!report.manifest.has_failures())
}

async fn export_and_persist(
    orchestrator: &Orchestrator,
    config: &PipelineConfig,
    report: &mut RunReport,
) -> anyhow::Result<()> {
    let exporter = CsvExporter::new(&config.export_dir);
    let written = exporter
        .export(report.as_of, &orchestrator.registry().names(), &report.tables)
        .context("exporting tables")?;
    info!("Exported {} files to {}", written.len(), exporter.dir().display());

    let backend = config.store_backend();
    match backend.connect().await {
        Ok(store) => {
            orchestrator.persist(report, store.as_ref()).await?;
        }
        Err(e) => {
            error!("Could not connect to {} store: {}", backend.name(), e);
            let reason = format!("{} store unreachable: {}", backend.name(), e);
            orchestrator.record_unpersisted(report, &reason);
        }
    }
    Ok(())
}
