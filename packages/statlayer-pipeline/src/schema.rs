//! Schema bootstrap: create every persisted layer's target table up front.

use crate::orchestrator::Orchestrator;
use crate::Result;
use chrono::NaiveDate;
use statlayer_storage::DurableStore;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaReport {
    pub created: Vec<String>,
    pub existing: Vec<String>,
    /// Layers whose fetch failed or produced no columns, with the reason
    pub failed: Vec<(String, String)>,
}

/// For each layer with an identity whose target table is missing, fetch
/// once and create the table from the result's columns with zero rows.
///
/// Existing tables are left alone. A failing fetch is reported and skipped;
/// storage errors abort.
pub async fn ensure_schemas(
    orchestrator: &Orchestrator,
    store: &dyn DurableStore,
    as_of: NaiveDate,
) -> Result<SchemaReport> {
    let mut report = SchemaReport::default();

    for descriptor in orchestrator.registry().iter() {
        let Some(identity) = &descriptor.identity else {
            continue;
        };
        let name = descriptor.name.as_str();

        if store.table_exists(name).await? {
            info!("Schema {}: exists, skipping", name);
            report.existing.push(name.to_string());
            continue;
        }

        let ctx = orchestrator.context_for(descriptor, as_of);
        let timeout = descriptor
            .timeout
            .unwrap_or_else(|| orchestrator.config().layer_timeout());
        let table = match tokio::time::timeout(timeout, descriptor.fetch.fetch(&ctx)).await {
            Ok(Ok(output)) => output.table,
            Ok(Err(e)) => {
                warn!("Schema {}: fetch failed: {}", name, e);
                report.failed.push((name.to_string(), e.to_string()));
                continue;
            }
            Err(_) => {
                warn!("Schema {}: fetch timed out after {:?}", name, timeout);
                report
                    .failed
                    .push((name.to_string(), format!("timed out after {:?}", timeout)));
                continue;
            }
        };

        if table.num_columns() == 0 {
            warn!("Schema {}: fetch returned no columns", name);
            report
                .failed
                .push((name.to_string(), "no columns to derive a schema from".to_string()));
            continue;
        }

        identity.validate(&table)?;
        store.create_table(name, &table.schema(), identity).await?;
        info!(
            "Schema {}: created with {} columns, identity {}",
            name,
            table.num_columns(),
            identity
        );
        report.created.push(name.to_string());
    }

    Ok(report)
}
