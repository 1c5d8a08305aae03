//! Export collaborator: one file per layer.

use crate::Result;
use chrono::NaiveDate;
use statlayer_core::{ColumnType, Table, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::info;

pub const PLACEHOLDER_COLUMN: &str = "Message";

/// Renders the run's tables somewhere a human can read them.
pub trait Exporter {
    /// Writes one output per name in `layers` and per table. A layer with
    /// no table (it failed) or with zero rows gets a placeholder. Returns
    /// the written paths in layer name order.
    fn export(
        &self,
        as_of: NaiveDate,
        layers: &[&str],
        tables: &BTreeMap<String, Table>,
    ) -> Result<Vec<PathBuf>>;
}

/// Table emitted in place of a failed or zero-row layer so it is never
/// silently missing from the export.
pub fn placeholder(layer: &str) -> Table {
    Table::from_rows(
        &[(PLACEHOLDER_COLUMN, ColumnType::Str)],
        vec![vec![Value::str(format!("No data for {}", layer))]],
    )
    .unwrap_or_default()
}

/// Writes `<layer>_<YYYY-MM-DD>.csv` files into a directory.
pub struct CsvExporter {
    dir: PathBuf,
}

impl CsvExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, layer: &str, as_of: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}_{}.csv", layer, as_of.format("%Y-%m-%d")))
    }

    fn write_table(&self, path: &Path, table: &Table) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(table.column_names())?;
        for row in table.rows() {
            writer.write_record(row.values().iter().map(|v| v.to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl Exporter for CsvExporter {
    fn export(
        &self,
        as_of: NaiveDate,
        layers: &[&str],
        tables: &BTreeMap<String, Table>,
    ) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.dir)?;

        let names: BTreeSet<&str> = layers
            .iter()
            .copied()
            .chain(tables.keys().map(String::as_str))
            .collect();

        let mut written = Vec::with_capacity(names.len());
        for layer in names {
            let path = self.path_for(layer, as_of);
            match tables.get(layer).filter(|t| !t.is_empty()) {
                None => {
                    self.write_table(&path, &placeholder(layer))?;
                    info!("Exported {} (placeholder) to {}", layer, path.display());
                }
                Some(table) => {
                    self.write_table(&path, table)?;
                    info!(
                        "Exported {} ({} rows) to {}",
                        layer,
                        table.num_rows(),
                        path.display()
                    );
                }
            }
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_table() {
        let table = placeholder("betting_odds");
        assert_eq!(table.num_rows(), 1);
        assert_eq!(
            table.value(0, PLACEHOLDER_COLUMN),
            Some(&Value::str("No data for betting_odds"))
        );
    }

    #[test]
    fn test_path_for() {
        let exporter = CsvExporter::new("/tmp/out");
        let as_of = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        assert_eq!(
            exporter.path_for("team_hitting", as_of),
            PathBuf::from("/tmp/out/team_hitting_2024-04-01.csv")
        );
    }
}
