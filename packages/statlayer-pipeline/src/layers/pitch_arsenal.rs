//! Career pitch arsenals from locally exported CSV files.

use crate::error::FetchError;
use crate::layer::{LayerContext, LayerOutput};
use crate::sources::csv_table;
use statlayer_core::{normalize_names, summarize, ColumnType, Metric, Table, TableError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const NAME_COLUMN: &str = "last_name, first_name";

/// Source column, output column, type.
const FIELDS: &[(&str, &str, ColumnType)] = &[
    (NAME_COLUMN, "Pitcher Name", ColumnType::Str),
    ("player_id", "Player ID", ColumnType::Int),
    ("pitch_type", "Pitch Type", ColumnType::Str),
    ("pitch_name", "Pitch Name", ColumnType::Str),
    ("pitches", "Pitch Count", ColumnType::Int),
    ("pitch_usage", "Usage %", ColumnType::Float),
    ("whiff_percent", "Whiff %", ColumnType::Float),
    ("k_percent", "K %", ColumnType::Float),
    ("run_value_per_100", "RV/100", ColumnType::Float),
    ("est_woba", "xwOBA", ColumnType::Float),
    ("hard_hit_percent", "Hard Hit %", ColumnType::Float),
];

const GROUP_KEYS: &[&str] = &["Pitcher Name", "Player ID", "Pitch Type", "Pitch Name"];

pub async fn fetch(ctx: &LayerContext) -> Result<LayerOutput, FetchError> {
    let dir = ctx.config().arsenal_dir.clone();
    let files = arsenal_files(&dir).await?;
    if files.is_empty() {
        return Err(FetchError::Unavailable(format!(
            "no arsenal CSV files in {}",
            dir.display()
        )));
    }

    let schema: Vec<(&str, ColumnType)> = FIELDS.iter().map(|(src, _, ty)| (*src, *ty)).collect();
    let mut tables = Vec::with_capacity(files.len());
    for path in &files {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| FetchError::malformed(path.display().to_string(), e))?;
        let table = csv_table(bytes.as_slice(), &schema, &path.display().to_string())?;
        debug!("pitch_arsenal: {} rows from {}", table.num_rows(), path.display());
        tables.push(table);
    }

    let table = career_arsenal(&Table::concat(&tables)?)?;
    info!(
        "pitch_arsenal: {} pitcher/pitch rows from {} files",
        table.num_rows(),
        files.len()
    );
    Ok(table.into())
}

/// `*.csv` files directly under `dir`, sorted by name.
async fn arsenal_files(dir: &Path) -> Result<Vec<PathBuf>, FetchError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(FetchError::Unavailable(format!("{}: {}", dir.display(), e))),
    };
    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| FetchError::Unavailable(format!("{}: {}", dir.display(), e)))?
    {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Normalize names, rename to display columns, and collapse each
/// pitcher's pitch type across files: pitch counts are summed, rates
/// averaged.
pub fn career_arsenal(raw: &Table) -> Result<Table, TableError> {
    let named = normalize_names(raw, NAME_COLUMN)?;
    let pairs: Vec<(&str, &str)> = FIELDS.iter().map(|(src, out, _)| (*src, *out)).collect();
    let renamed = named.rename(&pairs)?;

    let metrics: Vec<Metric> = FIELDS
        .iter()
        .map(|(_, out, _)| *out)
        .filter(|out| !GROUP_KEYS.contains(out))
        .map(|out| match out {
            "Pitch Count" => Metric::sum(out),
            _ => Metric::mean(out),
        })
        .collect();
    summarize(&renamed, GROUP_KEYS, &metrics)
}
