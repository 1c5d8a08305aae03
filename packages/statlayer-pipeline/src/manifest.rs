//! Failure manifest and the reporter collaborator.

use crate::error::FailureKind;
use crate::fanout::EntityId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use statlayer_core::{ColumnType, Table, TableError, Value};
use tracing::{error, warn};

/// One recorded failure: a whole layer (`entity == None`) or one entity
/// inside a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub layer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityId>,
    pub kind: FailureKind,
    pub message: String,
}

impl FailureEntry {
    pub fn layer(layer: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            entity: None,
            kind,
            message: message.into(),
        }
    }

    pub fn entity(
        layer: impl Into<String>,
        entity: EntityId,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            layer: layer.into(),
            entity: Some(entity),
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FailureEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.entity {
            Some(entity) => write!(
                f,
                "[{}] {} / {}: {}",
                self.kind, self.layer, entity, self.message
            ),
            None => write!(f, "[{}] {}: {}", self.kind, self.layer, self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureManifest {
    entries: Vec<FailureEntry>,
}

impl FailureManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: FailureEntry) {
        self.entries.push(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = FailureEntry>) {
        self.entries.extend(entries);
    }

    pub fn entries(&self) -> &[FailureEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn for_layer<'a>(&'a self, layer: &'a str) -> impl Iterator<Item = &'a FailureEntry> + 'a {
        self.entries.iter().filter(move |e| e.layer == layer)
    }

    pub fn of_kind(&self, kind: FailureKind) -> impl Iterator<Item = &FailureEntry> + '_ {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    /// Anything other than an informational empty result.
    pub fn has_failures(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.kind != FailureKind::EmptyResult)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

const GAP_SCHEMA: [(&str, ColumnType); 4] = [
    ("entity_id", ColumnType::Int),
    ("entity_key", ColumnType::Str),
    ("kind", ColumnType::Str),
    ("message", ColumnType::Str),
];

/// Encode a layer's entity failures as a table so they can be checkpointed
/// next to the layer's rows.
pub fn gaps_to_table(entries: &[FailureEntry]) -> Result<Table, TableError> {
    let rows = entries
        .iter()
        .map(|e| {
            let (id, key) = match &e.entity {
                Some(EntityId::Int(id)) => (Value::Int(*id), Value::Null),
                Some(EntityId::Str(key)) => (Value::Null, Value::str(key.as_str())),
                None => (Value::Null, Value::Null),
            };
            vec![id, key, Value::str(e.kind.as_str()), Value::str(e.message.as_str())]
        })
        .collect();
    Table::from_rows(&GAP_SCHEMA, rows)
}

/// Inverse of [`gaps_to_table`]; `None` when the table is not a gap record.
pub fn gaps_from_table(layer: &str, table: &Table) -> Option<Vec<FailureEntry>> {
    if GAP_SCHEMA.iter().any(|(name, _)| !table.has_column(name)) {
        return None;
    }
    table
        .rows()
        .map(|row| {
            let kind = row.get("kind").as_str()?.parse::<FailureKind>().ok()?;
            let message = row.get("message").as_str().unwrap_or_default();
            let entity = match (row.get("entity_id").as_i64(), row.get("entity_key").as_str()) {
                (Some(id), _) => Some(EntityId::Int(id)),
                (None, Some(key)) => Some(EntityId::from(key)),
                (None, None) => None,
            };
            Some(FailureEntry {
                layer: layer.to_string(),
                entity,
                kind,
                message: message.to_string(),
            })
        })
        .collect()
}

/// Sink for failures as they happen.
pub trait FailureReporter: Send + Sync {
    fn report(&self, entry: &FailureEntry);
}

/// Writes each failure to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl FailureReporter for TracingReporter {
    fn report(&self, entry: &FailureEntry) {
        match entry.kind {
            FailureKind::SchemaMismatch | FailureKind::Persistence => error!("{}", entry),
            _ => warn!("{}", entry),
        }
    }
}

/// Keeps every reported failure for later inspection.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    entries: Mutex<Vec<FailureEntry>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<FailureEntry> {
        self.entries.lock().clone()
    }
}

impl FailureReporter for CollectingReporter {
    fn report(&self, entry: &FailureEntry) {
        self.entries.lock().push(entry.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_queries() {
        let mut manifest = FailureManifest::new();
        manifest.push(FailureEntry::entity(
            "probable_starters",
            EntityId::Int(2),
            FailureKind::TransientFetch,
            "timed out",
        ));
        manifest.push(FailureEntry::layer(
            "betting_odds",
            FailureKind::EmptyResult,
            "no games",
        ));

        assert_eq!(manifest.for_layer("probable_starters").count(), 1);
        assert_eq!(manifest.of_kind(FailureKind::EmptyResult).count(), 1);
        assert!(manifest.has_failures());
    }

    #[test]
    fn test_empty_results_alone_are_not_failures() {
        let mut manifest = FailureManifest::new();
        manifest.push(FailureEntry::entity(
            "probable_starters",
            EntityId::Int(7),
            FailureKind::EmptyResult,
            "no pitches",
        ));
        assert!(!manifest.has_failures());
    }

    #[test]
    fn test_manifest_json() {
        let mut manifest = FailureManifest::new();
        manifest.push(FailureEntry::entity(
            "team_platoon_splits",
            EntityId::from("Cubs/vsLHP"),
            FailureKind::TransientFetch,
            "status 503",
        ));

        let json = manifest.to_json().unwrap();
        assert!(json.contains("\"kind\": \"transient_fetch\""));
        assert!(json.contains("\"entity\": \"Cubs/vsLHP\""));

        let parsed: FailureManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_gap_table_keeps_entities_and_kinds() {
        let entries = vec![
            FailureEntry::entity(
                "pitcherGameLog",
                EntityId::Int(2),
                FailureKind::TransientFetch,
                "timed out after 5s",
            ),
            FailureEntry::entity(
                "team_platoon_splits",
                EntityId::from("112-2024-vsLHP"),
                FailureKind::EmptyResult,
                "no rows",
            ),
        ];

        let table = gaps_to_table(&entries).unwrap();
        assert_eq!(table.num_rows(), 2);

        let replayed = gaps_from_table("pitcherGameLog", &table).unwrap();
        assert_eq!(replayed[0], entries[0]);
        assert_eq!(replayed[1].entity, Some(EntityId::from("112-2024-vsLHP")));
        assert_eq!(replayed[1].kind, FailureKind::EmptyResult);
        assert_eq!(replayed[1].layer, "pitcherGameLog");
    }

    #[test]
    fn test_foreign_table_is_not_a_gap_record() {
        let table =
            Table::from_rows(&[("Team", ColumnType::Str)], vec![vec!["Cubs".into()]]).unwrap();
        assert!(gaps_from_table("teamSplits", &table).is_none());
        let none = gaps_to_table(&[]).unwrap();
        assert_eq!(gaps_from_table("teamSplits", &none), Some(vec![]));
    }

    #[test]
    fn test_collecting_reporter() {
        let reporter = CollectingReporter::new();
        reporter.report(&FailureEntry::layer("odds", FailureKind::CacheIo, "disk full"));
        assert_eq!(reporter.entries().len(), 1);
    }
}
