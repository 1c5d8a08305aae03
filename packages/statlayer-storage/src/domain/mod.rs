//! Domain layer for durable layer tables
//!
//! # Domain Models
//!
//! - `IdentitySpec`: ordered column set that identifies a row for upserts
//! - `Capabilities`: what a backend can do atomically
//! - `UpsertStrategy` / `UpsertReport`: which path an upsert took and what it wrote
//!
//! # Port Trait
//!
//! - `DurableStore`: table-existence check, schema create, and the native or
//!   delete+insert write primitives

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use statlayer_core::{ColumnType, Table};
use std::collections::HashSet;
use std::fmt;

use crate::{Result, StorageError};

// ═══════════════════════════════════════════════════════════════════════════
// Domain Models
// ═══════════════════════════════════════════════════════════════════════════

/// Ordered, duplicate-free, non-empty set of identity columns.
///
/// # Examples
///
/// ```rust
/// use statlayer_storage::IdentitySpec;
///
/// let identity = IdentitySpec::new(["Team", "Season", "Split"]).unwrap();
/// assert_eq!(identity.columns(), &["Team", "Season", "Split"]);
/// assert!(IdentitySpec::new(Vec::<String>::new()).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySpec {
    columns: Vec<String>,
}

impl IdentitySpec {
    pub fn new<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(StorageError::config("Identity spec must name at least one column"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(StorageError::config(format!(
                "Identity spec repeats column: {}",
                dup
            )));
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_refs(&self) -> Vec<&str> {
        self.columns.iter().map(String::as_str).collect()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Every identity column must be present in `table`.
    pub fn validate(&self, table: &Table) -> Result<()> {
        let missing: Vec<&str> = self
            .columns
            .iter()
            .map(String::as_str)
            .filter(|c| !table.has_column(c))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(StorageError::schema_mismatch(format!(
                "Identity columns absent from table: {}",
                missing.join(", ")
            )))
        }
    }
}

impl fmt::Display for IdentitySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.columns.join(", "))
    }
}

/// Backend capabilities that drive strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// Atomic insert-or-update keyed by a unique index.
    pub native_upsert: bool,
    /// `delete_then_insert` runs in a single transaction.
    pub transactional_replace: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertStrategy {
    NativeConflict,
    DeleteThenInsert,
}

impl UpsertStrategy {
    pub fn for_capabilities(caps: Capabilities) -> Self {
        if caps.native_upsert {
            UpsertStrategy::NativeConflict
        } else {
            UpsertStrategy::DeleteThenInsert
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertStrategy::NativeConflict => "native_conflict",
            UpsertStrategy::DeleteThenInsert => "delete_then_insert",
        }
    }
}

impl fmt::Display for UpsertStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one successful upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpsertReport {
    pub target: String,
    pub strategy: UpsertStrategy,
    pub rows_written: usize,
    /// Incoming rows superseded by a later row with the same identity.
    pub duplicates_dropped: usize,
    /// Incoming rows with a null identity column; they cannot be matched.
    pub null_identity_dropped: usize,
    /// Target was created by this call.
    pub created: bool,
}

// ═══════════════════════════════════════════════════════════════════════════
// Port Trait
// ═══════════════════════════════════════════════════════════════════════════

/// Durable store port.
///
/// Callers go through [`crate::upsert`], which validates the incoming table
/// and picks the write path; adapters only provide the primitives.
#[async_trait]
pub trait DurableStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    async fn table_exists(&self, name: &str) -> Result<bool>;

    /// Create `name` with `schema` and zero rows, with a unique index over
    /// the identity columns. No-op if it already exists.
    async fn create_table(
        &self,
        name: &str,
        schema: &[(String, ColumnType)],
        identity: &IdentitySpec,
    ) -> Result<()>;

    /// Declared columns of `name`, in table order.
    async fn table_schema(&self, name: &str) -> Result<Vec<(String, ColumnType)>>;

    /// Single conditional insert-or-update keyed by `identity`.
    async fn upsert_native(&self, name: &str, table: &Table, identity: &IdentitySpec)
        -> Result<usize>;

    /// Delete target rows whose identity appears in `table`.
    async fn delete_matching(
        &self,
        name: &str,
        table: &Table,
        identity: &IdentitySpec,
    ) -> Result<usize>;

    async fn insert_rows(&self, name: &str, table: &Table) -> Result<usize>;

    /// Fallback path. A failure between the two steps leaves matching rows
    /// deleted and nothing inserted, which a re-run repairs.
    async fn delete_then_insert(
        &self,
        name: &str,
        table: &Table,
        identity: &IdentitySpec,
    ) -> Result<usize> {
        self.delete_matching(name, table, identity).await?;
        self.insert_rows(name, table).await
    }

    async fn read_table(&self, name: &str) -> Result<Table>;
}
