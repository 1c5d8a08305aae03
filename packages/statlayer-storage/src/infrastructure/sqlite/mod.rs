//! SQLite adapter (embedded default backend)
//!
//! Column types map to SQLite declared types:
//!
//! | ColumnType  | Declared    | Stored as      |
//! |-------------|-------------|----------------|
//! | `Int`       | `INTEGER`   | integer        |
//! | `Float`     | `REAL`      | real           |
//! | `Str`       | `TEXT`      | text           |
//! | `Timestamp` | `TIMESTAMP` | RFC 3339 text  |
//!
//! By default the adapter reports no native upsert, so [`crate::upsert`]
//! takes the delete+insert path, run here inside one transaction.
//! [`SqliteStore::with_native_upsert`] switches to `ON CONFLICT DO UPDATE`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Transaction};
use statlayer_core::{ColumnType, Table, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::{column_list, identity_tuples, index_name, quote_ident};
use crate::domain::{Capabilities, DurableStore, IdentitySpec};
use crate::{Result, StorageError};

/// SQLite-backed DurableStore
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    native_upsert: bool,
}

impl SqliteStore {
    /// Open (or create) a database file at `db_path`
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Ok(Self::from_connection(conn))
    }

    /// Create an in-memory SQLite store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            native_upsert: false,
        }
    }

    /// Use `INSERT ... ON CONFLICT ... DO UPDATE` instead of delete+insert.
    pub fn with_native_upsert(mut self) -> Self {
        self.native_upsert = true;
        self
    }

    fn declared_type(ty: ColumnType) -> &'static str {
        match ty {
            ColumnType::Int => "INTEGER",
            ColumnType::Float => "REAL",
            ColumnType::Str => "TEXT",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }

    fn column_type(declared: &str) -> Result<ColumnType> {
        match declared.to_ascii_uppercase().as_str() {
            "INTEGER" | "INT" | "BIGINT" => Ok(ColumnType::Int),
            "REAL" | "FLOAT" | "DOUBLE" => Ok(ColumnType::Float),
            "TEXT" | "VARCHAR" => Ok(ColumnType::Str),
            "TIMESTAMP" | "DATETIME" => Ok(ColumnType::Timestamp),
            other => Err(StorageError::schema_mismatch(format!(
                "Unsupported SQLite column type: {}",
                other
            ))),
        }
    }

    fn to_sql(value: &Value) -> SqlValue {
        match value {
            Value::Null => SqlValue::Null,
            Value::Int(v) => SqlValue::Integer(*v),
            Value::Float(v) => SqlValue::Real(*v),
            Value::Str(s) => SqlValue::Text(s.clone()),
            Value::Timestamp(ts) => SqlValue::Text(ts.to_rfc3339()),
        }
    }

    fn from_sql(column: &str, ty: ColumnType, raw: ValueRef<'_>) -> Result<Value> {
        let value = match (ty, raw) {
            (_, ValueRef::Null) => Value::Null,
            (ColumnType::Int, ValueRef::Integer(v)) => Value::Int(v),
            (ColumnType::Float, ValueRef::Real(v)) => Value::float(v),
            (ColumnType::Float, ValueRef::Integer(v)) => Value::float(v as f64),
            (ColumnType::Str, ValueRef::Text(bytes)) => {
                Value::Str(String::from_utf8_lossy(bytes).into_owned())
            }
            (ColumnType::Timestamp, ValueRef::Text(bytes)) => {
                let text = String::from_utf8_lossy(bytes);
                let ts = DateTime::parse_from_rfc3339(&text).map_err(|e| {
                    StorageError::database(format!("Bad timestamp in {}: {}", column, e))
                })?;
                Value::Timestamp(ts.with_timezone(&Utc))
            }
            (ty, other) => {
                return Err(StorageError::schema_mismatch(format!(
                    "Column {} declared {} holds {:?}",
                    column,
                    ty,
                    other.data_type()
                )))
            }
        };
        Ok(value)
    }

    fn schema_of(conn: &Connection, name: &str) -> Result<Vec<(String, ColumnType)>> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(name)))?;
        let columns = stmt
            .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if columns.is_empty() {
            return Err(StorageError::table_not_found(name));
        }
        columns
            .into_iter()
            .map(|(column, declared)| -> Result<(String, ColumnType)> {
                Ok((column, Self::column_type(&declared)?))
            })
            .collect()
    }

    fn ensure_identity_index(conn: &Connection, name: &str, identity: &IdentitySpec) -> Result<()> {
        conn.execute(
            &format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
                index_name(name),
                quote_ident(name),
                column_list(&identity.column_refs())
            ),
            [],
        )?;
        Ok(())
    }

    fn delete_in(tx: &Transaction<'_>, name: &str, table: &Table, identity: &IdentitySpec) -> Result<usize> {
        let predicate = identity
            .columns()
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", quote_ident(c), i + 1))
            .collect::<Vec<_>>()
            .join(" AND ");
        let mut stmt = tx.prepare(&format!(
            "DELETE FROM {} WHERE {}",
            quote_ident(name),
            predicate
        ))?;

        let mut deleted = 0;
        for tuple in identity_tuples(table, identity) {
            deleted += stmt.execute(params_from_iter(tuple.iter().map(Self::to_sql)))?;
        }
        Ok(deleted)
    }

    fn insert_in(tx: &Transaction<'_>, name: &str, table: &Table, on_conflict: Option<&str>) -> Result<usize> {
        let names = table.column_names();
        let placeholders = (1..=names.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(name),
            column_list(&names),
            placeholders
        );
        if let Some(clause) = on_conflict {
            sql.push(' ');
            sql.push_str(clause);
        }

        let mut stmt = tx.prepare(&sql)?;
        let mut written = 0;
        for row in table.rows() {
            written += stmt.execute(params_from_iter(row.values().into_iter().map(Self::to_sql)))?;
        }
        Ok(written)
    }
}

/// `ON CONFLICT (...) DO UPDATE SET c = excluded.c` for every non-identity
/// column; `DO NOTHING` when the identity covers every column.
pub(crate) fn conflict_clause(columns: &[&str], identity: &IdentitySpec) -> String {
    let updates = columns
        .iter()
        .filter(|c| !identity.contains(c))
        .map(|c| format!("{0} = excluded.{0}", quote_ident(c)))
        .collect::<Vec<_>>();
    let target = column_list(&identity.column_refs());
    if updates.is_empty() {
        format!("ON CONFLICT ({}) DO NOTHING", target)
    } else {
        format!("ON CONFLICT ({}) DO UPDATE SET {}", target, updates.join(", "))
    }
}

#[async_trait]
impl DurableStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            native_upsert: self.native_upsert,
            transactional_replace: true,
        }
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn create_table(
        &self,
        name: &str,
        schema: &[(String, ColumnType)],
        identity: &IdentitySpec,
    ) -> Result<()> {
        let columns = schema
            .iter()
            .map(|(column, ty)| format!("{} {}", quote_ident(column), Self::declared_type(*ty)))
            .collect::<Vec<_>>()
            .join(", ");
        let conn = self.conn.lock();
        conn.execute(
            &format!("CREATE TABLE IF NOT EXISTS {} ({})", quote_ident(name), columns),
            [],
        )?;
        Self::ensure_identity_index(&conn, name, identity)?;
        debug!("Created SQLite table {} ({} columns)", name, schema.len());
        Ok(())
    }

    async fn table_schema(&self, name: &str) -> Result<Vec<(String, ColumnType)>> {
        let conn = self.conn.lock();
        Self::schema_of(&conn, name)
    }

    async fn upsert_native(&self, name: &str, table: &Table, identity: &IdentitySpec) -> Result<usize> {
        let clause = conflict_clause(&table.column_names(), identity);
        let mut conn = self.conn.lock();
        Self::ensure_identity_index(&conn, name, identity)?;
        let tx = conn
            .transaction()
            .map_err(|e| StorageError::transaction(format!("Failed to begin: {}", e)).with_source(e))?;
        let written = Self::insert_in(&tx, name, table, Some(&clause))?;
        tx.commit()
            .map_err(|e| StorageError::transaction(format!("Failed to commit: {}", e)).with_source(e))?;
        Ok(written)
    }

    async fn delete_matching(&self, name: &str, table: &Table, identity: &IdentitySpec) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let deleted = Self::delete_in(&tx, name, table, identity)?;
        tx.commit()?;
        Ok(deleted)
    }

    async fn insert_rows(&self, name: &str, table: &Table) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let written = Self::insert_in(&tx, name, table, None)?;
        tx.commit()?;
        Ok(written)
    }

    async fn delete_then_insert(&self, name: &str, table: &Table, identity: &IdentitySpec) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| StorageError::transaction(format!("Failed to begin: {}", e)).with_source(e))?;
        let deleted = Self::delete_in(&tx, name, table, identity)?;
        let written = Self::insert_in(&tx, name, table, None)?;
        tx.commit()
            .map_err(|e| StorageError::transaction(format!("Failed to commit: {}", e)).with_source(e))?;
        debug!("Replaced rows in {}: {} deleted, {} inserted", name, deleted, written);
        Ok(written)
    }

    async fn read_table(&self, name: &str) -> Result<Table> {
        let conn = self.conn.lock();
        let schema = Self::schema_of(&conn, name)?;
        let names: Vec<&str> = schema.iter().map(|(n, _)| n.as_str()).collect();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} ORDER BY rowid",
            column_list(&names),
            quote_ident(name)
        ))?;

        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let values = schema
                .iter()
                .enumerate()
                .map(|(i, (column, ty))| Self::from_sql(column, *ty, row.get_ref(i)?))
                .collect::<Result<Vec<_>>>()?;
            rows.push(values);
        }

        let typed: Vec<(&str, ColumnType)> = schema.iter().map(|(n, ty)| (n.as_str(), *ty)).collect();
        Ok(Table::from_rows(&typed, rows)?)
    }
}
