//! Error types for statlayer-storage

use statlayer_core::TableError;
use std::fmt;
use thiserror::Error;

/// What went wrong, independent of the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connectivity or statement failure reported by the backend
    Database,
    /// Commit or rollback failed mid-upsert
    Transaction,
    /// Incoming table does not fit the identity spec or the target schema
    SchemaMismatch,
    /// Target table does not exist
    TableNotFound,
    /// Configuration errors (bad identity spec, unsupported backend URL)
    Config,
    /// Local file access (embedded store path)
    IO,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Database => "database",
            ErrorKind::Transaction => "transaction",
            ErrorKind::SchemaMismatch => "schema_mismatch",
            ErrorKind::TableNotFound => "table_not_found",
            ErrorKind::Config => "config",
            ErrorKind::IO => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error raised by a durable store or by `upsert`
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct StorageError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: ErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transaction, message)
    }

    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SchemaMismatch, message)
    }

    pub fn table_not_found(table: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::TableNotFound,
            format!("Table not found: {}", table.into()),
        )
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// Whether re-invoking the same operation may succeed.
    ///
    /// Upserts are re-runnable without cleanup, so connectivity and
    /// transaction failures are retryable. Schema and configuration defects
    /// are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Database | ErrorKind::Transaction | ErrorKind::IO
        )
    }
}

impl From<TableError> for StorageError {
    fn from(err: TableError) -> Self {
        StorageError::schema_mismatch(err.to_string()).with_source(err)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::new(ErrorKind::IO, format!("store file: {}", err)).with_source(err)
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::database(format!("sqlite: {}", err)).with_source(err)
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::database(format!("postgres: {}", err)).with_source(err)
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
