use statlayer_core::TableError;
use statlayer_storage::StorageError;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid state transition for {layer}: {from} -> {to}")]
    InvalidStateTransition {
        layer: String,
        from: String,
        to: String,
    },

    #[error("Layer already registered: {0}")]
    DuplicateLayer(String),

    #[error("Invalid layer name {0:?}: use letters, digits, '_' or '-'")]
    InvalidLayerName(String),

    #[error("Schema mismatch in {layer}: {message}")]
    SchemaMismatch { layer: String, message: String },

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl PipelineError {
    pub fn parse<E: std::fmt::Display>(e: E) -> Self {
        Self::Parse(e.to_string())
    }
}

/// Failure of one layer fetch or one per-entity fetch.
///
/// Every variant is absorbed into the failure manifest; none aborts a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Malformed response from {source_name}: {message}")]
    Malformed {
        source_name: String,
        message: String,
    },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Table error: {0}")]
    Table(#[from] TableError),
}

impl FetchError {
    pub fn malformed(source_name: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Malformed {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Table(_) => FailureKind::SchemaMismatch,
            _ => FailureKind::TransientFetch,
        }
    }
}

/// Checkpoint read or write failure. Logged and recorded, never fatal.
#[derive(Error, Debug)]
#[error("Checkpoint {key}: {message}")]
pub struct CacheIoError {
    pub key: String,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CacheIoError {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ConfigError {
    pub fn invalid(key: &str, value: impl ToString, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure classification carried by every manifest entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network error, timeout, bad response or panic in a fetch
    TransientFetch,
    /// A per-entity fetch returned no rows
    EmptyResult,
    /// Checkpoint read/write failed; the run continued uncached
    CacheIo,
    /// Column set conflict or missing identity column
    SchemaMismatch,
    /// Durable store failure; re-run to retry
    Persistence,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::TransientFetch => "transient_fetch",
            FailureKind::EmptyResult => "empty_result",
            FailureKind::CacheIo => "cache_io",
            FailureKind::SchemaMismatch => "schema_mismatch",
            FailureKind::Persistence => "persistence",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::TransientFetch | FailureKind::CacheIo | FailureKind::Persistence
        )
    }
}

impl std::str::FromStr for FailureKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "transient_fetch" => Ok(FailureKind::TransientFetch),
            "empty_result" => Ok(FailureKind::EmptyResult),
            "cache_io" => Ok(FailureKind::CacheIo),
            "schema_mismatch" => Ok(FailureKind::SchemaMismatch),
            "persistence" => Ok(FailureKind::Persistence),
            _ => Err(PipelineError::parse(format!("Invalid failure kind: {}", s))),
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
