//! statlayer-storage - Identity-keyed persistence of layer tables
//!
//! ## Core Principles
//!
//! 1. **Incoming table is authoritative**: after an upsert, every identity it
//!    contains appears exactly once in the target, with its values
//! 2. **Row-set scoped**: rows whose identity is not in the incoming table are
//!    never touched
//! 3. **Schema on first write**: a missing target is created from the incoming
//!    table's columns before any rows are written
//! 4. **Re-runnable**: a failed upsert is retried by calling it again
//!
//! ## Backends
//!
//! - SQLite (`sqlite` feature): embedded default, delete+insert in one
//!   transaction, or native `ON CONFLICT` via `with_native_upsert()`
//! - PostgreSQL (`postgres` feature): native `ON CONFLICT DO UPDATE`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use statlayer_storage::{upsert, IdentitySpec, SqliteStore};
//!
//! let store = SqliteStore::new("baseball.db")?;
//! let identity = IdentitySpec::new(["Season", "Team"])?;
//! let report = upsert(&store, "team_hitting", &table, &identity).await?;
//! ```

pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod upsert;

pub use error::{ErrorKind, Result, StorageError};

pub use domain::{Capabilities, DurableStore, IdentitySpec, UpsertReport, UpsertStrategy};
pub use upsert::upsert;

#[cfg(feature = "postgres")]
pub use infrastructure::PostgresStore;
#[cfg(feature = "sqlite")]
pub use infrastructure::SqliteStore;
