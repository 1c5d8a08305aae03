//! statlayer-core - Table model and summary transforms
//!
//! ## Core Principles
//!
//! 1. **Immutable tables**: every operation returns a new [`Table`]
//! 2. **One missing value**: non-finite floats are stored as `Null`
//! 3. **Null-safe rates**: a zero or null denominator derives to `Null`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use statlayer_core::{summarize, derive, Derivation, Expr, Metric};
//!
//! let per_pitcher = summarize(
//!     &pitches,
//!     &["pitcher"],
//!     &[Metric::mean("release_speed").named("Velo"), Metric::count("pitch_type").named("Pitches")],
//! )?;
//! let rates = derive(
//!     &per_pitcher,
//!     &[Derivation::new("K%", Expr::pct(Expr::col("K_cnt"), Expr::col("Pitches")))],
//! )?;
//! ```

pub mod aggregate;
pub mod error;
pub mod expr;
pub mod normalize;
pub mod table;
pub mod value;

pub use aggregate::{summarize, Metric, Reduction};
pub use error::{Result, TableError};
pub use expr::{derive, round_to, Derivation, Expr};
pub use normalize::{last_first_to_first_last, normalize_names};
pub use table::{Column, Row, Table};
pub use value::{ColumnType, KeyPart, Value};
