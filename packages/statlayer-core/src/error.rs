use crate::value::ColumnType;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TableError>;

/// Structural errors raised while building or combining tables.
///
/// All of these indicate a configuration or schema defect in the caller, not
/// a transient condition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),

    #[error("Column {column} has {found} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("Column {column} declared {expected} but holds a {found} value")]
    TypeMismatch {
        column: String,
        expected: ColumnType,
        found: ColumnType,
    },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Column {column} is {left} on one side and {right} on the other")]
    ColumnTypeConflict {
        column: String,
        left: ColumnType,
        right: ColumnType,
    },

    #[error("Join on {key} would multiply rows: right side has {duplicates} duplicate keys")]
    JoinCardinality { key: String, duplicates: usize },

    #[error("Reduction {reduction} cannot be applied to {column} ({ty})")]
    UnsupportedReduction {
        reduction: &'static str,
        column: String,
        ty: ColumnType,
    },

    #[error("Row has {found} values, schema has {expected} columns")]
    RowWidth { expected: usize, found: usize },
}

impl TableError {
    pub fn column_not_found(name: impl Into<String>) -> Self {
        Self::ColumnNotFound(name.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TableError::ColumnTypeConflict {
            column: "PA".to_string(),
            left: ColumnType::Int,
            right: ColumnType::Str,
        };
        assert_eq!(err.to_string(), "Column PA is int on one side and str on the other");

        let err = TableError::JoinCardinality {
            key: "pitcher_id".to_string(),
            duplicates: 2,
        };
        assert!(err.to_string().contains("pitcher_id"));
    }
}
