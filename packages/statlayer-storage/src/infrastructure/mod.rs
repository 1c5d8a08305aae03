//! Durable store adapters

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use statlayer_core::{KeyPart, Table, Value};
use std::collections::HashSet;

use crate::domain::IdentitySpec;

/// Double-quote an SQL identifier. Layer column names carry spaces and
/// punctuation (`"K%"`, `"GB/FB"`).
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn column_list(names: &[&str]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn index_name(table: &str) -> String {
    quote_ident(&format!("ux_{}_identity", table))
}

/// Distinct identity tuples present in `table`, in first-appearance order.
pub(crate) fn identity_tuples(table: &Table, identity: &IdentitySpec) -> Vec<Vec<Value>> {
    let keys = identity.column_refs();
    let mut seen: HashSet<Vec<KeyPart>> = HashSet::new();
    table
        .rows()
        .filter(|row| seen.insert(row.key(&keys)))
        .map(|row| keys.iter().map(|k| row.get(k).clone()).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use statlayer_core::ColumnType;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("K%"), "\"K%\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_identity_tuples_are_distinct() {
        let table = Table::from_rows(
            &[("Team", ColumnType::Str), ("Season", ColumnType::Int)],
            vec![
                vec!["Cubs".into(), 2024.into()],
                vec!["Cubs".into(), 2024.into()],
                vec!["Cubs".into(), 2023.into()],
            ],
        )
        .unwrap();
        let identity = IdentitySpec::new(["Team", "Season"]).unwrap();
        assert_eq!(identity_tuples(&table, &identity).len(), 2);
    }
}
