//! Player-name normalization.

use crate::error::Result;
use crate::table::Table;
use crate::value::Value;

/// `"Kershaw, Clayton"` becomes `"Clayton Kershaw"`.
///
/// Total: anything that is not exactly two non-empty parts around a single
/// `", "` comes back unchanged.
pub fn last_first_to_first_last(name: &str) -> String {
    let mut parts = name.split(", ");
    match (parts.next(), parts.next(), parts.next()) {
        (Some(last), Some(first), None) if !last.trim().is_empty() && !first.trim().is_empty() => {
            format!("{} {}", first.trim(), last.trim())
        }
        _ => name.to_string(),
    }
}

/// Apply [`last_first_to_first_last`] to every string cell of `column`.
/// Nulls stay null.
pub fn normalize_names(table: &Table, column: &str) -> Result<Table> {
    table.map_column(column, |v| match v {
        Value::Str(s) => Value::Str(last_first_to_first_last(s)),
        other => other.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ColumnType;
    use proptest::prelude::*;

    #[test]
    fn test_swaps_last_first() {
        assert_eq!(last_first_to_first_last("Kershaw, Clayton"), "Clayton Kershaw");
        assert_eq!(last_first_to_first_last("De La Cruz, Elly"), "Elly De La Cruz");
    }

    #[test]
    fn test_passes_through_unexpected_shapes() {
        assert_eq!(last_first_to_first_last("Shohei Ohtani"), "Shohei Ohtani");
        assert_eq!(last_first_to_first_last("Smith, Jr., Bob"), "Smith, Jr., Bob");
        assert_eq!(last_first_to_first_last(", Bob"), ", Bob");
        assert_eq!(last_first_to_first_last(""), "");
    }

    #[test]
    fn test_normalize_names_column() {
        let t = Table::from_rows(
            &[("last_name, first_name", ColumnType::Str)],
            vec![vec!["Cole, Gerrit".into()], vec![Value::Null]],
        )
        .unwrap();
        let out = normalize_names(&t, "last_name, first_name").unwrap();
        assert_eq!(out.value(0, "last_name, first_name"), Some(&Value::str("Gerrit Cole")));
        assert_eq!(out.value(1, "last_name, first_name"), Some(&Value::Null));
    }

    proptest! {
        #[test]
        fn prop_never_panics_and_keeps_comma_free_input(s in "\\PC*") {
            let out = last_first_to_first_last(&s);
            if !s.contains(", ") {
                prop_assert_eq!(out, s);
            }
        }
    }
}
