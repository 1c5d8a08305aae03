//! Identity-keyed upsert of a layer table into a durable store.

use statlayer_core::{Column, ColumnType, Table};
use tracing::{debug, info, warn};

use crate::domain::{DurableStore, IdentitySpec, UpsertReport, UpsertStrategy};
use crate::{Result, StorageError};

/// Reconcile `table` into `target` under `identity`.
///
/// 1. Identity columns must exist in `table` (else `SchemaMismatch`).
/// 2. Rows with a null identity column are skipped; repeated identities keep
///    the last row. Both are reported, neither fails the call.
/// 3. A missing target is created from the table's schema with zero rows.
/// 4. Every incoming column must exist in the target with a compatible type
///    (else `SchemaMismatch`).
/// 5. The write path follows [`DurableStore::capabilities`].
///
/// On success the target holds exactly one row per incoming identity, with
/// the incoming values. Rows with other identities are untouched. A failed
/// call can be re-invoked as-is.
pub async fn upsert(
    store: &dyn DurableStore,
    target: &str,
    table: &Table,
    identity: &IdentitySpec,
) -> Result<UpsertReport> {
    identity.validate(table)?;

    let keys = identity.column_refs();
    let keyed = table.filter(|row| keys.iter().all(|k| !row.get(k).is_null()));
    let null_identity_dropped = table.num_rows() - keyed.num_rows();
    if null_identity_dropped > 0 {
        warn!(
            "Upsert {}: skipping {} rows with a null identity column",
            target, null_identity_dropped
        );
    }

    let (incoming, duplicates_dropped) = keyed.dedupe_by(&keys)?;
    if duplicates_dropped > 0 {
        warn!(
            "Upsert {}: {} rows repeat an identity {}; keeping the last of each",
            target, duplicates_dropped, identity
        );
    }

    let created = if store.table_exists(target).await? {
        false
    } else {
        info!("Upsert {}: creating target on {}", target, store.backend_name());
        store
            .create_table(target, &incoming.schema(), identity)
            .await?;
        true
    };

    let target_schema = store.table_schema(target).await?;
    let incoming = align_to_schema(target, &incoming, &target_schema)?;

    let strategy = UpsertStrategy::for_capabilities(store.capabilities());
    debug!(
        "Upsert {}: {} rows via {} on {}",
        target,
        incoming.num_rows(),
        strategy,
        store.backend_name()
    );

    let rows_written = if incoming.is_empty() {
        0
    } else {
        match strategy {
            UpsertStrategy::NativeConflict => {
                store.upsert_native(target, &incoming, identity).await?
            }
            UpsertStrategy::DeleteThenInsert => {
                store.delete_then_insert(target, &incoming, identity).await?
            }
        }
    };

    info!(
        "Upsert {} completed - {} rows written ({}){}",
        target,
        rows_written,
        strategy,
        if created { ", table created" } else { "" }
    );

    Ok(UpsertReport {
        target: target.to_string(),
        strategy,
        rows_written,
        duplicates_dropped,
        null_identity_dropped,
        created,
    })
}

/// Check every incoming column against the target and widen ints headed
/// for float columns.
fn align_to_schema(
    target: &str,
    incoming: &Table,
    target_schema: &[(String, ColumnType)],
) -> Result<Table> {
    let mut aligned = incoming.clone();
    for column in incoming.columns() {
        let declared = target_schema
            .iter()
            .find(|(name, _)| name == column.name())
            .map(|(_, ty)| *ty)
            .ok_or_else(|| {
                StorageError::schema_mismatch(format!(
                    "Column {} is not in target {}",
                    column.name(),
                    target
                ))
            })?;

        match (column.ty(), declared) {
            (have, want) if have == want => {}
            (ColumnType::Int, ColumnType::Float) => {
                let widened =
                    Column::new(column.name(), ColumnType::Float, column.values().to_vec())?;
                aligned = aligned.with_column(widened)?;
            }
            (have, want) => {
                return Err(StorageError::schema_mismatch(format!(
                    "Column {} is {} but target {} declares {}",
                    column.name(),
                    have,
                    target,
                    want
                )))
            }
        }
    }
    Ok(aligned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use statlayer_core::Value;

    #[test]
    fn test_align_widens_int_into_float_column() {
        let incoming = Table::from_rows(&[("HR", ColumnType::Int)], vec![vec![3.into()]]).unwrap();
        let schema = vec![("HR".to_string(), ColumnType::Float)];
        let aligned = align_to_schema("t", &incoming, &schema).unwrap();
        assert_eq!(aligned.value(0, "HR"), Some(&Value::Float(3.0)));
    }

    #[test]
    fn test_align_rejects_unknown_column() {
        let incoming = Table::from_rows(&[("New", ColumnType::Int)], vec![]).unwrap();
        let schema = vec![("HR".to_string(), ColumnType::Int)];
        let err = align_to_schema("t", &incoming, &schema).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SchemaMismatch);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_align_rejects_type_conflict() {
        let incoming = Table::from_rows(&[("HR", ColumnType::Str)], vec![]).unwrap();
        let schema = vec![("HR".to_string(), ColumnType::Int)];
        assert!(align_to_schema("t", &incoming, &schema).is_err());
    }
}
