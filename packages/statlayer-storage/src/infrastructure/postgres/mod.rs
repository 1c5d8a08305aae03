//! PostgreSQL adapter
//!
//! Native conflict backend: every upsert is a single
//! `INSERT ... ON CONFLICT (identity) DO UPDATE SET c = EXCLUDED.c` per batch,
//! backed by a unique index created with the table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::query_builder::Separated;
use sqlx::{Postgres, QueryBuilder, Row};
use statlayer_core::{ColumnType, Table, Value};
use std::time::Duration;
use tracing::debug;

use super::{column_list, identity_tuples, index_name, quote_ident};
use crate::domain::{Capabilities, DurableStore, IdentitySpec};
use crate::{Result, StorageError};

/// PostgreSQL caps a statement at 65535 bind parameters.
const MAX_BIND_PARAMS: usize = 65_535;

/// PostgreSQL-backed DurableStore
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect with a small pool; refresh runs are single-writer.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await
            .map_err(|e| {
                StorageError::database(format!("Failed to connect to PostgreSQL: {}", e))
                    .with_source(e)
            })?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close connection pool gracefully
    pub async fn close(self) {
        self.pool.close().await;
    }

    fn declared_type(ty: ColumnType) -> &'static str {
        match ty {
            ColumnType::Int => "BIGINT",
            ColumnType::Float => "DOUBLE PRECISION",
            ColumnType::Str => "TEXT",
            ColumnType::Timestamp => "TIMESTAMPTZ",
        }
    }

    /// Map `information_schema.columns.data_type` back to a column type.
    fn column_type(data_type: &str) -> Result<ColumnType> {
        match data_type {
            "bigint" | "integer" | "smallint" => Ok(ColumnType::Int),
            "double precision" | "real" | "numeric" => Ok(ColumnType::Float),
            "text" | "character varying" => Ok(ColumnType::Str),
            "timestamp with time zone" => Ok(ColumnType::Timestamp),
            other => Err(StorageError::schema_mismatch(format!(
                "Unsupported PostgreSQL column type: {}",
                other
            ))),
        }
    }

    fn rows_per_batch(columns: usize) -> usize {
        (MAX_BIND_PARAMS / columns.max(1)).max(1)
    }

    fn push_value(
        builder: &mut Separated<'_, '_, Postgres, &'static str>,
        ty: ColumnType,
        value: &Value,
    ) {
        match ty {
            ColumnType::Int => builder.push_bind(value.as_i64()),
            ColumnType::Float => builder.push_bind(value.as_f64()),
            ColumnType::Str => builder.push_bind(value.as_str().map(str::to_string)),
            ColumnType::Timestamp => builder.push_bind(value.as_timestamp()),
        };
    }

    fn insert_statement<'a>(
        name: &str,
        table: &'a Table,
        rows: std::ops::Range<usize>,
        on_conflict: Option<&str>,
    ) -> QueryBuilder<'a, Postgres> {
        let names = table.column_names();
        let mut builder: QueryBuilder<'a, Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} ({}) ",
            quote_ident(name),
            column_list(&names)
        ));
        builder.push_values(rows, |mut b, i| {
            for column in table.columns() {
                let value = column.get(i).unwrap_or(&Value::Null);
                Self::push_value(&mut b, column.ty(), value);
            }
        });
        if let Some(clause) = on_conflict {
            builder.push(" ");
            builder.push(clause);
        }
        builder
    }

    fn from_row(row: &PgRow, schema: &[(String, ColumnType)]) -> Result<Vec<Value>> {
        schema
            .iter()
            .enumerate()
            .map(|(i, (_, ty))| -> Result<Value> {
                let value = match ty {
                    ColumnType::Int => Value::from(row.try_get::<Option<i64>, _>(i)?),
                    ColumnType::Float => Value::from(row.try_get::<Option<f64>, _>(i)?),
                    ColumnType::Str => Value::from(row.try_get::<Option<String>, _>(i)?),
                    ColumnType::Timestamp => {
                        Value::from(row.try_get::<Option<DateTime<Utc>>, _>(i)?)
                    }
                };
                Ok(value)
            })
            .collect()
    }

    async fn write_batches(
        &self,
        tx: &mut sqlx::Transaction<'_, Postgres>,
        name: &str,
        table: &Table,
        on_conflict: Option<&str>,
    ) -> Result<usize> {
        let batch = Self::rows_per_batch(table.num_columns());
        let mut written = 0;
        let mut start = 0;
        while start < table.num_rows() {
            let end = (start + batch).min(table.num_rows());
            let result = Self::insert_statement(name, table, start..end, on_conflict)
                .build()
                .execute(&mut **tx)
                .await?;
            written += result.rows_affected() as usize;
            start = end;
        }
        Ok(written)
    }

    async fn delete_batches(
        &self,
        tx: &mut sqlx::Transaction<'_, Postgres>,
        name: &str,
        table: &Table,
        identity: &IdentitySpec,
    ) -> Result<usize> {
        let schema = table.schema();
        let key_types: Vec<ColumnType> = identity
            .columns()
            .iter()
            .map(|c| {
                schema
                    .iter()
                    .find(|(n, _)| n == c)
                    .map(|(_, ty)| *ty)
                    .ok_or_else(|| StorageError::schema_mismatch(format!("Identity column {} absent", c)))
            })
            .collect::<Result<_>>()?;

        let mut deleted = 0;
        for tuple in identity_tuples(table, identity) {
            let mut builder: QueryBuilder<'_, Postgres> =
                QueryBuilder::new(format!("DELETE FROM {} WHERE ", quote_ident(name)));
            for (i, (column, value)) in identity.columns().iter().zip(&tuple).enumerate() {
                if i > 0 {
                    builder.push(" AND ");
                }
                builder.push(format!("{} = ", quote_ident(column)));
                match key_types[i] {
                    ColumnType::Int => builder.push_bind(value.as_i64()),
                    ColumnType::Float => builder.push_bind(value.as_f64()),
                    ColumnType::Str => builder.push_bind(value.as_str().map(str::to_string)),
                    ColumnType::Timestamp => builder.push_bind(value.as_timestamp()),
                };
            }
            let result = builder.build().execute(&mut **tx).await?;
            deleted += result.rows_affected() as usize;
        }
        Ok(deleted)
    }
}

#[async_trait]
impl DurableStore for PostgresStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            native_upsert: true,
            transactional_replace: true,
        }
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1)",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
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
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(name),
            columns
        ))
        .execute(&self.pool)
        .await?;
        sqlx::query(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
            index_name(name),
            quote_ident(name),
            column_list(&identity.column_refs())
        ))
        .execute(&self.pool)
        .await?;
        debug!("Created PostgreSQL table {} ({} columns)", name, schema.len());
        Ok(())
    }

    async fn table_schema(&self, name: &str) -> Result<Vec<(String, ColumnType)>> {
        let rows = sqlx::query(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 \
             ORDER BY ordinal_position",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;
        if rows.is_empty() {
            return Err(StorageError::table_not_found(name));
        }
        rows.iter()
            .map(|row| -> Result<(String, ColumnType)> {
                let column: String = row.try_get("column_name")?;
                let data_type: String = row.try_get("data_type")?;
                Ok((column, Self::column_type(&data_type)?))
            })
            .collect()
    }

    async fn upsert_native(&self, name: &str, table: &Table, identity: &IdentitySpec) -> Result<usize> {
        let clause = postgres_conflict_clause(&table.column_names(), identity);
        let mut tx = self.pool.begin().await.map_err(|e| {
            StorageError::transaction(format!("Failed to begin transaction: {}", e)).with_source(e)
        })?;
        let written = self.write_batches(&mut tx, name, table, Some(&clause)).await?;
        tx.commit().await.map_err(|e| {
            StorageError::transaction(format!("Failed to commit transaction: {}", e)).with_source(e)
        })?;
        Ok(written)
    }

    async fn delete_matching(&self, name: &str, table: &Table, identity: &IdentitySpec) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let deleted = self.delete_batches(&mut tx, name, table, identity).await?;
        tx.commit().await?;
        Ok(deleted)
    }

    async fn insert_rows(&self, name: &str, table: &Table) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let written = self.write_batches(&mut tx, name, table, None).await?;
        tx.commit().await?;
        Ok(written)
    }

    async fn delete_then_insert(&self, name: &str, table: &Table, identity: &IdentitySpec) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        self.delete_batches(&mut tx, name, table, identity).await?;
        let written = self.write_batches(&mut tx, name, table, None).await?;
        tx.commit().await?;
        Ok(written)
    }

    async fn read_table(&self, name: &str) -> Result<Table> {
        let schema = self.table_schema(name).await?;
        let names: Vec<&str> = schema.iter().map(|(n, _)| n.as_str()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {} FROM {}",
            column_list(&names),
            quote_ident(name)
        ))
        .fetch_all(&self.pool)
        .await?;

        let values = rows
            .iter()
            .map(|row| Self::from_row(row, &schema))
            .collect::<Result<Vec<_>>>()?;
        let typed: Vec<(&str, ColumnType)> = schema.iter().map(|(n, ty)| (n.as_str(), *ty)).collect();
        Ok(Table::from_rows(&typed, values)?)
    }
}

fn postgres_conflict_clause(columns: &[&str], identity: &IdentitySpec) -> String {
    let updates = columns
        .iter()
        .filter(|c| !identity.contains(c))
        .map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(c)))
        .collect::<Vec<_>>();
    let target = column_list(&identity.column_refs());
    if updates.is_empty() {
        format!("ON CONFLICT ({}) DO NOTHING", target)
    } else {
        format!("ON CONFLICT ({}) DO UPDATE SET {}", target, updates.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_per_batch_stays_under_bind_limit() {
        assert!(PostgresStore::rows_per_batch(5) * 5 <= MAX_BIND_PARAMS);
        assert_eq!(PostgresStore::rows_per_batch(0), MAX_BIND_PARAMS);
        assert_eq!(PostgresStore::rows_per_batch(100_000), 1);
    }

    #[test]
    fn test_conflict_clause() {
        let identity = IdentitySpec::new(["GamePk"]).unwrap();
        assert_eq!(
            postgres_conflict_clause(&["GamePk", "Venue"], &identity),
            "ON CONFLICT (\"GamePk\") DO UPDATE SET \"Venue\" = EXCLUDED.\"Venue\""
        );
    }

    #[test]
    fn test_information_schema_types() {
        assert_eq!(PostgresStore::column_type("bigint").unwrap(), ColumnType::Int);
        assert_eq!(
            PostgresStore::column_type("timestamp with time zone").unwrap(),
            ColumnType::Timestamp
        );
        assert!(PostgresStore::column_type("jsonb").is_err());
    }
}
