//! Immutable columnar tables.
//!
//! A [`Table`] is an ordered list of uniquely named, typed columns of equal
//! length. Every operation returns a new table; nothing mutates in place.

use crate::error::{Result, TableError};
use crate::value::{ColumnType, KeyPart, Value};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawColumn")]
pub struct Column {
    name: String,
    ty: ColumnType,
    values: Vec<Value>,
}

impl Column {
    /// Build a column, coercing ints into float columns and rejecting any
    /// other type mismatch.
    pub fn new(name: impl Into<String>, ty: ColumnType, values: Vec<Value>) -> Result<Self> {
        let name = name.into();
        let values = values
            .into_iter()
            .map(|v| {
                v.coerce(ty).map_err(|bad| TableError::TypeMismatch {
                    column: name.clone(),
                    expected: ty,
                    // coerce only fails on non-null values
                    found: bad.column_type().unwrap_or(ty),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { name, ty, values })
    }

    pub fn nulls(name: impl Into<String>, ty: ColumnType, len: usize) -> Self {
        Self {
            name: name.into(),
            ty,
            values: vec![Value::Null; len],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> ColumnType {
        self.ty
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<&Value> {
        self.values.get(row)
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn take(&self, indices: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            ty: self.ty,
            values: indices.iter().map(|&i| self.values[i].clone()).collect(),
        }
    }
}

/// Borrowed view of one table row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a Table,
    index: usize,
}

impl<'a> Row<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Value of `column` in this row; `Null` when the column is absent.
    pub fn get(&self, column: &str) -> &'a Value {
        self.table
            .column(column)
            .and_then(|c| c.get(self.index))
            .unwrap_or(&Value::Null)
    }

    pub fn values(&self) -> Vec<&'a Value> {
        self.table
            .columns
            .iter()
            .map(|c| &c.values[self.index])
            .collect()
    }

    /// Grouping key over `columns`.
    pub fn key(&self, columns: &[&str]) -> Vec<KeyPart> {
        columns.iter().map(|c| self.get(c).key()).collect()
    }
}

/// Ordered collection of named columns with equal row counts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct Table {
    columns: Vec<Column>,
    num_rows: usize,
}

// Deserialized forms, checked through the same constructors as built tables

#[derive(Deserialize)]
struct RawColumn {
    name: String,
    ty: ColumnType,
    values: Vec<Value>,
}

impl TryFrom<RawColumn> for Column {
    type Error = TableError;

    fn try_from(raw: RawColumn) -> Result<Self> {
        Column::new(raw.name, raw.ty, raw.values)
    }
}

#[derive(Deserialize)]
struct RawTable {
    columns: Vec<Column>,
    num_rows: usize,
}

impl TryFrom<RawTable> for Table {
    type Error = TableError;

    fn try_from(raw: RawTable) -> Result<Self> {
        Table::with_row_count(raw.columns, raw.num_rows)
    }
}

impl Table {
    /// Zero columns, zero rows.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let num_rows = columns.first().map(Column::len).unwrap_or(0);
        Self::with_row_count(columns, num_rows)
    }

    /// Build from columns with an explicit row count, which is what lets a
    /// table with zero columns still carry rows.
    pub fn with_row_count(columns: Vec<Column>, num_rows: usize) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
            if column.len() != num_rows {
                return Err(TableError::LengthMismatch {
                    column: column.name.clone(),
                    expected: num_rows,
                    found: column.len(),
                });
            }
        }
        Ok(Self { columns, num_rows })
    }

    /// Build from a schema and row-major values.
    pub fn from_rows(schema: &[(&str, ColumnType)], rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut buffers: Vec<Vec<Value>> = schema
            .iter()
            .map(|_| Vec::with_capacity(rows.len()))
            .collect();
        for row in rows {
            if row.len() != schema.len() {
                return Err(TableError::RowWidth {
                    expected: schema.len(),
                    found: row.len(),
                });
            }
            for (buffer, value) in buffers.iter_mut().zip(row) {
                buffer.push(value);
            }
        }
        let num_rows = buffers.first().map(Vec::len).unwrap_or(0);
        let columns = schema
            .iter()
            .zip(buffers)
            .map(|((name, ty), values)| Column::new(*name, *ty, values))
            .collect::<Result<Vec<_>>>()?;
        Self::with_row_count(columns, num_rows)
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn schema(&self) -> Vec<(String, ColumnType)> {
        self.columns.iter().map(|c| (c.name.clone(), c.ty)).collect()
    }

    pub fn require_column(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| TableError::column_not_found(name))
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        self.column(column).and_then(|c| c.get(row))
    }

    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        (index < self.num_rows).then_some(Row { table: self, index })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> + '_ {
        (0..self.num_rows).map(move |index| Row { table: self, index })
    }

    /// Same columns, zero rows.
    pub fn schema_only(&self) -> Self {
        Self {
            columns: self.columns.iter().map(|c| c.take(&[])).collect(),
            num_rows: 0,
        }
    }

    /// Add `column`, replacing any existing column of the same name in place.
    pub fn with_column(&self, column: Column) -> Result<Self> {
        if column.len() != self.num_rows {
            return Err(TableError::LengthMismatch {
                column: column.name.clone(),
                expected: self.num_rows,
                found: column.len(),
            });
        }
        let mut columns = self.columns.clone();
        match columns.iter().position(|c| c.name == column.name) {
            Some(i) => columns[i] = column,
            None => columns.push(column),
        }
        Ok(Self {
            columns,
            num_rows: self.num_rows,
        })
    }

    /// Apply `f` to every value of `column`, keeping its type.
    pub fn map_column(&self, column: &str, f: impl Fn(&Value) -> Value) -> Result<Self> {
        let source = self.require_column(column)?;
        let mapped = Column::new(column, source.ty, source.values.iter().map(f).collect())?;
        self.with_column(mapped)
    }

    /// Keep only `names`, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<Self> {
        let columns = names
            .iter()
            .map(|n| self.require_column(n).cloned())
            .collect::<Result<Vec<_>>>()?;
        Self::with_row_count(columns, self.num_rows)
    }

    pub fn drop_columns(&self, names: &[&str]) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .filter(|c| !names.contains(&c.name.as_str()))
                .cloned()
                .collect(),
            num_rows: self.num_rows,
        }
    }

    /// Rename columns. Pairs naming absent columns are ignored.
    pub fn rename(&self, pairs: &[(&str, &str)]) -> Result<Self> {
        let columns = self
            .columns
            .iter()
            .map(|c| match pairs.iter().find(|(from, _)| *from == c.name) {
                Some((_, to)) => c.clone().renamed(*to),
                None => c.clone(),
            })
            .collect();
        Self::with_row_count(columns, self.num_rows)
    }

    pub fn filter(&self, predicate: impl Fn(Row<'_>) -> bool) -> Self {
        let keep: Vec<usize> = self.rows().filter(|r| predicate(*r)).map(|r| r.index).collect();
        self.take(&keep)
    }

    /// Stable sort by `keys`, ascending, nulls first.
    pub fn sort_by(&self, keys: &[&str]) -> Result<Self> {
        let key_columns = keys
            .iter()
            .map(|k| self.require_column(k))
            .collect::<Result<Vec<_>>>()?;
        let mut order: Vec<usize> = (0..self.num_rows).collect();
        order.sort_by(|&a, &b| {
            key_columns
                .iter()
                .map(|c| c.values[a].total_cmp(&c.values[b]))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(self.take(&order))
    }

    /// Drop rows whose `keys` repeat a later row, keeping the last
    /// occurrence. Returns the table and the number of rows dropped.
    pub fn dedupe_by(&self, keys: &[&str]) -> Result<(Self, usize)> {
        for k in keys {
            self.require_column(k)?;
        }
        let mut last: HashMap<Vec<KeyPart>, usize> = HashMap::new();
        for row in self.rows() {
            last.insert(row.key(keys), row.index);
        }
        let keep: Vec<usize> = self
            .rows()
            .filter(|r| last.get(&r.key(keys)) == Some(&r.index))
            .map(|r| r.index)
            .collect();
        let dropped = self.num_rows - keep.len();
        Ok((self.take(&keep), dropped))
    }

    /// Number of distinct key combinations over `keys`.
    pub fn distinct_count(&self, keys: &[&str]) -> Result<usize> {
        for k in keys {
            self.require_column(k)?;
        }
        Ok(self
            .rows()
            .map(|r| r.key(keys))
            .collect::<HashSet<_>>()
            .len())
    }

    /// Union of rows across `tables`, matching columns by name.
    ///
    /// Column order follows first appearance. Columns missing from a table
    /// are null-filled for its rows. An int column meeting a float column of
    /// the same name widens to float; any other type disagreement is a
    /// [`TableError::ColumnTypeConflict`].
    pub fn concat(tables: &[Table]) -> Result<Self> {
        let mut schema: Vec<(String, ColumnType)> = Vec::new();
        for table in tables {
            for column in &table.columns {
                match schema.iter_mut().find(|(n, _)| *n == column.name) {
                    None => schema.push((column.name.clone(), column.ty)),
                    Some((_, ty)) if *ty == column.ty => {}
                    Some((_, ty)) if ty.is_numeric() && column.ty.is_numeric() => {
                        *ty = ColumnType::Float;
                    }
                    Some((name, ty)) => {
                        return Err(TableError::ColumnTypeConflict {
                            column: name.clone(),
                            left: *ty,
                            right: column.ty,
                        })
                    }
                }
            }
        }

        let num_rows: usize = tables.iter().map(Table::num_rows).sum();
        let columns = schema
            .into_iter()
            .map(|(name, ty)| {
                let mut values = Vec::with_capacity(num_rows);
                for table in tables {
                    match table.column(&name) {
                        Some(c) => values.extend(c.values.iter().cloned()),
                        None => values.extend(std::iter::repeat(Value::Null).take(table.num_rows)),
                    }
                }
                Column::new(name, ty, values)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::with_row_count(columns, num_rows)
    }

    /// Left join on `left_on = right_on`.
    ///
    /// The right side must be unique on its key: a join that would multiply
    /// left rows fails with [`TableError::JoinCardinality`] instead of
    /// silently expanding. Unmatched (or null-keyed) left rows get nulls.
    /// The right key column is not repeated in the output.
    pub fn left_join(&self, right: &Table, left_on: &str, right_on: &str) -> Result<Self> {
        let left_key = self.require_column(left_on)?;
        let right_key = right.require_column(right_on)?;

        let mut index: HashMap<KeyPart, usize> = HashMap::new();
        let mut duplicates = 0;
        for (i, v) in right_key.values.iter().enumerate() {
            if v.is_null() {
                continue;
            }
            if index.insert(v.key(), i).is_some() {
                duplicates += 1;
            }
        }
        if duplicates > 0 {
            return Err(TableError::JoinCardinality {
                key: right_on.to_string(),
                duplicates,
            });
        }

        let matches: Vec<Option<usize>> = left_key
            .values
            .iter()
            .map(|v| if v.is_null() { None } else { index.get(&v.key()).copied() })
            .collect();

        let mut columns = self.columns.clone();
        for column in right.columns.iter().filter(|c| c.name != right_on) {
            let values = matches
                .iter()
                .map(|m| m.map(|i| column.values[i].clone()).unwrap_or(Value::Null))
                .collect();
            columns.push(Column {
                name: column.name.clone(),
                ty: column.ty,
                values,
            });
        }
        Self::with_row_count(columns, self.num_rows)
    }

    fn take(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
            num_rows: indices.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn teams() -> Table {
        Table::from_rows(
            &[("Team", ColumnType::Str), ("PA", ColumnType::Int)],
            vec![
                vec!["Cubs".into(), 10.into()],
                vec!["Mets".into(), 20.into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_from_rows_builds_columns() {
        let t = teams();
        assert_eq!(t.num_rows(), 2);
        assert_eq!(t.column_names(), vec!["Team", "PA"]);
        assert_eq!(t.value(1, "PA"), Some(&Value::Int(20)));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let err = Table::from_columns(vec![
            Column::nulls("a", ColumnType::Int, 1),
            Column::nulls("a", ColumnType::Str, 1),
        ])
        .unwrap_err();
        assert_eq!(err, TableError::DuplicateColumn("a".to_string()));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let err = Table::from_columns(vec![
            Column::nulls("a", ColumnType::Int, 2),
            Column::nulls("b", ColumnType::Int, 3),
        ])
        .unwrap_err();
        assert!(matches!(err, TableError::LengthMismatch { found: 3, .. }));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let err = Column::new("PA", ColumnType::Int, vec![Value::str("ten")]).unwrap_err();
        assert!(matches!(err, TableError::TypeMismatch { .. }));
    }

    #[test]
    fn test_row_width_checked() {
        let err = Table::from_rows(&[("a", ColumnType::Int)], vec![vec![1.into(), 2.into()]])
            .unwrap_err();
        assert_eq!(err, TableError::RowWidth { expected: 1, found: 2 });
    }

    #[test]
    fn test_zero_column_table_keeps_row_count() {
        let t = Table::with_row_count(vec![], 3).unwrap();
        assert_eq!(t.num_rows(), 3);
        assert_eq!(t.num_columns(), 0);
        assert!(!t.is_empty());
    }

    #[test]
    fn test_concat_unions_columns_and_fills_nulls() {
        let a = teams();
        let b = Table::from_rows(
            &[("Team", ColumnType::Str), ("HR", ColumnType::Int)],
            vec![vec!["Cubs".into(), 3.into()]],
        )
        .unwrap();

        let merged = Table::concat(&[a, b]).unwrap();
        assert_eq!(merged.num_rows(), 3);
        assert_eq!(merged.column_names(), vec!["Team", "PA", "HR"]);
        assert_eq!(merged.value(0, "HR"), Some(&Value::Null));
        assert_eq!(merged.value(2, "PA"), Some(&Value::Null));
        assert_eq!(merged.value(2, "HR"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_concat_widens_int_to_float() {
        let a = Table::from_rows(&[("x", ColumnType::Int)], vec![vec![1.into()]]).unwrap();
        let b = Table::from_rows(&[("x", ColumnType::Float)], vec![vec![2.5.into()]]).unwrap();
        let merged = Table::concat(&[a, b]).unwrap();
        assert_eq!(merged.column("x").unwrap().ty(), ColumnType::Float);
        assert_eq!(merged.value(0, "x"), Some(&Value::Float(1.0)));
    }

    #[test]
    fn test_concat_type_conflict() {
        let a = Table::from_rows(&[("x", ColumnType::Int)], vec![vec![1.into()]]).unwrap();
        let b = Table::from_rows(&[("x", ColumnType::Str)], vec![vec!["1".into()]]).unwrap();
        let err = Table::concat(&[a, b]).unwrap_err();
        assert!(matches!(err, TableError::ColumnTypeConflict { .. }));
    }

    #[test]
    fn test_concat_of_nothing_is_empty() {
        assert_eq!(Table::concat(&[]).unwrap(), Table::empty());
    }

    #[test]
    fn test_dedupe_keeps_last() {
        let t = Table::from_rows(
            &[("id", ColumnType::Int), ("v", ColumnType::Str)],
            vec![
                vec![1.into(), "old".into()],
                vec![2.into(), "only".into()],
                vec![1.into(), "new".into()],
            ],
        )
        .unwrap();
        let (deduped, dropped) = t.dedupe_by(&["id"]).unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(deduped.num_rows(), 2);
        assert_eq!(deduped.value(0, "v"), Some(&Value::str("only")));
        assert_eq!(deduped.value(1, "v"), Some(&Value::str("new")));
    }

    #[test]
    fn test_left_join_fills_unmatched() {
        let games = Table::from_rows(
            &[("GamePk", ColumnType::Int), ("Pitcher ID", ColumnType::Int)],
            vec![
                vec![1.into(), 100.into()],
                vec![2.into(), 200.into()],
                vec![3.into(), Value::Null],
            ],
        )
        .unwrap();
        let stats = Table::from_rows(
            &[("pitcher_id", ColumnType::Int), ("Velo", ColumnType::Float)],
            vec![vec![100.into(), 95.5.into()]],
        )
        .unwrap();

        let joined = games.left_join(&stats, "Pitcher ID", "pitcher_id").unwrap();
        assert_eq!(joined.column_names(), vec!["GamePk", "Pitcher ID", "Velo"]);
        assert_eq!(joined.value(0, "Velo"), Some(&Value::Float(95.5)));
        assert_eq!(joined.value(1, "Velo"), Some(&Value::Null));
        assert_eq!(joined.value(2, "Velo"), Some(&Value::Null));
    }

    #[test]
    fn test_left_join_rejects_row_explosion() {
        let left = Table::from_rows(&[("k", ColumnType::Int)], vec![vec![1.into()]]).unwrap();
        let right = Table::from_rows(
            &[("k", ColumnType::Int), ("v", ColumnType::Int)],
            vec![vec![1.into(), 1.into()], vec![1.into(), 2.into()]],
        )
        .unwrap();
        let err = left.left_join(&right, "k", "k").unwrap_err();
        assert_eq!(
            err,
            TableError::JoinCardinality {
                key: "k".to_string(),
                duplicates: 1
            }
        );
    }

    #[test]
    fn test_sort_and_filter() {
        let t = teams().sort_by(&["PA"]).unwrap();
        assert_eq!(t.value(0, "Team"), Some(&Value::str("Cubs")));

        let filtered = t.filter(|r| r.get("PA").as_i64().unwrap_or(0) > 15);
        assert_eq!(filtered.num_rows(), 1);
        assert_eq!(filtered.value(0, "Team"), Some(&Value::str("Mets")));
    }

    #[test]
    fn test_rename_and_select() {
        let t = teams().rename(&[("PA", "Plate Appearances"), ("Missing", "x")]).unwrap();
        assert_eq!(t.column_names(), vec!["Team", "Plate Appearances"]);
        let selected = t.select(&["Plate Appearances"]).unwrap();
        assert_eq!(selected.num_columns(), 1);
        assert!(t.select(&["PA"]).is_err());
    }

    #[test]
    fn test_schema_only_is_empty_with_same_columns() {
        let t = teams().schema_only();
        assert!(t.is_empty());
        assert_eq!(t.schema(), teams().schema());
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(teams(), teams());
        assert_ne!(teams(), teams().sort_by(&["Team"]).unwrap().filter(|_| false));
    }
}
