//! Group-by summaries over event-level tables.

use crate::error::{Result, TableError};
use crate::table::{Column, Table};
use crate::value::{ColumnType, KeyPart, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Per-group reduction. All of them skip nulls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    Sum,
    Mean,
    Count,
    Max,
}

impl Reduction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reduction::Sum => "sum",
            Reduction::Mean => "mean",
            Reduction::Count => "count",
            Reduction::Max => "max",
        }
    }

    fn output_type(&self, column: &str, input: ColumnType) -> Result<ColumnType> {
        match (self, input) {
            (Reduction::Count, _) => Ok(ColumnType::Int),
            (Reduction::Max, ty) => Ok(ty),
            (Reduction::Sum, ty) if ty.is_numeric() => Ok(ty),
            (Reduction::Mean, ty) if ty.is_numeric() => Ok(ColumnType::Float),
            (reduction, ty) => Err(TableError::UnsupportedReduction {
                reduction: reduction.as_str(),
                column: column.to_string(),
                ty,
            }),
        }
    }

    /// Reduce the non-null `values` of one group. An all-null group
    /// reduces to `Null`.
    fn apply(&self, values: &[&Value], out: ColumnType) -> Value {
        let present: Vec<&Value> = values.iter().copied().filter(|v| !v.is_null()).collect();
        if present.is_empty() {
            return Value::Null;
        }
        match self {
            Reduction::Count => Value::Int(present.len() as i64),
            Reduction::Max => present
                .into_iter()
                .max_by(|a, b| a.total_cmp(b))
                .cloned()
                .unwrap_or(Value::Null),
            Reduction::Sum if out == ColumnType::Int => Value::Int(
                present
                    .iter()
                    .filter_map(|v| v.as_i64())
                    .fold(0i64, i64::saturating_add),
            ),
            Reduction::Sum => Value::float(present.iter().filter_map(|v| v.as_f64()).sum()),
            Reduction::Mean => {
                let sum: f64 = present.iter().filter_map(|v| v.as_f64()).sum();
                Value::float(sum / present.len() as f64)
            }
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One output column of [`summarize`]: `reduction(column) AS output`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub column: String,
    pub reduction: Reduction,
    pub output: String,
}

impl Metric {
    /// Output keeps the source column's name.
    pub fn new(column: impl Into<String>, reduction: Reduction) -> Self {
        let column = column.into();
        Self {
            output: column.clone(),
            column,
            reduction,
        }
    }

    pub fn sum(column: impl Into<String>) -> Self {
        Self::new(column, Reduction::Sum)
    }

    pub fn mean(column: impl Into<String>) -> Self {
        Self::new(column, Reduction::Mean)
    }

    pub fn count(column: impl Into<String>) -> Self {
        Self::new(column, Reduction::Count)
    }

    pub fn max(column: impl Into<String>) -> Self {
        Self::new(column, Reduction::Max)
    }

    pub fn named(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }
}

/// Group `raw` by `group_keys` and reduce each metric per group.
///
/// Output has one row per distinct key combination present in the input,
/// in order of first appearance. Rows with a null in any key column belong
/// to no group. Output columns are the keys followed by the metric outputs.
pub fn summarize(raw: &Table, group_keys: &[&str], metrics: &[Metric]) -> Result<Table> {
    let key_columns = group_keys
        .iter()
        .map(|k| raw.require_column(k))
        .collect::<Result<Vec<_>>>()?;
    let metric_columns = metrics
        .iter()
        .map(|m| {
            let source = raw.require_column(&m.column)?;
            let out = m.reduction.output_type(&m.column, source.ty())?;
            Ok((source, out))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut index: HashMap<Vec<KeyPart>, usize> = HashMap::new();
    for row in raw.rows() {
        let key = row.key(group_keys);
        if key.iter().any(KeyPart::is_null) {
            continue;
        }
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(row.index());
    }

    let mut columns = Vec::with_capacity(group_keys.len() + metrics.len());
    for key in &key_columns {
        let values = groups.iter().map(|rows| key.values()[rows[0]].clone()).collect();
        columns.push(Column::new(key.name(), key.ty(), values)?);
    }
    for (metric, (source, out)) in metrics.iter().zip(metric_columns) {
        let values = groups
            .iter()
            .map(|rows| {
                let group: Vec<&Value> = rows.iter().map(|&i| &source.values()[i]).collect();
                metric.reduction.apply(&group, out)
            })
            .collect();
        columns.push(Column::new(metric.output.clone(), out, values)?);
    }
    Table::with_row_count(columns, groups.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pitches() -> Table {
        Table::from_rows(
            &[
                ("pitcher", ColumnType::Int),
                ("velo", ColumnType::Float),
                ("k", ColumnType::Int),
            ],
            vec![
                vec![1.into(), 95.0.into(), 1.into()],
                vec![2.into(), Value::Null, 0.into()],
                vec![1.into(), 97.0.into(), 0.into()],
                vec![Value::Null, 90.0.into(), 1.into()],
                vec![2.into(), Value::Null, Value::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_summarize_groups_in_first_appearance_order() {
        let out = summarize(
            &pitches(),
            &["pitcher"],
            &[
                Metric::mean("velo"),
                Metric::sum("k").named("K_cnt"),
                Metric::count("k").named("Pitches"),
            ],
        )
        .unwrap();

        let expected = Table::from_rows(
            &[
                ("pitcher", ColumnType::Int),
                ("velo", ColumnType::Float),
                ("K_cnt", ColumnType::Int),
                ("Pitches", ColumnType::Int),
            ],
            vec![
                vec![1.into(), 96.0.into(), 1.into(), 2.into()],
                vec![2.into(), Value::Null, 0.into(), 1.into()],
            ],
        )
        .unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_all_null_group_is_null_not_zero() {
        let out = summarize(&pitches(), &["pitcher"], &[Metric::sum("velo")]).unwrap();
        assert_eq!(out.value(1, "velo"), Some(&Value::Null));
    }

    #[test]
    fn test_multiple_metrics_per_column() {
        let out = summarize(
            &pitches(),
            &["pitcher"],
            &[
                Metric::mean("velo").named("Avg Velo"),
                Metric::max("velo").named("Max Velo"),
            ],
        )
        .unwrap();
        assert_eq!(out.value(0, "Max Velo"), Some(&Value::Float(97.0)));
        assert_eq!(out.value(0, "Avg Velo"), Some(&Value::Float(96.0)));
    }

    #[test]
    fn test_sum_of_strings_rejected() {
        let t = Table::from_rows(
            &[("g", ColumnType::Int), ("name", ColumnType::Str)],
            vec![vec![1.into(), "a".into()]],
        )
        .unwrap();
        let err = summarize(&t, &["g"], &[Metric::sum("name")]).unwrap_err();
        assert!(matches!(
            err,
            TableError::UnsupportedReduction { reduction: "sum", .. }
        ));
    }

    #[test]
    fn test_empty_input_yields_empty_summary() {
        let out = summarize(&pitches().schema_only(), &["pitcher"], &[Metric::mean("velo")]).unwrap();
        assert!(out.is_empty());
        assert_eq!(out.column_names(), vec!["pitcher", "velo"]);
    }

    #[test]
    fn test_missing_metric_column() {
        let err = summarize(&pitches(), &["pitcher"], &[Metric::mean("spin")]).unwrap_err();
        assert_eq!(err, TableError::ColumnNotFound("spin".to_string()));
    }
}
