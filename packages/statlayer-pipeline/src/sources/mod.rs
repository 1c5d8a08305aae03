//! External data sources: the stats JSON API, the pitch-event CSV feed,
//! the odds API, and local CSV exports.

pub mod http;
pub mod odds;
pub mod savant;
pub mod stats;

pub use http::HttpClient;
pub use odds::OddsClient;
pub use savant::SavantClient;
pub use stats::StatsClient;

use crate::error::FetchError;
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use statlayer_core::{Column, ColumnType, Table, Value};
use std::io::Read;

/// Parse CSV into a table holding exactly `columns`, in that order.
///
/// Columns absent from the header are null-filled. Empty or unparseable
/// cells become null.
pub fn csv_table<R: Read>(
    reader: R,
    columns: &[(&str, ColumnType)],
    source_name: &str,
) -> Result<Table, FetchError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| FetchError::malformed(source_name, e))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();
    let positions: Vec<Option<usize>> = columns
        .iter()
        .map(|(name, _)| headers.iter().position(|h| h == name))
        .collect();

    let mut values: Vec<Vec<Value>> = vec![Vec::new(); columns.len()];
    for record in reader.records() {
        let record = record.map_err(|e| FetchError::malformed(source_name, e))?;
        for (i, ((_, ty), pos)) in columns.iter().zip(&positions).enumerate() {
            let cell = pos.and_then(|p| record.get(p)).unwrap_or("");
            values[i].push(parse_cell(cell, *ty));
        }
    }

    let columns = columns
        .iter()
        .zip(values)
        .map(|((name, ty), vals)| Column::new(*name, *ty, vals))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Table::from_columns(columns)?)
}

pub fn parse_cell(cell: &str, ty: ColumnType) -> Value {
    let cell = cell.trim();
    if cell.is_empty() {
        return Value::Null;
    }
    match ty {
        ColumnType::Int => cell
            .parse::<i64>()
            .ok()
            .or_else(|| {
                cell.parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| f as i64)
            })
            .map(Value::Int)
            .unwrap_or(Value::Null),
        ColumnType::Float => cell.parse::<f64>().map(Value::float).unwrap_or(Value::Null),
        ColumnType::Str => Value::str(cell),
        ColumnType::Timestamp => parse_timestamp(cell)
            .map(Value::Timestamp)
            .unwrap_or(Value::Null),
    }
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// JSON number or numeric string (`".250"`) as a float.
pub fn json_f64(v: Option<&Json>) -> Value {
    match v {
        Some(Json::Number(n)) => n.as_f64().map(Value::float).unwrap_or(Value::Null),
        Some(Json::String(s)) => parse_cell(s, ColumnType::Float),
        _ => Value::Null,
    }
}

pub fn json_i64(v: Option<&Json>) -> Value {
    match v {
        Some(Json::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(Value::Int)
            .unwrap_or(Value::Null),
        Some(Json::String(s)) => parse_cell(s, ColumnType::Int),
        _ => Value::Null,
    }
}

pub fn json_str(v: Option<&Json>) -> Value {
    match v {
        Some(Json::String(s)) => Value::str(s.as_str()),
        Some(Json::Number(n)) => Value::str(n.to_string()),
        _ => Value::Null,
    }
}
