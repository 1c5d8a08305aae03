//! Table <-> Arrow IPC file encoding used by checkpoints.

use arrow::array::{
    Array, ArrayRef, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::error::ArrowError;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow_ipc::reader::FileReader;
use arrow_ipc::writer::FileWriter;
use chrono::DateTime;
use statlayer_core::{Column, ColumnType, Table, TableError, Value};
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;

const UTC: &str = "UTC";

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Unsupported Arrow type for column {column}: {data_type}")]
    UnsupportedType { column: String, data_type: String },

    #[error("Table error: {0}")]
    Table(#[from] TableError),
}

fn data_type(ty: ColumnType) -> DataType {
    match ty {
        ColumnType::Int => DataType::Int64,
        ColumnType::Float => DataType::Float64,
        ColumnType::Str => DataType::Utf8,
        ColumnType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, Some(UTC.into())),
    }
}

fn to_array(column: &Column) -> ArrayRef {
    let values = column.values();
    match column.ty() {
        ColumnType::Int => Arc::new(values.iter().map(Value::as_i64).collect::<Int64Array>()),
        ColumnType::Float => Arc::new(values.iter().map(Value::as_f64).collect::<Float64Array>()),
        ColumnType::Str => Arc::new(values.iter().map(Value::as_str).collect::<StringArray>()),
        ColumnType::Timestamp => Arc::new(
            values
                .iter()
                .map(|v| v.as_timestamp().map(|ts| ts.timestamp_micros()))
                .collect::<TimestampMicrosecondArray>()
                .with_timezone(UTC),
        ),
    }
}

pub fn to_record_batch(table: &Table) -> Result<RecordBatch, CodecError> {
    let fields: Vec<Field> = table
        .columns()
        .iter()
        .map(|c| Field::new(c.name(), data_type(c.ty()), true))
        .collect();
    let arrays: Vec<ArrayRef> = table.columns().iter().map(to_array).collect();

    // Zero-column tables still carry their row count
    let options = RecordBatchOptions::new().with_row_count(Some(table.num_rows()));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        arrays,
        &options,
    )?)
}

macro_rules! collect_values {
    ($array:expr, $ty:ty, $name:expr, $convert:expr) => {{
        let typed = $array
            .as_any()
            .downcast_ref::<$ty>()
            .ok_or_else(|| CodecError::UnsupportedType {
                column: $name.to_string(),
                data_type: format!("{:?}", $array.data_type()),
            })?;
        (0..typed.len())
            .map(|i| {
                if typed.is_null(i) {
                    Value::Null
                } else {
                    ($convert)(typed.value(i))
                }
            })
            .collect::<Vec<Value>>()
    }};
}

fn from_array(field: &Field, array: &ArrayRef) -> Result<Column, CodecError> {
    let name = field.name();
    let (ty, values) = match field.data_type() {
        DataType::Int64 => (
            ColumnType::Int,
            collect_values!(array, Int64Array, name, Value::Int),
        ),
        DataType::Float64 => (
            ColumnType::Float,
            collect_values!(array, Float64Array, name, Value::float),
        ),
        DataType::Utf8 => (
            ColumnType::Str,
            collect_values!(array, StringArray, name, Value::str),
        ),
        DataType::Timestamp(TimeUnit::Microsecond, _) => (
            ColumnType::Timestamp,
            collect_values!(array, TimestampMicrosecondArray, name, |micros: i64| {
                DateTime::from_timestamp_micros(micros)
                    .map(Value::Timestamp)
                    .unwrap_or(Value::Null)
            }),
        ),
        other => {
            return Err(CodecError::UnsupportedType {
                column: name.to_string(),
                data_type: format!("{:?}", other),
            })
        }
    };
    Ok(Column::new(name.as_str(), ty, values)?)
}

pub fn from_record_batch(batch: &RecordBatch) -> Result<Table, CodecError> {
    let schema = batch.schema();
    let columns = schema
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(field, array)| from_array(field, array))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Table::with_row_count(columns, batch.num_rows())?)
}

/// Encode as a complete Arrow IPC file (single record batch).
pub fn encode(table: &Table) -> Result<Vec<u8>, CodecError> {
    let batch = to_record_batch(table)?;
    let mut buf = Vec::new();
    {
        let mut writer = FileWriter::try_new(&mut buf, &batch.schema())?;
        writer.write(&batch)?;
        writer.finish()?;
    }
    Ok(buf)
}

pub fn decode(bytes: &[u8]) -> Result<Table, CodecError> {
    let reader = FileReader::try_new(Cursor::new(bytes), None)?;
    let schema = reader.schema();

    let mut tables = Vec::new();
    for batch in reader {
        tables.push(from_record_batch(&batch?)?);
    }

    match tables.len() {
        // Writer always emits one batch; an empty file still has a schema
        0 => {
            let empty = RecordBatch::new_empty(schema);
            from_record_batch(&empty)
        }
        1 => Ok(tables.remove(0)),
        _ => Ok(Table::concat(&tables)?),
    }
}
