//! Uniform in-memory table plus the extension-dispatched batch file reader.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use arrow_array::{Array, ArrayRef, BooleanArray, Date32Array, StringArray};
use chrono::NaiveDate;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;
use thiserror::Error;

pub const CRATE_NAME: &str = "aidex-table";

/// One cell of a batch table. `Null` doubles as the explicit "unknown"
/// marker for values that could not be parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Str(String),
    Bool(bool),
    Date(NaiveDate),
    List(Vec<String>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }
}

/// Rows of named columns. Every pipeline stage fully owns the table it
/// receives and hands a transformed table to the next stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    /// Append a column filled with the given value for every existing row.
    pub fn add_column(&mut self, name: &str, fill: Value) {
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(fill.clone());
        }
    }

    /// Drop the named columns where present; unknown names are ignored.
    pub fn drop_columns(&mut self, names: &[&str]) {
        let mut indices: Vec<usize> = names
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect();
        indices.sort_unstable();
        for &idx in indices.iter().rev() {
            self.columns.remove(idx);
            for row in &mut self.rows {
                row.remove(idx);
            }
        }
    }

    pub fn rename_column(&mut self, from: &str, to: &str) {
        if let Some(idx) = self.column_index(from) {
            self.columns[idx] = to.to_string();
        }
    }

    pub fn map_column(&mut self, index: usize, mut f: impl FnMut(Value) -> Value) {
        for row in &mut self.rows {
            let cell = std::mem::replace(&mut row[index], Value::Null);
            row[index] = f(cell);
        }
    }

    pub fn retain_rows(&mut self, mut keep: impl FnMut(&[Value]) -> bool) {
        self.rows.retain(|row| keep(row));
    }

    /// Collapse rows sharing the same string key in `column`, keeping the
    /// last occurrence. Rows whose key cell is not a string are kept as-is.
    pub fn dedup_by_column_keep_last(&mut self, column: &str) {
        let Some(idx) = self.column_index(column) else {
            return;
        };
        let mut last_for_key: HashMap<String, usize> = HashMap::new();
        for (position, row) in self.rows.iter().enumerate() {
            if let Some(key) = row[idx].as_str() {
                last_for_key.insert(key.to_string(), position);
            }
        }
        let mut position = 0usize;
        self.rows.retain(|row| {
            let keep = match row[idx].as_str() {
                Some(key) => last_for_key.get(key) == Some(&position),
                None => true,
            };
            position += 1;
            keep
        });
    }
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("unsupported batch file format `{extension}`; use csv, json or parquet")]
    UnsupportedFormat { extension: String },
    #[error("reading {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing csv {path}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("parsing json {path}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("json batch {path} must be a top-level array of objects")]
    JsonShape { path: String },
    #[error("parsing parquet {path}")]
    Parquet {
        path: String,
        #[source]
        source: parquet::errors::ParquetError,
    },
    #[error("unsupported parquet column type for `{column}`: {data_type}")]
    ParquetColumnType { column: String, data_type: String },
}

/// Load a batch file into a [`Table`], dispatching on the file extension.
/// Pure read: no semantic validation, no mutation of the file.
pub fn read_table(path: impl AsRef<Path>) -> Result<Table, ReadError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match extension.as_str() {
        "csv" => read_csv(path),
        "json" => read_json(path),
        "parquet" => read_parquet(path),
        other => Err(ReadError::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}

fn read_csv(path: &Path) -> Result<Table, ReadError> {
    let display = path.display().to_string();
    let mut reader = csv::Reader::from_path(path).map_err(|source| ReadError::Csv {
        path: display.clone(),
        source,
    })?;
    let headers = reader
        .headers()
        .map_err(|source| ReadError::Csv {
            path: display.clone(),
            source,
        })?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let mut table = Table::new(headers);
    for record in reader.records() {
        let record = record.map_err(|source| ReadError::Csv {
            path: display.clone(),
            source,
        })?;
        let row = record
            .iter()
            .map(|cell| {
                if cell.is_empty() {
                    Value::Null
                } else {
                    Value::Str(cell.to_string())
                }
            })
            .collect();
        table.push_row(row);
    }
    Ok(table)
}

fn read_json(path: &Path) -> Result<Table, ReadError> {
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| ReadError::Io {
        path: display.clone(),
        source,
    })?;
    let parsed: JsonValue = serde_json::from_str(&text).map_err(|source| ReadError::Json {
        path: display.clone(),
        source,
    })?;
    let JsonValue::Array(items) = parsed else {
        return Err(ReadError::JsonShape { path: display });
    };

    let mut objects = Vec::with_capacity(items.len());
    for item in items {
        match item {
            JsonValue::Object(map) => objects.push(map),
            _ => return Err(ReadError::JsonShape { path: display }),
        }
    }

    // Column set is the union over all objects.
    let mut columns: Vec<String> = Vec::new();
    for map in &objects {
        for key in map.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }

    let mut table = Table::new(columns.clone());
    for map in &objects {
        let row = columns
            .iter()
            .map(|column| map.get(column).map(json_cell).unwrap_or(Value::Null))
            .collect();
        table.push_row(row);
    }
    Ok(table)
}

fn json_cell(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => Value::Str(n.to_string()),
        JsonValue::String(s) if s.is_empty() => Value::Null,
        JsonValue::String(s) => Value::Str(s.clone()),
        JsonValue::Array(items) => Value::List(
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
        ),
        JsonValue::Object(_) => Value::Null,
    }
}

fn read_parquet(path: &Path) -> Result<Table, ReadError> {
    let display = path.display().to_string();
    let file = File::open(path).map_err(|source| ReadError::Io {
        path: display.clone(),
        source,
    })?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).map_err(|source| ReadError::Parquet {
            path: display.clone(),
            source,
        })?;
    let reader = builder.build().map_err(|source| ReadError::Parquet {
        path: display.clone(),
        source,
    })?;

    let mut table: Option<Table> = None;
    for batch in reader {
        let batch = batch.map_err(|source| ReadError::Parquet {
            path: display.clone(),
            source: source.into(),
        })?;
        if table.is_none() {
            let columns = batch
                .schema()
                .fields()
                .iter()
                .map(|field| field.name().clone())
                .collect();
            table = Some(Table::new(columns));
        }
        let target = table.as_mut().expect("table initialized above");
        let schema = batch.schema();
        for row_idx in 0..batch.num_rows() {
            let mut row = Vec::with_capacity(batch.num_columns());
            for (col_idx, field) in schema.fields().iter().enumerate() {
                row.push(arrow_cell(field.name(), batch.column(col_idx), row_idx)?);
            }
            target.push_row(row);
        }
    }
    Ok(table.unwrap_or_default())
}

fn arrow_cell(column: &str, array: &ArrayRef, index: usize) -> Result<Value, ReadError> {
    if array.is_null(index) {
        return Ok(Value::Null);
    }
    if let Some(strings) = array.as_any().downcast_ref::<StringArray>() {
        let text = strings.value(index);
        return Ok(if text.is_empty() {
            Value::Null
        } else {
            Value::Str(text.to_string())
        });
    }
    if let Some(bools) = array.as_any().downcast_ref::<BooleanArray>() {
        return Ok(Value::Bool(bools.value(index)));
    }
    if let Some(dates) = array.as_any().downcast_ref::<Date32Array>() {
        return Ok(dates
            .value_as_date(index)
            .map(Value::Date)
            .unwrap_or(Value::Null));
    }
    Err(ReadError::ParquetColumnType {
        column: column.to_string(),
        data_type: array.data_type().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::RecordBatch;
    use arrow_schema::{DataType, Field, Schema};
    use parquet::arrow::ArrowWriter;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn unsupported_extension_is_rejected() {
        let err = read_table("batch.xlsx").unwrap_err();
        assert!(matches!(
            err,
            ReadError::UnsupportedFormat { extension } if extension == "xlsx"
        ));
    }

    #[test]
    fn csv_reader_preserves_rows_and_columns() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("tools.csv");
        std::fs::write(
            &path,
            "name,url,tags\nWriterly,https://writerly.ai,writing\nPixelGen,,design\n",
        )
        .expect("write csv");

        let table = read_table(&path).expect("read csv");
        assert_eq!(table.columns(), &["name", "url", "tags"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(
            table.cell(0, "url"),
            Some(&Value::Str("https://writerly.ai".into()))
        );
        // Empty cells surface as explicit nulls, not empty strings.
        assert_eq!(table.cell(1, "url"), Some(&Value::Null));
    }

    #[test]
    fn json_reader_takes_column_union_and_typed_cells() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("tools.json");
        std::fs::write(
            &path,
            r##"[
                {"name": "Writerly", "tags": ["#promo", "writing"], "trending": true},
                {"name": "PixelGen", "url": "https://pixelgen.app", "rank": 3}
            ]"##,
        )
        .expect("write json");

        let table = read_table(&path).expect("read json");
        assert_eq!(table.row_count(), 2);
        for column in ["name", "tags", "trending", "url", "rank"] {
            assert!(table.has_column(column), "missing column {column}");
        }
        assert_eq!(
            table.cell(0, "tags"),
            Some(&Value::List(vec!["#promo".into(), "writing".into()]))
        );
        assert_eq!(table.cell(0, "trending"), Some(&Value::Bool(true)));
        assert_eq!(table.cell(0, "url"), Some(&Value::Null));
        assert_eq!(table.cell(1, "rank"), Some(&Value::Str("3".into())));
    }

    #[test]
    fn json_reader_rejects_non_array_payloads() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("tools.json");
        std::fs::write(&path, r#"{"name": "Writerly"}"#).expect("write json");
        assert!(matches!(
            read_table(&path).unwrap_err(),
            ReadError::JsonShape { .. }
        ));
    }

    #[test]
    fn parquet_reader_round_trips_strings_and_bools() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("tools.parquet");

        let schema = Arc::new(Schema::new(vec![
            Field::new("name", DataType::Utf8, false),
            Field::new("url", DataType::Utf8, true),
            Field::new("trending", DataType::Boolean, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec![Some("Writerly"), Some("PixelGen")])),
                Arc::new(StringArray::from(vec![Some("https://writerly.ai"), None])),
                Arc::new(BooleanArray::from(vec![Some(true), None])),
            ],
        )
        .expect("record batch");
        let file = File::create(&path).expect("create parquet");
        let mut writer = ArrowWriter::try_new(file, schema, None).expect("writer");
        writer.write(&batch).expect("write batch");
        writer.close().expect("close writer");

        let table = read_table(&path).expect("read parquet");
        assert_eq!(table.columns(), &["name", "url", "trending"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell(0, "trending"), Some(&Value::Bool(true)));
        assert_eq!(table.cell(1, "url"), Some(&Value::Null));
        assert_eq!(table.cell(1, "trending"), Some(&Value::Null));
    }

    #[test]
    fn dedup_keeps_the_last_row_per_key() {
        let mut table = Table::new(vec!["name".into(), "category".into()]);
        table.push_row(vec![Value::Str("X".into()), Value::Str("old".into())]);
        table.push_row(vec![Value::Str("Y".into()), Value::Str("kept".into())]);
        table.push_row(vec![Value::Str("X".into()), Value::Str("new".into())]);
        table.dedup_by_column_keep_last("name");

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell(0, "name"), Some(&Value::Str("Y".into())));
        assert_eq!(table.cell(1, "category"), Some(&Value::Str("new".into())));
    }

    #[test]
    fn drop_columns_ignores_missing_names() {
        let mut table = Table::new(vec!["name".into(), "pricing".into()]);
        table.push_row(vec![Value::Str("X".into()), Value::Str("free".into())]);
        table.drop_columns(&["pricing", "page"]);
        assert_eq!(table.columns(), &["name"]);
        assert_eq!(table.rows()[0].len(), 1);
    }
}
