//! Persists served feature tables as Parquet for offline drift analysis.

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::{
    array::{ArrayRef, Float64Array, Int64Array, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use parquet::arrow::ArrowWriter;
use sha2::{Digest, Sha256};

use crate::{
    error::ServiceError,
    features::{FeatureTable, FeatureValue},
};

pub const CAPTURE_EXTENSION: &str = "parquet";

#[derive(Debug, Clone)]
pub struct CaptureStore {
    dir: PathBuf,
}

impl CaptureStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, table: &FeatureTable, request_id: &str) -> Result<PathBuf, ServiceError> {
        save(table, &self.dir, request_id)
    }
}

/// Writes `table` to `{capture_dir}/{name}.parquet`, where `name` is the
/// request id when one was supplied and the content hash otherwise.
pub fn save(table: &FeatureTable, capture_dir: &Path, request_id: &str) -> Result<PathBuf, ServiceError> {
    let stem = artifact_stem(table, request_id)?;
    fs::create_dir_all(capture_dir)?;
    let path = capture_dir.join(format!("{stem}.{CAPTURE_EXTENSION}"));

    let batch = to_record_batch(table)?;
    let file = File::create(&path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(path)
}

fn artifact_stem(table: &FeatureTable, request_id: &str) -> Result<String, ServiceError> {
    if request_id.trim().is_empty() {
        return Ok(content_hash(table));
    }
    if request_id == "." || request_id == ".." || request_id.contains(['/', '\\']) {
        return Err(ServiceError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("request id '{request_id}' cannot name a capture file"),
        )));
    }
    Ok(request_id.to_string())
}

/// SHA-256 over column names and typed cells, in order.
pub fn content_hash(table: &FeatureTable) -> String {
    let mut hasher = Sha256::new();
    for column in &table.columns {
        hasher.update(b"c");
        hasher.update((column.len() as u64).to_le_bytes());
        hasher.update(column.as_bytes());
    }
    for row in &table.rows {
        hasher.update(b"r");
        for value in row {
            match value {
                FeatureValue::Int(v) => {
                    hasher.update(b"i");
                    hasher.update(v.to_le_bytes());
                }
                FeatureValue::Float(v) => {
                    hasher.update(b"f");
                    hasher.update(v.to_bits().to_le_bytes());
                }
                FeatureValue::Text(s) => {
                    hasher.update(b"s");
                    hasher.update((s.len() as u64).to_le_bytes());
                    hasher.update(s.as_bytes());
                }
                FeatureValue::Null => hasher.update(b"n"),
            }
        }
    }
    format!("{:x}", hasher.finalize())
}

fn column_type(table: &FeatureTable, idx: usize) -> DataType {
    let mut data_type = DataType::Int64;
    for value in table.column_values(idx) {
        match value {
            FeatureValue::Int(_) | FeatureValue::Null => {}
            FeatureValue::Float(_) => data_type = DataType::Float64,
            FeatureValue::Text(_) => return DataType::Utf8,
        }
    }
    data_type
}

fn to_record_batch(table: &FeatureTable) -> Result<RecordBatch, ServiceError> {
    let mut fields = Vec::with_capacity(table.columns.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.columns.len());

    for (idx, name) in table.columns.iter().enumerate() {
        let data_type = column_type(table, idx);
        let values = table.column_values(idx);
        let array: ArrayRef = match data_type {
            DataType::Int64 => Arc::new(
                values
                    .map(|v| match v {
                        FeatureValue::Int(i) => Some(*i),
                        _ => None,
                    })
                    .collect::<Int64Array>(),
            ),
            DataType::Float64 => Arc::new(values.map(FeatureValue::as_f64).collect::<Float64Array>()),
            _ => Arc::new(
                values
                    .map(|v| match v {
                        FeatureValue::Int(i) => Some(i.to_string()),
                        FeatureValue::Float(f) => Some(f.to_string()),
                        FeatureValue::Text(s) => Some(s.clone()),
                        FeatureValue::Null => None,
                    })
                    .collect::<StringArray>(),
            ),
        };
        fields.push(Field::new(name.as_str(), data_type, true));
        arrays.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    if arrays.is_empty() {
        return Err(ServiceError::Schema("cannot capture a table without columns".into()));
    }
    Ok(RecordBatch::try_new(schema, arrays)?)
}
