use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

use crate::{
    error::ServiceError,
    features::encoder::{CategoryEncoder, CategoryIndex},
};

/// A single model-ready cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl FeatureValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Int(v) => Some(*v as f64),
            FeatureValue::Float(v) => Some(*v),
            FeatureValue::Text(_) | FeatureValue::Null => None,
        }
    }
}

/// Row-major feature table. Column order and row order follow the request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<FeatureValue>>,
}

impl FeatureTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &FeatureValue> + '_ {
        self.rows.iter().filter_map(move |row| row.get(idx))
    }
}

/// Turns raw request rows into a [`FeatureTable`], encoding categorical
/// columns with the training-time index.
#[derive(Debug, Clone)]
pub struct FeaturePipeline {
    categorical_columns: Vec<String>,
    index: CategoryIndex,
}

impl FeaturePipeline {
    pub fn new(categorical_columns: Vec<String>, index: CategoryIndex) -> Result<Self, ServiceError> {
        if let Some(missing) = categorical_columns
            .iter()
            .find(|col| !index.contains_column(col))
        {
            return Err(ServiceError::Config(format!(
                "categorical column '{missing}' has no category index entry"
            )));
        }
        Ok(Self {
            categorical_columns,
            index,
        })
    }

    pub fn categorical_columns(&self) -> &[String] {
        &self.categorical_columns
    }

    pub fn transform(
        &self,
        columns: &[String],
        rows: &[Vec<Value>],
    ) -> Result<FeatureTable, ServiceError> {
        if let Some(missing) = self
            .categorical_columns
            .iter()
            .find(|col| !columns.contains(*col))
        {
            return Err(ServiceError::Schema(format!(
                "missing categorical column '{missing}'"
            )));
        }

        let categorical: HashSet<&str> = self.categorical_columns.iter().map(String::as_str).collect();
        let encoder = CategoryEncoder::new(&self.index);

        let mut out = Vec::with_capacity(rows.len());
        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(ServiceError::Schema(format!(
                    "row {row_idx} has {} values, expected {}",
                    row.len(),
                    columns.len()
                )));
            }
            let mut encoded = Vec::with_capacity(row.len());
            for (column, raw) in columns.iter().zip(row) {
                let value = if categorical.contains(column.as_str()) {
                    FeatureValue::Int(encoder.encode(column, raw)?)
                } else {
                    coerce(column, row_idx, raw)?
                };
                encoded.push(value);
            }
            out.push(encoded);
        }

        Ok(FeatureTable {
            columns: columns.to_vec(),
            rows: out,
        })
    }
}

fn coerce(column: &str, row_idx: usize, raw: &Value) -> Result<FeatureValue, ServiceError> {
    let value = match raw {
        Value::Null => FeatureValue::Null,
        Value::Bool(b) => FeatureValue::Int(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(v) => FeatureValue::Int(v),
            None => FeatureValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(v) = trimmed.parse::<i64>() {
                FeatureValue::Int(v)
            } else if let Ok(v) = trimmed.parse::<f64>() {
                FeatureValue::Float(v)
            } else {
                FeatureValue::Text(s.clone())
            }
        }
        Value::Array(_) | Value::Object(_) => {
            return Err(ServiceError::Schema(format!(
                "row {row_idx} column '{column}' must be a scalar"
            )));
        }
    };
    Ok(value)
}
