use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ServiceError;

/// Code assigned to category values that were not seen at training time.
pub const UNKNOWN_CODE: i64 = -1;

/// Column name -> raw category value -> integer code, fitted at training time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryIndex {
    columns: HashMap<String, HashMap<String, i64>>,
}

impl CategoryIndex {
    pub fn new(columns: HashMap<String, HashMap<String, i64>>) -> Self {
        Self { columns }
    }

    pub fn contains_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn column(&self, column: &str) -> Option<&HashMap<String, i64>> {
        self.columns.get(column)
    }
}

/// Read-only view over a [`CategoryIndex`].
#[derive(Debug, Clone, Copy)]
pub struct CategoryEncoder<'a> {
    index: &'a CategoryIndex,
}

impl<'a> CategoryEncoder<'a> {
    pub fn new(index: &'a CategoryIndex) -> Self {
        Self { index }
    }

    pub fn encode(&self, column: &str, raw: &Value) -> Result<i64, ServiceError> {
        let codes = self.index.column(column).ok_or_else(|| {
            ServiceError::Config(format!("category index has no entry for column '{column}'"))
        })?;
        Ok(category_key(raw)
            .and_then(|key| codes.get(&*key).copied())
            .unwrap_or(UNKNOWN_CODE))
    }
}

/// Strings are keyed verbatim, scalars by their JSON text. Null and nested
/// values never match a category.
fn category_key(raw: &Value) -> Option<std::borrow::Cow<'_, str>> {
    match raw {
        Value::String(s) => Some(s.as_str().into()),
        Value::Number(n) => Some(n.to_string().into()),
        Value::Bool(b) => Some(b.to_string().into()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
