//! Request normalization: turns heterogeneous client input into a table
//! whose columns match the pipeline's schema exactly.
//!
//! Nothing here knows about HTTP. The JSON handlers feed raw body bytes to
//! [`records_from_payload`], the form handler goes through
//! [`record_from_form`], and both end in [`normalize`].

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// One customer: column name to raw scalar value.
pub type Record = Map<String, Value>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Invalid JSON body.")]
    InvalidJson,
    #[error("JSON must contain a 'data' key with an object or a list of objects.")]
    MissingData,
    #[error("'data' must be a list of JSON objects.")]
    NotObjects,
    #[error("'data' must be an object or a list of objects.")]
    WrongShape,
}

/// Fixed-schema rows ready for `predict_proba`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub columns: &'static [&'static str],
    pub rows: Vec<Vec<Value>>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| *c == name)
    }
}

/// Extracts the batch carried under `data` in a JSON request body.
///
/// A single object is a batch of one; a list must contain only objects.
pub fn records_from_payload(body: &[u8]) -> Result<Vec<Record>, NormalizeError> {
    let payload: Value = serde_json::from_slice(body).map_err(|_| NormalizeError::InvalidJson)?;

    let mut payload = match payload {
        Value::Null => return Err(NormalizeError::InvalidJson),
        Value::Object(map) => map,
        _ => return Err(NormalizeError::MissingData),
    };

    match payload.remove("data") {
        None => Err(NormalizeError::MissingData),
        Some(Value::Object(record)) => Ok(vec![record]),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(record) => Ok(record),
                _ => Err(NormalizeError::NotObjects),
            })
            .collect(),
        Some(_) => Err(NormalizeError::WrongShape),
    }
}

/// Reconciles records against `schema`: absent columns become `null`,
/// unknown fields are dropped and cells follow schema order.
pub fn normalize(records: Vec<Record>, schema: &'static [&'static str]) -> FeatureTable {
    let rows = records
        .into_iter()
        .map(|mut record| {
            schema
                .iter()
                .map(|column| record.remove(*column).unwrap_or(Value::Null))
                .collect()
        })
        .collect();

    FeatureTable {
        columns: schema,
        rows,
    }
}

/// Builds a record from URL-encoded form fields.
///
/// Fields listed in `numeric` are parsed as numbers and fall back to 0 when
/// parsing fails. Everything else stays a string. Numeric columns the form
/// did not send are left out so that [`normalize`] marks them missing.
/// When a field repeats, its first value is kept.
pub fn record_from_form(fields: Vec<(String, String)>, numeric: &[&str]) -> Record {
    let mut record = Record::new();
    for (key, raw) in fields {
        if record.contains_key(&key) {
            continue;
        }
        let value = if numeric.contains(&key.as_str()) {
            Value::Number(coerce_number(&raw))
        } else {
            Value::String(raw)
        };
        record.insert(key, value);
    }
    record
}

fn coerce_number(raw: &str) -> Number {
    let trimmed = raw.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return Number::from(int);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .unwrap_or_else(|| Number::from(0))
}
