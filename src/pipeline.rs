//! The fitted churn pipeline and the startup loaders for it.
//!
//! Handlers only see [`Pipeline`]; the concrete [`LogisticPipeline`] is the
//! JSON export of the training notebook's preprocessing + logistic
//! regression steps.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Number, Value};
use thiserror::Error;

use crate::normalize::FeatureTable;
use crate::schema::EXPECTED_COLUMNS;

pub const DEFAULT_THRESHOLD: f64 = 0.5;

static MISSING: Value = Value::Null;

/// Probabilities for one row: `[class 0, class 1]`.
pub type ClassProbabilities = [f64; 2];

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing value in column '{column}' (row {row})")]
    MissingValue { column: &'static str, row: usize },
    #[error("column '{column}' expects a number, got {value} (row {row})")]
    NotNumeric {
        column: &'static str,
        row: usize,
        value: Value,
    },
    #[error("column '{column}' expects a scalar, got {value} (row {row})")]
    NotScalar {
        column: &'static str,
        row: usize,
        value: Value,
    },
    #[error("pipeline produced probability {value} for row {row}")]
    InvalidProbability { row: usize, value: f64 },
    #[error("table has {found} columns, pipeline expects {expected}")]
    Shape { expected: usize, found: usize },
    #[error("pipeline unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid pipeline artifact: {0}")]
    InvalidArtifact(String),
    #[error("invalid threshold: {0}")]
    InvalidThreshold(String),
}

/// Anything that maps a feature table to per-row class probabilities.
pub trait Pipeline: Send + Sync {
    fn predict_proba(
        &self,
        table: &FeatureTable,
    ) -> Result<Vec<ClassProbabilities>, PipelineError>;

    /// Cheap liveness check used by `/health`. Must not run inference.
    fn check(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    fn describe(&self) -> String {
        "pipeline".to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NumericStep {
    pub column: String,
    pub mean: f64,
    pub scale: f64,
    #[serde(default)]
    pub impute: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoricalStep {
    pub column: String,
    pub categories: Vec<String>,
    #[serde(default)]
    pub impute: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSpec {
    #[serde(default)]
    pub numeric: Vec<NumericStep>,
    #[serde(default)]
    pub categorical: Vec<CategoricalStep>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

/// Scaler + one-hot encoder + logistic regression, with column positions
/// resolved against the schema at load time.
#[derive(Debug, Clone)]
pub struct LogisticPipeline {
    numeric: Vec<(usize, &'static str, NumericStep)>,
    categorical: Vec<(usize, &'static str, CategoricalStep)>,
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LogisticPipeline {
    pub fn from_spec(spec: PipelineSpec) -> Result<Self, ArtifactError> {
        let resolve = |column: &str| {
            EXPECTED_COLUMNS
                .iter()
                .position(|c| *c == column)
                .map(|idx| (idx, EXPECTED_COLUMNS[idx]))
                .ok_or_else(|| {
                    ArtifactError::InvalidArtifact(format!("unknown column '{column}'"))
                })
        };

        let mut numeric = Vec::with_capacity(spec.numeric.len());
        for step in spec.numeric {
            if step.scale == 0.0 || !step.scale.is_finite() || !step.mean.is_finite() {
                return Err(ArtifactError::InvalidArtifact(format!(
                    "column '{}' has a degenerate scaler",
                    step.column
                )));
            }
            let (idx, name) = resolve(&step.column)?;
            numeric.push((idx, name, step));
        }

        let mut categorical = Vec::with_capacity(spec.categorical.len());
        for step in spec.categorical {
            let (idx, name) = resolve(&step.column)?;
            categorical.push((idx, name, step));
        }

        let width = numeric.len()
            + categorical
                .iter()
                .map(|(_, _, step)| step.categories.len())
                .sum::<usize>();
        if spec.coefficients.len() != width {
            return Err(ArtifactError::InvalidArtifact(format!(
                "{} coefficients for a design width of {width}",
                spec.coefficients.len()
            )));
        }

        Ok(Self {
            numeric,
            categorical,
            coefficients: spec.coefficients,
            intercept: spec.intercept,
        })
    }

    fn decision(&self, row_idx: usize, row: &[Value]) -> Result<f64, PipelineError> {
        let mut z = self.intercept;
        let mut weights = self.coefficients.iter();

        for (idx, column, step) in &self.numeric {
            let column = *column;
            let value = match row.get(*idx).unwrap_or(&MISSING) {
                Value::Null => step.impute.ok_or(PipelineError::MissingValue {
                    column,
                    row: row_idx,
                })?,
                cell => numeric_cell(cell).ok_or_else(|| PipelineError::NotNumeric {
                    column,
                    row: row_idx,
                    value: cell.clone(),
                })?,
            };
            let weight = weights.next().copied().unwrap_or_default();
            z += weight * (value - step.mean) / step.scale;
        }

        for (idx, column, step) in &self.categorical {
            let column = *column;
            let label = match row.get(*idx).unwrap_or(&MISSING) {
                Value::Null => step.impute.clone().ok_or(PipelineError::MissingValue {
                    column,
                    row: row_idx,
                })?,
                Value::String(s) => s.clone(),
                Value::Number(n) => category_label(n),
                Value::Bool(b) => b.to_string(),
                cell => {
                    return Err(PipelineError::NotScalar {
                        column,
                        row: row_idx,
                        value: cell.clone(),
                    })
                }
            };
            // unknown categories encode as all zeros
            for (category, weight) in step.categories.iter().zip(weights.by_ref()) {
                if *category == label {
                    z += weight;
                }
            }
        }

        Ok(z)
    }
}

/// NaN and infinities count as non-numeric.
fn numeric_cell(cell: &Value) -> Option<f64> {
    let value = match cell {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    value.filter(|v| v.is_finite())
}

/// `1.0` and `1` name the same category.
fn category_label(n: &Number) -> String {
    match n.as_f64() {
        Some(v) if n.is_f64() && v.fract() == 0.0 && v.abs() < 9.007_199_254_740_992e15 => {
            format!("{}", v as i64)
        }
        _ => n.to_string(),
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl Pipeline for LogisticPipeline {
    fn predict_proba(
        &self,
        table: &FeatureTable,
    ) -> Result<Vec<ClassProbabilities>, PipelineError> {
        if table.columns.len() != EXPECTED_COLUMNS.len() {
            return Err(PipelineError::Shape {
                expected: EXPECTED_COLUMNS.len(),
                found: table.columns.len(),
            });
        }

        table
            .rows
            .iter()
            .enumerate()
            .map(|(row_idx, row)| {
                let p1 = sigmoid(self.decision(row_idx, row)?);
                Ok([1.0 - p1, p1])
            })
            .collect()
    }

    fn describe(&self) -> String {
        format!(
            "logistic regression ({} numeric, {} categorical, {} weights)",
            self.numeric.len(),
            self.categorical.len(),
            self.coefficients.len()
        )
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let raw = fs::read(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| ArtifactError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_pipeline(path: &Path) -> Result<LogisticPipeline, ArtifactError> {
    LogisticPipeline::from_spec(read_json(path)?)
}

/// Reads `{"threshold": ...}`; a missing key means [`DEFAULT_THRESHOLD`].
pub fn load_threshold(path: &Path) -> Result<f64, ArtifactError> {
    let doc: Value = read_json(path)?;
    let threshold = match doc.get("threshold") {
        None => DEFAULT_THRESHOLD,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ArtifactError::InvalidThreshold(format!("'{s}' is not a number")))?,
        Some(other) => {
            return Err(ArtifactError::InvalidThreshold(format!(
                "{other} is not a number"
            )))
        }
    };

    if !(0.0..=1.0).contains(&threshold) {
        return Err(ArtifactError::InvalidThreshold(format!(
            "{threshold} is outside [0, 1]"
        )));
    }
    Ok(threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{normalize, Record};
    use serde_json::json;
    use std::io::Write;

    fn spec(value: Value) -> PipelineSpec {
        serde_json::from_value(value).unwrap()
    }

    fn tiny() -> LogisticPipeline {
        LogisticPipeline::from_spec(spec(json!({
            "numeric": [{"column": "tenure", "mean": 10.0, "scale": 5.0, "impute": 10.0}],
            "categorical": [{"column": "Contract", "categories": ["Month-to-month", "Two year"]}],
            "coefficients": [-1.0, 2.0, -2.0],
            "intercept": 0.0
        })))
        .unwrap()
    }

    fn table(records: Vec<Value>) -> FeatureTable {
        let records = records
            .into_iter()
            .map(|v| serde_json::from_value::<Record>(v).unwrap())
            .collect();
        normalize(records, &EXPECTED_COLUMNS)
    }

    #[test]
    fn probabilities_sum_to_one() {
        let out = tiny()
            .predict_proba(&table(vec![json!({"tenure": 10, "Contract": "Month-to-month"})]))
            .unwrap();
        let [p0, p1] = out[0];
        assert!((p0 + p1 - 1.0).abs() < 1e-12);
        assert!((p1 - sigmoid(2.0)).abs() < 1e-12);
    }

    #[test]
    fn unknown_category_contributes_nothing() {
        let out = tiny()
            .predict_proba(&table(vec![json!({"tenure": 10, "Contract": "One year"})]))
            .unwrap();
        assert!((out[0][1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let pipe = tiny();
        let a = pipe
            .predict_proba(&table(vec![json!({"tenure": "15", "Contract": "Two year"})]))
            .unwrap();
        let b = pipe
            .predict_proba(&table(vec![json!({"tenure": 15, "Contract": "Two year"})]))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn null_without_impute_is_an_error() {
        let err = tiny()
            .predict_proba(&table(vec![json!({"tenure": 3})]))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingValue {
                column: "Contract",
                row: 0
            }
        ));
    }

    #[test]
    fn null_with_impute_uses_fill_value() {
        let pipe = tiny();
        let imputed = pipe
            .predict_proba(&table(vec![json!({"Contract": "Two year"})]))
            .unwrap();
        let explicit = pipe
            .predict_proba(&table(vec![json!({"tenure": 10, "Contract": "Two year"})]))
            .unwrap();
        assert_eq!(imputed, explicit);
    }

    #[test]
    fn non_numeric_value_is_an_error() {
        let err = tiny()
            .predict_proba(&table(vec![json!({"tenure": "long", "Contract": "Two year"})]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotNumeric { column: "tenure", .. }));
    }

    #[test]
    fn non_finite_strings_are_not_numbers() {
        let pipe = tiny();
        for raw in ["NaN", "nan", "inf", "-inf", "infinity"] {
            let err = pipe
                .predict_proba(&table(vec![json!({"tenure": raw, "Contract": "Two year"})]))
                .unwrap_err();
            assert!(
                matches!(err, PipelineError::NotNumeric { column: "tenure", .. }),
                "{raw}"
            );
        }
    }

    #[test]
    fn integral_float_matches_integer_category() {
        let pipe = LogisticPipeline::from_spec(spec(json!({
            "categorical": [{"column": "SeniorCitizen", "categories": ["0", "1"]}],
            "coefficients": [0.0, 3.0],
            "intercept": 0.0
        })))
        .unwrap();
        let as_int = pipe
            .predict_proba(&table(vec![json!({"SeniorCitizen": 1})]))
            .unwrap();
        let as_float = pipe
            .predict_proba(&table(vec![json!({"SeniorCitizen": 1.0})]))
            .unwrap();
        assert_eq!(as_int, as_float);
        assert!((as_float[0][1] - sigmoid(3.0)).abs() < 1e-12);
    }

    #[test]
    fn rejects_wrong_coefficient_count() {
        let err = LogisticPipeline::from_spec(spec(json!({
            "numeric": [{"column": "tenure", "mean": 0.0, "scale": 1.0}],
            "coefficients": [1.0, 2.0],
            "intercept": 0.0
        })))
        .unwrap_err();
        assert!(matches!(err, ArtifactError::InvalidArtifact(_)));
    }

    #[test]
    fn rejects_columns_outside_schema() {
        let err = LogisticPipeline::from_spec(spec(json!({
            "numeric": [{"column": "shoe_size", "mean": 0.0, "scale": 1.0}],
            "coefficients": [1.0],
            "intercept": 0.0
        })))
        .unwrap_err();
        assert!(err.to_string().contains("shoe_size"));
    }

    #[test]
    fn rejects_zero_scale() {
        let err = LogisticPipeline::from_spec(spec(json!({
            "numeric": [{"column": "tenure", "mean": 0.0, "scale": 0.0}],
            "coefficients": [1.0],
            "intercept": 0.0
        })))
        .unwrap_err();
        assert!(matches!(err, ArtifactError::InvalidArtifact(_)));
    }

    fn threshold_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn threshold_reads_value() {
        let file = threshold_file(r#"{"threshold": 0.37}"#);
        assert_eq!(load_threshold(file.path()).unwrap(), 0.37);
    }

    #[test]
    fn threshold_defaults_when_key_missing() {
        let file = threshold_file(r#"{"f1": 0.61}"#);
        assert_eq!(load_threshold(file.path()).unwrap(), DEFAULT_THRESHOLD);
    }

    #[test]
    fn threshold_accepts_numeric_string() {
        let file = threshold_file(r#"{"threshold": "0.42"}"#);
        assert_eq!(load_threshold(file.path()).unwrap(), 0.42);
    }

    #[test]
    fn threshold_rejects_out_of_range() {
        let file = threshold_file(r#"{"threshold": 1.5}"#);
        assert!(matches!(
            load_threshold(file.path()),
            Err(ArtifactError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn threshold_missing_file_is_io_error() {
        let err = load_threshold(Path::new("/nonexistent/threshold.json")).unwrap_err();
        assert!(matches!(err, ArtifactError::Io { .. }));
    }

    #[test]
    fn threshold_corrupt_file_is_parse_error() {
        let file = threshold_file("{threshold:");
        assert!(matches!(
            load_threshold(file.path()),
            Err(ArtifactError::Parse { .. })
        ));
    }
}
