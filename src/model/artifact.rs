use std::path::Path;

use serde::Deserialize;

use crate::{
    error::ServiceError,
    features::{FeatureTable, FeatureValue},
    model::Prediction,
};

/// A loaded, immutable model exposing a batch predict capability.
pub trait ModelArtifact: Send + Sync {
    fn flavor(&self) -> &'static str;

    /// Input columns in the order the model consumes them.
    fn feature_names(&self) -> &[String];

    fn predict(&self, table: &FeatureTable) -> Result<Vec<Prediction>, ServiceError>;

    /// Artifacts returning `false` get one predict in flight per handle.
    fn is_reentrant(&self) -> bool {
        true
    }
}

/// On-disk description of a registered model version (`artifact.json`).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "flavor", rename_all = "snake_case")]
pub enum ArtifactManifest {
    Linear(LinearSpec),
    Torchscript {
        path: String,
        feature_names: Vec<String>,
    },
}

impl ArtifactManifest {
    /// Builds the artifact; relative paths resolve against `version_dir`.
    pub fn load(self, version_dir: &Path) -> Result<Box<dyn ModelArtifact>, ServiceError> {
        match self {
            ArtifactManifest::Linear(spec) => Ok(Box::new(LinearModel::new(spec)?)),
            #[cfg(feature = "tch-backend")]
            ArtifactManifest::Torchscript {
                path,
                feature_names,
            } => {
                let module =
                    crate::model::tch_backend::TorchScriptModel::load(&version_dir.join(path), feature_names)?;
                Ok(Box::new(module))
            }
            #[cfg(not(feature = "tch-backend"))]
            ArtifactManifest::Torchscript { path, .. } => Err(ServiceError::Config(format!(
                "artifact {} needs the tch-backend feature",
                version_dir.join(path).display()
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinearSpec {
    pub feature_names: Vec<String>,
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
    #[serde(default)]
    pub classes: Option<Vec<i64>>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    0.5
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LinearKind {
    Regression,
    Logistic,
    Multiclass,
}

/// Linear model: regression, binary logistic, or one-vs-rest argmax.
#[derive(Debug, Clone)]
pub struct LinearModel {
    spec: LinearSpec,
    kind: LinearKind,
}

impl LinearModel {
    pub fn new(spec: LinearSpec) -> Result<Self, ServiceError> {
        if spec.coefficients.is_empty() || spec.coefficients.len() != spec.intercepts.len() {
            return Err(ServiceError::Config(format!(
                "linear model has {} coefficient rows and {} intercepts",
                spec.coefficients.len(),
                spec.intercepts.len()
            )));
        }
        if let Some(row) = spec
            .coefficients
            .iter()
            .find(|row| row.len() != spec.feature_names.len())
        {
            return Err(ServiceError::Config(format!(
                "coefficient row has {} weights for {} features",
                row.len(),
                spec.feature_names.len()
            )));
        }

        let kind = match (&spec.classes, spec.coefficients.len()) {
            (None, 1) => LinearKind::Regression,
            (Some(classes), 1) if classes.len() == 2 => LinearKind::Logistic,
            (Some(classes), rows) if classes.len() == rows && rows > 1 => LinearKind::Multiclass,
            (classes, rows) => {
                return Err(ServiceError::Config(format!(
                    "cannot map {rows} coefficient rows onto {} classes",
                    classes.as_ref().map_or(0, Vec::len)
                )));
            }
        };
        Ok(Self { spec, kind })
    }

    fn decision(&self, class_row: usize, features: &[f64]) -> f64 {
        self.spec.coefficients[class_row]
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.spec.intercepts[class_row]
    }

    fn predict_row(&self, features: &[f64]) -> Prediction {
        let classes = self.spec.classes.as_deref().unwrap_or_default();
        match self.kind {
            LinearKind::Regression => Prediction::Score(self.decision(0, features)),
            LinearKind::Logistic => {
                let p = sigmoid(self.decision(0, features));
                let class = if p >= self.spec.threshold { classes[1] } else { classes[0] };
                Prediction::Label(class)
            }
            LinearKind::Multiclass => {
                let best = (0..classes.len())
                    .map(|row| (row, self.decision(row, features)))
                    .fold((0, f64::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
                Prediction::Label(classes[best.0])
            }
        }
    }
}

impl ModelArtifact for LinearModel {
    fn flavor(&self) -> &'static str {
        "linear"
    }

    fn feature_names(&self) -> &[String] {
        &self.spec.feature_names
    }

    fn predict(&self, table: &FeatureTable) -> Result<Vec<Prediction>, ServiceError> {
        let matrix = numeric_matrix(table, &self.spec.feature_names)?;
        Ok(matrix.iter().map(|row| self.predict_row(row)).collect())
    }
}

/// Selects `feature_names` from the table as a dense f64 matrix. Nulls become
/// zero; text cells are a schema error.
pub fn numeric_matrix(
    table: &FeatureTable,
    feature_names: &[String],
) -> Result<Vec<Vec<f64>>, ServiceError> {
    let indices = feature_names
        .iter()
        .map(|name| {
            table
                .column_index(name)
                .ok_or_else(|| ServiceError::Schema(format!("model input column '{name}' is missing")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    table
        .rows
        .iter()
        .enumerate()
        .map(|(row_idx, row)| {
            indices
                .iter()
                .zip(feature_names)
                .map(|(&col, name)| match row.get(col) {
                    None => Err(ServiceError::Schema(format!(
                        "row {row_idx} has no value for column '{name}'"
                    ))),
                    Some(FeatureValue::Null) => Ok(0.0),
                    Some(FeatureValue::Text(_)) => Err(ServiceError::Schema(format!(
                        "row {row_idx} column '{name}' is not numeric"
                    ))),
                    Some(value) => Ok(value.as_f64().unwrap_or_default()),
                })
                .collect::<Result<Vec<f64>, _>>()
        })
        .collect()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
