use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{drift::DriftFlag, error::ServiceError};

/// One configured model: the (phase, problem) route plus the registry model name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ModelSpec {
    pub phase: String,
    pub problem: String,
    pub model_name: String,
}

impl ModelSpec {
    pub fn new(
        phase: impl Into<String>,
        problem: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            phase: phase.into(),
            problem: problem.into(),
            model_name: model_name.into(),
        }
    }

    /// Key the HTTP layer resolves against: `{phase}_{problem}`.
    pub fn route(&self) -> String {
        route_key(&self.phase, &self.problem)
    }

    /// Registered model name: `{phase}_{problem}_{model_name}`.
    pub fn registry_name(&self) -> String {
        format!("{}_{}_{}", self.phase, self.problem, self.model_name)
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.phase, self.problem, self.model_name)
    }
}

impl FromStr for ModelSpec {
    type Err = ServiceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = raw.split('/').map(str::trim).collect();
        match parts.as_slice() {
            [phase, problem, model] if ![phase, problem, model].iter().any(|p| p.is_empty()) => {
                Ok(ModelSpec::new(*phase, *problem, *model))
            }
            _ => Err(ServiceError::Config(format!(
                "model spec '{raw}' must look like phase/problem/model"
            ))),
        }
    }
}

pub fn route_key(phase: &str, problem: &str) -> String {
    format!("{phase}_{problem}")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PredictionRequest {
    #[serde(default)]
    pub id: String,
    pub rows: Vec<Vec<Value>>,
    pub columns: Vec<String>,
}

impl PredictionRequest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        let mut seen = std::collections::HashSet::with_capacity(self.columns.len());
        if let Some(dup) = self.columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(ServiceError::Schema(format!("duplicate column '{dup}'")));
        }
        if let Some((idx, row)) = self
            .rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != self.columns.len())
        {
            return Err(ServiceError::Schema(format!(
                "row {idx} has {} values, expected {}",
                row.len(),
                self.columns.len()
            )));
        }
        Ok(())
    }
}

/// A class label or a regression score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Prediction {
    Label(i64),
    Score(f64),
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    pub id: String,
    pub predictions: Vec<Prediction>,
    pub drift: DriftFlag,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelMetadata {
    pub route: String,
    pub registry_name: String,
    pub version: String,
    pub flavor: String,
    pub categorical_columns: Vec<String>,
}
