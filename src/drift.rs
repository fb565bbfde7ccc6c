//! Per-request drift signal.
//!
//! The service only owns the slot: a [`DriftDetector`] turns the encoded
//! feature table into a binary [`DriftFlag`]. Detectors run synchronously on
//! the inference thread and must stay linear in the table size.

use std::collections::HashMap;

use serde::{Deserialize, Serialize, Serializer};

use crate::features::FeatureTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriftFlag {
    #[default]
    Stable,
    Drifted,
}

impl DriftFlag {
    pub fn as_u8(self) -> u8 {
        match self {
            DriftFlag::Stable => 0,
            DriftFlag::Drifted => 1,
        }
    }
}

impl From<bool> for DriftFlag {
    fn from(drifted: bool) -> Self {
        if drifted {
            DriftFlag::Drifted
        } else {
            DriftFlag::Stable
        }
    }
}

impl Serialize for DriftFlag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

pub trait DriftDetector: Send + Sync {
    fn detect(&self, table: &FeatureTable) -> DriftFlag;
}

/// Detector for problems that ship no reference distribution.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDrift;

impl DriftDetector for NoDrift {
    fn detect(&self, _table: &FeatureTable) -> DriftFlag {
        DriftFlag::Stable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ColumnStats {
    pub mean: f64,
    pub std: f64,
}

/// Reference distribution captured at training time.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DriftReference {
    pub columns: HashMap<String, ColumnStats>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    3.0
}

/// Flags a request when the batch mean of any referenced column lies more
/// than `threshold` reference deviations away from the training mean.
#[derive(Debug, Clone)]
pub struct ZScoreDrift {
    reference: DriftReference,
}

impl ZScoreDrift {
    pub fn new(reference: DriftReference) -> Self {
        Self { reference }
    }

    fn column_z_score(&self, table: &FeatureTable, column: &str, stats: &ColumnStats) -> Option<f64> {
        let idx = table.column_index(column)?;
        let (sum, count) = table
            .column_values(idx)
            .filter_map(|v| v.as_f64())
            .filter(|v| v.is_finite())
            .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
        if count == 0 {
            return None;
        }
        let mean = sum / count as f64;
        // Zero-variance reference: any shift at all counts as drift.
        if stats.std <= f64::EPSILON {
            return Some(if (mean - stats.mean).abs() <= f64::EPSILON {
                0.0
            } else {
                f64::INFINITY
            });
        }
        Some((mean - stats.mean) / stats.std)
    }
}

impl DriftDetector for ZScoreDrift {
    fn detect(&self, table: &FeatureTable) -> DriftFlag {
        let drifted = self.reference.columns.iter().any(|(column, stats)| {
            self.column_z_score(table, column, stats)
                .is_some_and(|z| z.abs() > self.reference.threshold)
        });
        DriftFlag::from(drifted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureValue;

    fn table(ages: &[i64]) -> FeatureTable {
        FeatureTable {
            columns: vec!["age".into(), "city".into()],
            rows: ages
                .iter()
                .map(|a| vec![FeatureValue::Int(*a), FeatureValue::Int(0)])
                .collect(),
        }
    }

    fn detector() -> ZScoreDrift {
        ZScoreDrift::new(DriftReference {
            columns: HashMap::from([("age".to_string(), ColumnStats { mean: 35.0, std: 5.0 })]),
            threshold: 3.0,
        })
    }

    #[test]
    fn flag_serializes_as_bit() {
        assert_eq!(serde_json::to_string(&DriftFlag::Stable).unwrap(), "0");
        assert_eq!(serde_json::to_string(&DriftFlag::Drifted).unwrap(), "1");
    }

    #[test]
    fn no_drift_is_always_stable() {
        assert_eq!(NoDrift.detect(&table(&[1000])), DriftFlag::Stable);
    }

    #[test]
    fn in_distribution_batch_is_stable() {
        assert_eq!(detector().detect(&table(&[30, 40])), DriftFlag::Stable);
    }

    #[test]
    fn shifted_batch_is_flagged() {
        assert_eq!(detector().detect(&table(&[90, 95])), DriftFlag::Drifted);
    }

    #[test]
    fn missing_or_non_numeric_columns_are_skipped() {
        let text = FeatureTable {
            columns: vec!["age".into()],
            rows: vec![vec![FeatureValue::Text("old".into())]],
        };
        assert_eq!(detector().detect(&text), DriftFlag::Stable);

        let other = FeatureTable {
            columns: vec!["income".into()],
            rows: vec![vec![FeatureValue::Float(1e9)]],
        };
        assert_eq!(detector().detect(&other), DriftFlag::Stable);
    }

    #[test]
    fn reference_threshold_defaults_to_three() {
        let reference: DriftReference =
            serde_json::from_str(r#"{"columns": {"age": {"mean": 1.0, "std": 0.5}}}"#).unwrap();
        assert_eq!(reference.threshold, 3.0);
    }
}
