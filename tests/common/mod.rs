#![allow(dead_code)]

use std::{fs, path::Path};

use serde_json::{Value, json};
use tempfile::TempDir;

use model_predictor::{FileArtifactStore, ModelSpec};

/// On-disk registry with the two phase-1 problems.
pub struct RegistryFixture {
    pub dir: TempDir,
}

impl RegistryFixture {
    pub fn empty() -> Self {
        Self {
            dir: TempDir::new().expect("tempdir"),
        }
    }

    /// prob-1 labels rows by age (30 -> 0, 40 -> 1); prob-2 always answers 6.
    pub fn phase_one() -> Self {
        let fixture = Self::empty();
        fixture.problem("phase-1", "prob-1", None);
        fixture.problem("phase-1", "prob-2", None);
        fixture.model("phase-1_prob-1_model-1", 1, age_classifier());
        fixture.model(
            "phase-1_prob-2_model-1",
            1,
            json!({
                "flavor": "linear",
                "feature_names": ["age", "city"],
                "coefficients": [[0.0, 0.0]],
                "intercepts": [10.0],
                "classes": [5, 6]
            }),
        );
        fixture
    }

    pub fn problem(&self, phase: &str, problem: &str, drift_reference: Option<Value>) {
        let dir = self.dir.path().join("problems").join(phase).join(problem);
        let mut config = json!({"categorical_columns": ["city"]});
        if let Some(reference) = drift_reference {
            config["drift_reference"] = reference;
        }
        write(&dir.join("problem.json"), &config);
        write(
            &dir.join("category_index.json"),
            &json!({"city": {"NYC": 0, "LA": 1}}),
        );
    }

    pub fn model(&self, name: &str, version: u32, manifest: Value) {
        let path = self
            .dir
            .path()
            .join("models")
            .join(name)
            .join(version.to_string())
            .join("artifact.json");
        write(&path, &manifest);
    }

    pub fn store(&self) -> FileArtifactStore {
        FileArtifactStore::new(self.dir.path())
    }
}

pub fn age_classifier() -> Value {
    json!({
        "flavor": "linear",
        "feature_names": ["age", "city"],
        "coefficients": [[0.1, 0.0]],
        "intercepts": [-3.5],
        "classes": [0, 1]
    })
}

pub fn phase_one_specs() -> Vec<ModelSpec> {
    vec![
        ModelSpec::new("phase-1", "prob-1", "model-1"),
        ModelSpec::new("phase-1", "prob-2", "model-1"),
    ]
}

fn write(path: &Path, value: &Value) {
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, serde_json::to_vec_pretty(value).expect("json")).expect("write");
}
