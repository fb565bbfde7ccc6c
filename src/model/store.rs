use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;

use crate::{
    drift::DriftReference,
    error::ServiceError,
    features::CategoryIndex,
    model::artifact::{ArtifactManifest, ModelArtifact},
};

pub const LATEST: &str = "latest";

/// A model artifact pinned to the version it was resolved from.
#[derive(Clone)]
pub struct ResolvedArtifact {
    pub version: String,
    pub artifact: Arc<dyn ModelArtifact>,
}

/// Training-time metadata for one (phase, problem) pair.
#[derive(Debug, Clone)]
pub struct ProblemMetadata {
    pub categorical_columns: Vec<String>,
    pub category_index: CategoryIndex,
    pub drift_reference: Option<DriftReference>,
}

/// Read side of the model registry.
pub trait ArtifactStore: Send + Sync {
    fn resolve(&self, name: &str, version: &str) -> Result<ResolvedArtifact, ServiceError>;

    fn resolve_metadata(&self, phase: &str, problem: &str) -> Result<ProblemMetadata, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct ProblemConfig {
    #[serde(default)]
    categorical_columns: Vec<String>,
    #[serde(default)]
    drift_reference: Option<DriftReference>,
}

/// Registry laid out on disk:
///
/// ```text
/// {root}/models/{name}/{version}/artifact.json
/// {root}/problems/{phase}/{problem}/problem.json
/// {root}/problems/{phase}/{problem}/category_index.json
/// ```
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    root: PathBuf,
}

impl FileArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn latest_version(&self, model_dir: &Path) -> Option<u64> {
        fs::read_dir(model_dir)
            .ok()?
            .filter_map(Result::ok)
            .filter(|entry| entry.path().join("artifact.json").is_file())
            .filter_map(|entry| entry.file_name().to_str()?.parse::<u64>().ok())
            .max()
    }
}

impl ArtifactStore for FileArtifactStore {
    fn resolve(&self, name: &str, version: &str) -> Result<ResolvedArtifact, ServiceError> {
        let model_dir = self.root.join("models").join(name);
        let version = if version == LATEST {
            self.latest_version(&model_dir)
                .ok_or_else(|| ServiceError::artifact_not_found(name, version))?
        } else {
            version
                .parse::<u64>()
                .map_err(|_| ServiceError::artifact_not_found(name, version))?
        };

        let version_dir = model_dir.join(version.to_string());
        let manifest_path = version_dir.join("artifact.json");
        if !manifest_path.is_file() {
            return Err(ServiceError::artifact_not_found(name, version.to_string()));
        }

        let raw = fs::read_to_string(&manifest_path)?;
        let manifest: ArtifactManifest = serde_json::from_str(&raw).map_err(|e| {
            ServiceError::Config(format!("invalid manifest {}: {e}", manifest_path.display()))
        })?;
        let artifact = manifest.load(&version_dir)?;

        Ok(ResolvedArtifact {
            version: version.to_string(),
            artifact: Arc::from(artifact),
        })
    }

    fn resolve_metadata(&self, phase: &str, problem: &str) -> Result<ProblemMetadata, ServiceError> {
        let dir = self.root.join("problems").join(phase).join(problem);
        let config: ProblemConfig = read_json(&dir.join("problem.json"))?;
        let category_index: CategoryIndex = read_json(&dir.join("category_index.json"))?;

        Ok(ProblemMetadata {
            categorical_columns: config.categorical_columns,
            category_index,
            drift_reference: config.drift_reference,
        })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ServiceError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| ServiceError::Config(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| ServiceError::Config(format!("invalid {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn write(path: PathBuf, value: serde_json::Value) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_vec(&value).unwrap()).unwrap();
    }

    fn linear(intercept: f64) -> serde_json::Value {
        json!({
            "flavor": "linear",
            "feature_names": ["age"],
            "coefficients": [[0.0]],
            "intercepts": [intercept]
        })
    }

    #[test]
    fn latest_picks_highest_numeric_version() {
        let dir = TempDir::new().unwrap();
        let models = dir.path().join("models/p_q_m");
        write(models.join("2/artifact.json"), linear(2.0));
        write(models.join("10/artifact.json"), linear(10.0));
        write(models.join("3/artifact.json"), linear(3.0));
        fs::create_dir_all(models.join("11")).unwrap();

        let store = FileArtifactStore::new(dir.path());
        let resolved = store.resolve("p_q_m", LATEST).unwrap();
        assert_eq!(resolved.version, "10");

        let pinned = store.resolve("p_q_m", "2").unwrap();
        assert_eq!(pinned.version, "2");
    }

    #[test]
    fn missing_model_is_artifact_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path());
        assert!(matches!(
            store.resolve("nope", LATEST),
            Err(ServiceError::ArtifactNotFound { .. })
        ));

        write(dir.path().join("models/p_q_m/1/artifact.json"), linear(0.0));
        assert!(matches!(
            store.resolve("p_q_m", "7"),
            Err(ServiceError::ArtifactNotFound { .. })
        ));
        assert!(matches!(
            store.resolve("p_q_m", "v3"),
            Err(ServiceError::ArtifactNotFound { .. })
        ));
    }

    #[test]
    fn reads_problem_metadata() {
        let dir = TempDir::new().unwrap();
        let problem = dir.path().join("problems/phase-1/prob-1");
        write(
            problem.join("problem.json"),
            json!({
                "categorical_columns": ["city"],
                "drift_reference": {"columns": {"age": {"mean": 35.0, "std": 5.0}}}
            }),
        );
        write(problem.join("category_index.json"), json!({"city": {"NYC": 0}}));

        let store = FileArtifactStore::new(dir.path());
        let meta = store.resolve_metadata("phase-1", "prob-1").unwrap();
        assert_eq!(meta.categorical_columns, vec!["city".to_string()]);
        assert!(meta.category_index.contains_column("city"));
        assert_eq!(meta.drift_reference.unwrap().threshold, 3.0);
    }

    #[test]
    fn missing_metadata_is_config_error() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path());
        assert!(matches!(
            store.resolve_metadata("phase-1", "prob-1"),
            Err(ServiceError::Config(_))
        ));
    }
}
