use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::{
    drift::{DriftDetector, DriftFlag, NoDrift, ZScoreDrift},
    error::ServiceError,
    features::{FeaturePipeline, FeatureTable},
    model::{
        ModelMetadata, ModelSpec, Prediction, PredictionRequest,
        store::{ArtifactStore, ResolvedArtifact},
    },
    telemetry::EventSink,
};

/// One loaded model plus everything needed to serve its route.
pub struct ModelHandle {
    spec: ModelSpec,
    version: String,
    artifact: ResolvedArtifact,
    pipeline: FeaturePipeline,
    drift: Box<dyn DriftDetector>,
    sink: Arc<dyn EventSink>,
    // Held for the whole predict call when the artifact is not reentrant.
    gate: Option<Mutex<()>>,
}

/// Output of running one request through a handle.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub features: FeatureTable,
    pub predictions: Vec<Prediction>,
    pub drift: DriftFlag,
    pub elapsed: Duration,
}

impl ModelHandle {
    /// Resolves the artifact and its problem metadata. This is the only
    /// place that talks to the registry.
    pub fn load(
        store: &dyn ArtifactStore,
        spec: &ModelSpec,
        version: &str,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, ServiceError> {
        let artifact = store.resolve(&spec.registry_name(), version)?;
        let metadata = store.resolve_metadata(&spec.phase, &spec.problem)?;
        let pipeline = FeaturePipeline::new(metadata.categorical_columns, metadata.category_index)?;
        let drift: Box<dyn DriftDetector> = match metadata.drift_reference {
            Some(reference) => Box::new(ZScoreDrift::new(reference)),
            None => Box::new(NoDrift),
        };
        Ok(Self::from_parts(spec.clone(), artifact, pipeline, drift, sink))
    }

    pub fn from_parts(
        spec: ModelSpec,
        artifact: ResolvedArtifact,
        pipeline: FeaturePipeline,
        drift: Box<dyn DriftDetector>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let gate = (!artifact.artifact.is_reentrant()).then(|| Mutex::new(()));
        Self {
            version: artifact.version.clone(),
            spec,
            artifact,
            pipeline,
            drift,
            sink,
            gate,
        }
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn sink(&self) -> &dyn EventSink {
        self.sink.as_ref()
    }

    pub fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            route: self.spec.route(),
            registry_name: self.spec.registry_name(),
            version: self.version.clone(),
            flavor: self.artifact.artifact.flavor().to_string(),
            categorical_columns: self.pipeline.categorical_columns().to_vec(),
        }
    }

    pub fn infer(&self, features: &FeatureTable) -> Result<Vec<Prediction>, ServiceError> {
        let _guard = self.gate.as_ref().map(|gate| gate.lock());
        let predictions = self.artifact.artifact.predict(features)?;
        if predictions.len() != features.num_rows() {
            return Err(ServiceError::Inference(format!(
                "{} returned {} predictions for {} rows",
                self.spec.registry_name(),
                predictions.len(),
                features.num_rows()
            )));
        }
        Ok(predictions)
    }

    /// Preprocess, predict, and compute the drift flag for one request.
    pub fn evaluate(&self, request: &PredictionRequest) -> Result<Evaluation, ServiceError> {
        let features = self.pipeline.transform(&request.columns, &request.rows)?;

        let start = Instant::now();
        let predictions = self.infer(&features)?;
        let elapsed = start.elapsed();

        let drift = self.drift.detect(&features);

        Ok(Evaluation {
            features,
            predictions,
            drift,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::{
        features::CategoryIndex,
        model::artifact::ModelArtifact,
        telemetry::ConsoleSink,
    };

    /// Counts concurrent callers and answers with one label per row.
    struct CountingArtifact {
        names: Vec<String>,
        in_flight: AtomicUsize,
        max_seen: AtomicUsize,
        reentrant: bool,
    }

    impl ModelArtifact for CountingArtifact {
        fn flavor(&self) -> &'static str {
            "counting"
        }

        fn feature_names(&self) -> &[String] {
            &self.names
        }

        fn predict(&self, table: &FeatureTable) -> Result<Vec<Prediction>, ServiceError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok((0..table.num_rows() as i64).map(Prediction::Label).collect())
        }

        fn is_reentrant(&self) -> bool {
            self.reentrant
        }
    }

    fn handle(artifact: Arc<CountingArtifact>) -> ModelHandle {
        let index: CategoryIndex = serde_json::from_value(json!({"city": {"NYC": 0}})).unwrap();
        ModelHandle::from_parts(
            ModelSpec::new("phase-1", "prob-1", "model-1"),
            ResolvedArtifact {
                version: "1".into(),
                artifact,
            },
            FeaturePipeline::new(vec!["city".into()], index).unwrap(),
            Box::new(NoDrift),
            Arc::new(ConsoleSink),
        )
    }

    fn counting(reentrant: bool) -> Arc<CountingArtifact> {
        Arc::new(CountingArtifact {
            names: vec!["age".into(), "city".into()],
            in_flight: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
            reentrant,
        })
    }

    fn request() -> PredictionRequest {
        serde_json::from_value(json!({
            "id": "r1",
            "columns": ["age", "city"],
            "rows": [[30, "NYC"], [40, "LA"]]
        }))
        .unwrap()
    }

    #[test]
    fn evaluate_returns_one_prediction_per_row() {
        let handle = handle(counting(true));
        let eval = handle.evaluate(&request()).unwrap();
        assert_eq!(eval.predictions, vec![Prediction::Label(0), Prediction::Label(1)]);
        assert_eq!(eval.drift, DriftFlag::Stable);
        assert_eq!(eval.features.num_rows(), 2);
    }

    #[test]
    fn metadata_reports_route_and_version() {
        let meta = handle(counting(true)).metadata();
        assert_eq!(meta.route, "phase-1_prob-1");
        assert_eq!(meta.registry_name, "phase-1_prob-1_model-1");
        assert_eq!(meta.version, "1");
        assert_eq!(meta.flavor, "counting");
    }

    #[test]
    fn non_reentrant_artifacts_are_serialized() {
        let artifact = counting(false);
        let handle = Arc::new(handle(artifact.clone()));
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let handle = handle.clone();
                std::thread::spawn(move || handle.evaluate(&request()).unwrap())
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(artifact.max_seen.load(Ordering::SeqCst), 1);
    }
}
