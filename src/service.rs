use std::{collections::HashMap, sync::Arc};

use serde::Serialize;
use tokio::task;
use tracing::{debug, error, info, warn};

use crate::{
    capture::CaptureStore,
    error::ServiceError,
    model::{
        ArtifactStore, Evaluation, ModelHandle, ModelMetadata, ModelSpec, PredictionRequest,
        PredictionResult, route_key,
    },
    telemetry::{self, InferenceEvent, SinkRegistry},
};

/// A configured model that could not be registered.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationFailure {
    pub key: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationReport {
    pub loaded: Vec<ModelMetadata>,
    pub failed: Vec<RegistrationFailure>,
}

/// Routes `{phase}_{problem}` to exactly one loaded model. The routing table
/// is fixed at construction.
pub struct PredictionService {
    handles: HashMap<String, Arc<ModelHandle>>,
    failures: Vec<RegistrationFailure>,
    capture: Option<CaptureStore>,
}

impl PredictionService {
    /// Loads every spec. A spec that fails is recorded and skipped so the
    /// remaining routes still come up.
    pub fn load(
        store: &dyn ArtifactStore,
        specs: &[ModelSpec],
        version: &str,
        sinks: &SinkRegistry,
    ) -> Self {
        let mut handles = HashMap::with_capacity(specs.len());
        let mut failures = Vec::new();

        for spec in specs {
            let route = spec.route();
            if handles.contains_key(&route) {
                warn!(model = %spec, %route, "route already served by another model, skipping");
                failures.push(RegistrationFailure {
                    key: spec.registry_name(),
                    error: ServiceError::Config(format!("duplicate route {route}")).to_string(),
                });
                continue;
            }

            match ModelHandle::load(store, spec, version, sinks.sink_for(spec)) {
                Ok(handle) => {
                    let meta = handle.metadata();
                    info!(
                        model = %spec,
                        version = %meta.version,
                        flavor = %meta.flavor,
                        sink = %handle.sink().describe(),
                        "model registered"
                    );
                    handles.insert(route, Arc::new(handle));
                }
                Err(err) => {
                    error!(model = %spec, error = %err, "model failed to load");
                    failures.push(RegistrationFailure {
                        key: spec.registry_name(),
                        error: err.to_string(),
                    });
                }
            }
        }

        Self {
            handles,
            failures,
            capture: None,
        }
    }

    pub fn from_handles(handles: Vec<ModelHandle>) -> Self {
        let handles = handles
            .into_iter()
            .map(|h| (h.spec().route(), Arc::new(h)))
            .collect();
        Self {
            handles,
            failures: Vec::new(),
            capture: None,
        }
    }

    pub fn with_capture(mut self, capture: CaptureStore) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn loaded(&self) -> Vec<ModelMetadata> {
        let mut loaded: Vec<_> = self.handles.values().map(|h| h.metadata()).collect();
        loaded.sort_by(|a, b| a.route.cmp(&b.route));
        loaded
    }

    pub fn failures(&self) -> &[RegistrationFailure] {
        &self.failures
    }

    pub fn report(&self) -> RegistrationReport {
        RegistrationReport {
            loaded: self.loaded(),
            failed: self.failures.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    fn route(&self, phase: &str, problem: &str) -> Result<Arc<ModelHandle>, ServiceError> {
        let key = route_key(phase, problem);
        self.handles
            .get(&key)
            .cloned()
            .ok_or(ServiceError::UnknownModel(key))
    }

    pub async fn predict(
        &self,
        phase: &str,
        problem: &str,
        request: PredictionRequest,
    ) -> Result<PredictionResult, ServiceError> {
        let handle = self.route(phase, problem)?;
        request.validate()?;

        // Logging runs on the blocking thread too; sink writes are file I/O.
        let (request, evaluation) = task::spawn_blocking(move || {
            let evaluation = handle.evaluate(&request);
            if let Ok(evaluation) = &evaluation {
                log_inference(&handle, &request, evaluation);
            }
            (request, evaluation)
        })
        .await
        .map_err(|err| ServiceError::Inference(format!("inference task failed: {err}")))?;
        let evaluation = evaluation?;

        if let Some(capture) = self.capture.clone() {
            let features = evaluation.features;
            let id = request.id.clone();
            // Not awaited: capture never delays the response.
            task::spawn_blocking(move || match capture.save(&features, &id) {
                Ok(path) => debug!(path = %path.display(), "captured request features"),
                Err(err) => warn!(id = %id, error = %err, "failed to capture request features"),
            });
        }

        Ok(PredictionResult {
            id: request.id,
            predictions: evaluation.predictions,
            drift: evaluation.drift,
        })
    }
}

fn log_inference(handle: &ModelHandle, request: &PredictionRequest, evaluation: &Evaluation) {
    let latency_ms = evaluation.elapsed.as_millis() as u64;
    let route = handle.spec().route();
    info!(
        key = %route,
        id = %request.id,
        rows = request.rows.len(),
        latency_ms,
        drift = evaluation.drift.as_u8(),
        "prediction served"
    );

    telemetry::record(
        handle.sink(),
        &InferenceEvent {
            timestamp_ms: telemetry::now_ms(),
            key: &route,
            id: &request.id,
            columns: &request.columns,
            rows: &request.rows,
            predictions: &evaluation.predictions,
            drift: evaluation.drift,
            latency_ms,
        },
    );
}
