mod artifact;
mod handle;
mod store;
mod types;

#[cfg(feature = "tch-backend")]
pub mod tch_backend;

pub use artifact::{ArtifactManifest, LinearModel, LinearSpec, ModelArtifact, numeric_matrix};
pub use handle::{Evaluation, ModelHandle};
pub use store::{ArtifactStore, FileArtifactStore, LATEST, ProblemMetadata, ResolvedArtifact};
pub use types::{
    ModelMetadata, ModelSpec, Prediction, PredictionRequest, PredictionResult, route_key,
};
