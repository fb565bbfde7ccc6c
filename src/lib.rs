pub mod capture;
pub mod config;
pub mod drift;
pub mod error;
pub mod features;
pub mod model;
pub mod server;
pub mod service;
pub mod telemetry;

pub use config::AppConfig;
pub use error::ServiceError;
pub use model::{FileArtifactStore, ModelSpec, PredictionRequest, PredictionResult};
pub use server::build_router;
pub use service::PredictionService;
