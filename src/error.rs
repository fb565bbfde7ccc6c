use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("artifact not found: {name} (version {version})")]
    ArtifactNotFound { name: String, version: String },
    #[error("no model registered for {0}")]
    UnknownModel(String),
    #[error("invalid request: {0}")]
    Schema(String),
    #[error("model execution failed: {0}")]
    Inference(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    pub fn artifact_not_found(name: impl Into<String>, version: impl Into<String>) -> Self {
        ServiceError::ArtifactNotFound {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl From<arrow::error::ArrowError> for ServiceError {
    fn from(err: arrow::error::ArrowError) -> Self {
        ServiceError::Io(std::io::Error::other(err))
    }
}

impl From<parquet::errors::ParquetError> for ServiceError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        ServiceError::Io(std::io::Error::other(err))
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match self {
            ServiceError::UnknownModel(_) => StatusCode::NOT_FOUND,
            ServiceError::Schema(_) => StatusCode::BAD_REQUEST,
            ServiceError::Config(_)
            | ServiceError::ArtifactNotFound { .. }
            | ServiceError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_4xx() {
        let resp = ServiceError::UnknownModel("phase-9_prob-9".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = ServiceError::Schema("row 0 has 1 values".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn server_errors_map_to_500() {
        let resp = ServiceError::Config("column city missing".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let resp = ServiceError::artifact_not_found("a_b_c", "latest").into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
