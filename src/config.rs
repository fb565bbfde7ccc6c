use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use crate::{error::ServiceError, model::ModelSpec};

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MODELS: &str = "phase-1/prob-1/model-1,phase-1/prob-2/model-1";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    /// Root of the model registry (the tracking server's artifact store).
    pub registry_uri: PathBuf,
    pub model_version: String,
    pub models: Vec<ModelSpec>,
    pub log_dir: Option<PathBuf>,
    pub capture_dir: Option<PathBuf>,
    pub debug: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServiceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("PREDICTOR_HOST")
            .and_then(|v| v.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let port = lookup("PREDICTOR_API_PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let listen_addr = SocketAddr::new(host, port);

        let registry_uri = PathBuf::from(
            lookup("MODEL_REGISTRY_URI").unwrap_or_else(|| "mlruns/registry".to_string()),
        );
        let model_version = lookup("MODEL_VERSION")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "latest".to_string());

        let raw_models = lookup("PREDICTOR_MODELS").unwrap_or_else(|| DEFAULT_MODELS.to_string());
        let models = parse_models(&raw_models)?;

        let log_dir = match lookup("LOG_DIR") {
            Some(dir) if dir.trim().is_empty() => None,
            Some(dir) => Some(PathBuf::from(dir)),
            None => Some(PathBuf::from("logs")),
        };
        let capture_dir = lookup("CAPTURE_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let debug = lookup("DEBUG").map(|v| parse_flag(&v)).unwrap_or(false);

        Ok(Self {
            listen_addr,
            registry_uri,
            model_version,
            models,
            log_dir,
            capture_dir,
            debug,
        })
    }
}

fn parse_models(raw: &str) -> Result<Vec<ModelSpec>, ServiceError> {
    let models = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.parse::<ModelSpec>())
        .collect::<Result<Vec<_>, _>>()?;
    if models.is_empty() {
        return Err(ServiceError::Config(
            "PREDICTOR_MODELS must name at least one phase/problem/model".into(),
        ));
    }
    Ok(models)
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ServiceError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_serve_both_phase_one_problems() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.listen_addr.port(), 8000);
        assert_eq!(config.model_version, "latest");
        assert_eq!(config.models.len(), 2);
        assert_eq!(config.models[1].route(), "phase-1_prob-2");
        assert_eq!(config.log_dir, Some(PathBuf::from("logs")));
        assert!(config.capture_dir.is_none());
        assert!(!config.debug);
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("PREDICTOR_API_PORT", "9100"),
            ("PREDICTOR_MODELS", "phase-2/prob-3/model-7"),
            ("LOG_DIR", ""),
            ("CAPTURE_DIR", "/tmp/captured"),
            ("DEBUG", "True"),
        ])
        .unwrap();
        assert_eq!(config.listen_addr.port(), 9100);
        assert_eq!(config.models[0].model_name, "model-7");
        assert!(config.log_dir.is_none());
        assert_eq!(config.capture_dir, Some(PathBuf::from("/tmp/captured")));
        assert!(config.debug);
    }

    #[test]
    fn bad_port_falls_back_to_default() {
        let config = config_from(&[("PREDICTOR_API_PORT", "eighty")]).unwrap();
        assert_eq!(config.listen_addr.port(), DEFAULT_PORT);
    }

    #[test]
    fn malformed_model_triple_is_rejected() {
        let err = config_from(&[("PREDICTOR_MODELS", "phase-1/prob-1")]).unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));

        let err = config_from(&[("PREDICTOR_MODELS", " , ")]).unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }
}
