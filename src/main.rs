use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use model_predictor::{
    AppConfig, FileArtifactStore, PredictionService, build_router, capture::CaptureStore,
    telemetry::SinkRegistry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(config.debug);

    tracing::info!(
        registry = %config.registry_uri.display(),
        models = config.models.len(),
        "loading model artifacts"
    );

    let store = FileArtifactStore::new(&config.registry_uri);
    let sinks = SinkRegistry::open(config.log_dir.as_deref(), &config.models)?;
    let mut service = PredictionService::load(&store, &config.models, &config.model_version, &sinks);
    if let Some(dir) = config.capture_dir.as_ref() {
        tracing::info!(dir = %dir.display(), "request capture enabled");
        service = service.with_capture(CaptureStore::new(dir));
    }
    if service.is_empty() {
        anyhow::bail!("no configured model could be loaded");
    }
    for failure in service.failures() {
        tracing::warn!(key = %failure.key, error = %failure.error, "serving without model");
    }

    let router = build_router(Arc::new(service));

    let listener = TcpListener::bind(config.listen_addr).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "REST server ready");

    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing(debug: bool) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let default_filter = if debug {
        "debug,hyper=warn,axum::rejection=trace"
    } else {
        "info,hyper=warn,axum::rejection=trace"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
