//! Per-model inference logs.
//!
//! Every served prediction is written as one JSON object per line to the sink
//! of the model that produced it. Sinks are opened once at startup by
//! [`SinkRegistry`] and handed to each model handle.

use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    drift::DriftFlag,
    error::ServiceError,
    model::{ModelSpec, Prediction},
};

/// One served request, replayable offline.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceEvent<'a> {
    pub timestamp_ms: u64,
    pub key: &'a str,
    pub id: &'a str,
    pub columns: &'a [String],
    pub rows: &'a [Vec<Value>],
    pub predictions: &'a [Prediction],
    pub drift: DriftFlag,
    pub latency_ms: u64,
}

pub trait EventSink: Send + Sync {
    /// Appends one complete line; implementations must not interleave lines
    /// from concurrent callers.
    fn append(&self, line: &str) -> io::Result<()>;

    fn describe(&self) -> String;
}

/// Append-only JSON-lines file.
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for FileSink {
    fn append(&self, line: &str) -> io::Result<()> {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        let mut file = self.file.lock();
        file.write_all(buf.as_bytes())?;
        file.flush()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Emits events through `tracing` on the `inference` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn append(&self, line: &str) -> io::Result<()> {
        info!(target: "inference", payload = %line);
        Ok(())
    }

    fn describe(&self) -> String {
        "console".to_string()
    }
}

/// One sink per configured model, built once before any request is served.
pub struct SinkRegistry {
    sinks: HashMap<String, Arc<dyn EventSink>>,
    fallback: Arc<dyn EventSink>,
}

impl SinkRegistry {
    /// Without a log directory every model logs to the console. A model whose
    /// log file cannot be opened also falls back to the console.
    pub fn open(log_dir: Option<&Path>, specs: &[ModelSpec]) -> Result<Self, ServiceError> {
        let fallback: Arc<dyn EventSink> = Arc::new(ConsoleSink);
        let mut sinks = HashMap::new();

        if let Some(dir) = log_dir {
            fs::create_dir_all(dir).map_err(|e| {
                ServiceError::Config(format!("cannot create log dir {}: {e}", dir.display()))
            })?;
            for spec in specs {
                let name = spec.registry_name();
                let path = dir.join(format!("{name}.log"));
                let sink: Arc<dyn EventSink> = match FileSink::open(&path) {
                    Ok(sink) => Arc::new(sink),
                    Err(err) => {
                        warn!(
                            model = %spec,
                            path = %path.display(),
                            error = %err,
                            "cannot open inference log, using console"
                        );
                        fallback.clone()
                    }
                };
                sinks.insert(name, sink);
            }
        }

        Ok(Self { sinks, fallback })
    }

    pub fn console() -> Self {
        Self {
            sinks: HashMap::new(),
            fallback: Arc::new(ConsoleSink),
        }
    }

    pub fn with_sink(mut self, spec: &ModelSpec, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.insert(spec.registry_name(), sink);
        self
    }

    pub fn sink_for(&self, spec: &ModelSpec) -> Arc<dyn EventSink> {
        self.sinks
            .get(&spec.registry_name())
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Writes the event to `sink`. Serialization or write failures are reported
/// and the line goes to the console instead; they never reach the caller.
pub fn record(sink: &dyn EventSink, event: &InferenceEvent<'_>) {
    let line = match serde_json::to_string(event) {
        Ok(line) => line,
        Err(err) => {
            warn!(key = event.key, id = event.id, error = %err, "failed to encode inference event");
            return;
        }
    };
    if let Err(err) = sink.append(&line) {
        warn!(
            key = event.key,
            sink = %sink.describe(),
            error = %err,
            "inference log write failed, falling back to console"
        );
        let _ = ConsoleSink.append(&line);
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
