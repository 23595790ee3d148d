use std::path::PathBuf;

use thiserror::Error;

/// Failures while wiring up backends and process-level plumbing.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error at `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open {backend} store: {message}")]
    StoreOpen {
        backend: &'static str,
        message: String,
    },
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn store_open(backend: &'static str, err: impl std::fmt::Display) -> Self {
        Self::StoreOpen {
            backend,
            message: err.to_string(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
