use std::time::Duration;

use recon_core::error::CoreError;
use recon_db::{DbError, DirectoryError};
use recon_sink::SinkError;

/// Why a tenant's work unit (or a nested piece of it) did not complete.
#[derive(Debug, thiserror::Error)]
pub enum WorkError {
    /// Could not open or query a database.
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// The unit exceeded its deadline and was dropped.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Panicked: {0}")]
    Panicked(String),

    /// The admission pool was closed while work was waiting for it.
    #[error("Admission pool closed")]
    AdmissionClosed,

    #[error("{0}")]
    Other(String),
}

impl WorkError {
    /// Short failure class for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            // A deadline expiry is reported like any other unreachable database.
            WorkError::Db(_) | WorkError::Directory(_) | WorkError::Timeout(_) => "connection",
            WorkError::Sink(_) => "sink",
            WorkError::Core(_) => "validation",
            WorkError::Panicked(_) => "panic",
            WorkError::AdmissionClosed => "admission",
            WorkError::Other(_) => "other",
        }
    }

    /// Build a [`WorkError::Panicked`] from a caught panic payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        WorkError::Panicked(message)
    }
}
