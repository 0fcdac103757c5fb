//! Engine error types

use crate::diag::Diagnostics;
use crate::sweep::SweepError;
use crate::wait::WaitError;
use thiserror::Error;

/// Errors raised by the engine itself (state, manifests, planning)
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Unsupported resource type: {0}")]
    UnsupportedResourceType(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Duplicate resource address: {0}")]
    DuplicateAddress(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("{0}")]
    Diagnostics(#[from] Diagnostics),

    #[error(transparent)]
    Wait(#[from] WaitError),

    #[error(transparent)]
    Sweep(#[from] SweepError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Boxed error used by refresh and retry callbacks
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
