//! Runtime error types.

use thiserror::Error;

use conduit_core::PipelineError;
use conduit_framework::ControllerError;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A lifecycle operation failed as a whole.
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// A pipeline invocation failed and no middleware handled it.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// `start` was called while plugins are already running.
    #[error("Runtime is already running")]
    AlreadyRunning,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
