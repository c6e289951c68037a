//! Error types for the Conduit framework.

use thiserror::Error;

use conduit_core::CycleError;

/// Errors returned by [`LifecycleController`](crate::controller::LifecycleController)
/// operations.
///
/// Individual plugin failures are never surfaced here; they are recorded as
/// the plugin's error state and reported through listings and events.
#[derive(Debug, Clone, Error)]
pub enum ControllerError {
    /// The dependency graph contains a cycle; no plugin was started.
    #[error(transparent)]
    Cycle(#[from] CycleError),

    /// No plugin with this name has been discovered.
    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),

    /// The plugin is known but has no live instance.
    #[error("plugin '{0}' is not loaded")]
    NotLoaded(String),
}

impl ControllerError {
    /// Creates an [`UnknownPlugin`](Self::UnknownPlugin) error.
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::UnknownPlugin(name.into())
    }
}

/// Result type for controller operations.
pub type ControllerResult<T> = Result<T, ControllerError>;
