//! Unified error types for the Conduit core.
//!
//! The taxonomy mirrors how far each failure is allowed to travel:
//!
//! | Type | Scope |
//! |------|-------|
//! | [`DiscoveryError`] | one plugin, recorded as its `Error` state |
//! | [`CycleError`] | the whole batch; the only fatal condition |
//! | [`MissingDependencyWarning`] | attached to the dependent, non-fatal |
//! | [`HookError`] | one lifecycle hook / middleware call |
//! | [`PipelineError`] | one pipeline invocation |

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::context::Phase;

/// Boxed error returned by plugin hooks, middleware calls and event handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Discovery / resolution
// =============================================================================

/// A single manifest failed validation during discovery.
///
/// Never aborts discovery of the remaining plugins.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum DiscoveryError {
    /// The manifest carried an empty name.
    #[error("plugin manifest has an empty name")]
    EmptyName,

    /// A declared dependency is not a well-formed plugin name.
    #[error("plugin '{plugin}' declares a malformed dependency '{dependency}'")]
    MalformedDependency {
        /// The plugin declaring the dependency.
        plugin: String,
        /// The offending dependency string.
        dependency: String,
    },

    /// Two sources (or one source twice) produced the same name.
    #[error("plugin '{0}' was discovered more than once; keeping the first manifest")]
    Duplicate(String),

    /// The discovery source itself reported a failure for this entry.
    #[error("plugin '{plugin}' could not be discovered: {reason}")]
    Source {
        /// The plugin name, when known.
        plugin: String,
        /// Source-provided reason.
        reason: String,
    },
}

impl DiscoveryError {
    /// Returns the plugin the error belongs to, if it has a usable name.
    pub fn plugin(&self) -> Option<&str> {
        match self {
            Self::EmptyName => None,
            Self::MalformedDependency { plugin, .. } | Self::Source { plugin, .. } => {
                Some(plugin)
            }
            Self::Duplicate(name) => Some(name),
        }
    }
}

/// The dependency graph contains a cycle.
///
/// `path` lists the plugins along the detected cycle, starting and ending with
/// the plugin that was re-entered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("plugin dependency cycle detected: {}", path.join(" -> "))]
pub struct CycleError {
    /// Plugins on the cycle, first element repeated at the end.
    pub path: Vec<String>,
}

impl CycleError {
    /// Returns `true` if `name` lies on the reported cycle.
    pub fn involves(&self, name: &str) -> bool {
        self.path.iter().any(|p| p == name)
    }
}

/// A dependency names a plugin that was never discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingDependencyWarning {
    /// The plugin that declared the dependency.
    pub plugin: String,
    /// The name that could not be found.
    pub dependency: String,
}

impl fmt::Display for MissingDependencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "plugin '{}' depends on '{}', which was not discovered",
            self.plugin, self.dependency
        )
    }
}

// =============================================================================
// Hook errors
// =============================================================================

/// Outcome of a failed hook, middleware call or event handler.
#[derive(Debug, Error)]
pub enum HookError {
    /// The call returned an error.
    #[error("{0}")]
    Failed(BoxError),

    /// The call did not settle before its deadline.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The call panicked.
    #[error("panicked: {0}")]
    Panicked(String),
}

impl HookError {
    /// Wraps an arbitrary message as a [`HookError::Failed`].
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed(message.into().into())
    }
}

// =============================================================================
// Pipeline errors
// =============================================================================

/// Describes which middleware failed, where, and why.
///
/// Handed by reference to every `ON_ERROR` middleware.
#[derive(Debug, Error)]
#[error("middleware '{middleware}' failed during {phase}: {source}")]
pub struct MiddlewareFailure {
    /// Name of the failing middleware.
    pub middleware: String,
    /// The phase that was executing.
    pub phase: Phase,
    /// The underlying error.
    #[source]
    pub source: HookError,
}

/// Errors surfaced to the caller of a pipeline invocation.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A processing phase failed and no `ON_ERROR` middleware handled it.
    #[error(transparent)]
    Unhandled(#[from] MiddlewareFailure),
}

impl PipelineError {
    /// Returns the failure that aborted processing.
    pub fn failure(&self) -> &MiddlewareFailure {
        match self {
            Self::Unhandled(f) => f,
        }
    }
}

/// Result type for pipeline invocations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_message_names_plugins() {
        let err = CycleError {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "plugin dependency cycle detected: a -> b -> a");
        assert!(err.involves("b"));
        assert!(!err.involves("c"));
    }

    #[test]
    fn test_discovery_error_plugin() {
        assert_eq!(DiscoveryError::EmptyName.plugin(), None);
        assert_eq!(
            DiscoveryError::Duplicate("chroma".into()).plugin(),
            Some("chroma")
        );
    }

    #[test]
    fn test_middleware_failure_display() {
        let failure = MiddlewareFailure {
            middleware: "audit".into(),
            phase: Phase::Process,
            source: HookError::msg("boom"),
        };
        assert_eq!(
            failure.to_string(),
            "middleware 'audit' failed during process: boom"
        );
    }
}
