//! Serializable views of controller state.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use conduit_core::{DiscoveryError, MissingDependencyWarning};

use crate::plugin::PluginState;

/// One row of a plugin listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginSummary {
    /// Plugin name.
    pub name: String,
    /// Current state.
    pub state: PluginState,
    /// Error message, when the plugin is in the error state.
    pub error: Option<String>,
}

/// Outcome of [`LifecycleController::start`](super::LifecycleController::start).
#[derive(Debug, Clone, Default, Serialize)]
pub struct StartReport {
    /// Resolved load order.
    pub order: Vec<String>,
    /// Plugins that reached the active state, in load order.
    pub active: Vec<String>,
    /// Plugins that ended in the error state.
    pub failed: Vec<PluginSummary>,
    /// Dependencies naming undiscovered plugins.
    pub warnings: Vec<MissingDependencyWarning>,
    /// Manifests rejected during discovery.
    pub discovery_errors: Vec<DiscoveryError>,
    /// Number of known plugins per state name.
    pub state_counts: BTreeMap<String, usize>,
}

impl StartReport {
    /// Returns `true` if every plugin is active and nothing was reported.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.warnings.is_empty() && self.discovery_errors.is_empty()
    }
}

/// Detailed view of one plugin.
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub priority: i32,
    pub state: PluginState,
    pub error: Option<String>,
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
    pub warnings: Vec<MissingDependencyWarning>,
    /// Name under which the plugin is registered as middleware.
    pub middleware: Option<String>,
    /// Services the plugin registered through its context.
    pub services: Vec<String>,
    /// Whatever the live instance reports about itself.
    pub details: Value,
}

/// State of one declared dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyStatus {
    pub name: String,
    /// `None` when the dependency was never discovered.
    pub state: Option<PluginState>,
}

/// Dependency view of one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyInfo {
    pub name: String,
    pub dependencies: Vec<DependencyStatus>,
    pub dependents: Vec<String>,
    /// Position in the resolved load order.
    pub load_position: Option<usize>,
}

/// Result of re-running a plugin's configuration check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub name: String,
    pub valid: bool,
    /// Why the check failed, when it did not simply return `false`.
    pub reason: Option<String>,
}
