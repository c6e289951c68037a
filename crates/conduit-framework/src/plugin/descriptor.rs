//! Plugin manifests, descriptors and the lifecycle state machine.
//!
//! A [`PluginManifest`] is what a discovery source produces: a name, the
//! declared dependencies, a priority hint, metadata and a factory.  The
//! registry validates each manifest and turns it into a
//! [`PluginDescriptor`], the controller's record of the plugin for the rest
//! of the process.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use conduit_core::{BoxError, MissingDependencyWarning};

use super::core::Plugin;

// ─── API versioning ──────────────────────────────────────────────────────────

/// Current Conduit plugin API version (1.0).
pub const CONDUIT_PLUGIN_API_VERSION: u32 = 0x0001_0000;

/// Returns `true` if a plugin built against `api_version` can be hosted.
///
/// The major part must match exactly; the plugin's minor part must be ≤ the
/// host's minor part.
pub fn is_api_compatible(api_version: u32) -> bool {
    let host_major = CONDUIT_PLUGIN_API_VERSION >> 16;
    let host_minor = CONDUIT_PLUGIN_API_VERSION & 0xFFFF;
    api_version >> 16 == host_major && api_version & 0xFFFF <= host_minor
}

// ─── PluginState ─────────────────────────────────────────────────────────────

/// One node in the plugin state machine.
///
/// ```text
/// Discovered → Loading → Loaded → Initializing → Initialized → Active
///      └──────────┴─────────┴───────────┴──────────────┴──────────┴──► Error
/// Loaded | Initialized | Active | Error ──► Unloading ──► Unloaded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    /// Found by discovery, nothing instantiated yet.
    Discovered,
    /// Factory is running.
    Loading,
    /// Instance exists.
    Loaded,
    /// `init` is running.
    Initializing,
    /// `init` succeeded.
    Initialized,
    /// `activate` succeeded.
    Active,
    /// A stage failed; see the descriptor's error message.
    Error,
    /// Teardown in progress.
    Unloading,
    /// Torn down; the instance has been dropped.
    Unloaded,
}

impl PluginState {
    /// Returns the state name as used in logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Active => "active",
            Self::Error => "error",
            Self::Unloading => "unloading",
            Self::Unloaded => "unloaded",
        }
    }

    /// Returns `true` once the state can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Unloaded)
    }

    /// Returns `true` for `Initialized` and `Active`.
    pub fn is_initialized(self) -> bool {
        matches!(self, Self::Initialized | Self::Active)
    }

    /// Returns `true` if the plugin may be torn down from this state.
    pub fn can_unload(self) -> bool {
        matches!(
            self,
            Self::Active | Self::Initialized | Self::Loaded | Self::Error
        )
    }

    /// Checks whether moving to `target` respects the state machine.
    pub fn can_transition_to(self, target: PluginState) -> bool {
        use PluginState::*;
        match (self, target) {
            (Discovered, Loading)
            | (Loading, Loaded)
            | (Loaded, Initializing)
            | (Initializing, Initialized)
            | (Initialized, Active)
            | (Unloading, Unloaded) => true,
            (from, Error) => !matches!(from, Error | Unloaded),
            (from, Unloading) => from.can_unload(),
            _ => false,
        }
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── PluginMetadata ──────────────────────────────────────────────────────────

/// Descriptive metadata attached to every plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginMetadata {
    /// Semver version string.
    pub version: Cow<'static, str>,
    /// One-line description shown in listings.
    pub description: Cow<'static, str>,
}

impl Default for PluginMetadata {
    fn default() -> Self {
        Self {
            version: Cow::Borrowed("0.1.0"),
            description: Cow::Borrowed("No description provided"),
        }
    }
}

// ─── PluginManifest ──────────────────────────────────────────────────────────

/// Creates a live plugin instance.
pub type PluginFactory = Arc<dyn Fn() -> Result<Arc<dyn Plugin>, BoxError> + Send + Sync>;

/// Raw discovery output for one plugin.
///
/// ```rust,ignore
/// let manifest = PluginManifest::new("conversations", || Ok(ConversationsPlugin::default()))
///     .depends_on(["chroma", "config"])
///     .priority(20)
///     .description("Conversation export tooling");
/// ```
#[derive(Clone)]
pub struct PluginManifest {
    pub(crate) name: String,
    pub(crate) dependencies: Vec<String>,
    pub(crate) priority: i32,
    pub(crate) metadata: PluginMetadata,
    pub(crate) factory: PluginFactory,
}

impl PluginManifest {
    /// Creates a manifest whose factory builds a `P`.
    pub fn new<P, F>(name: impl Into<String>, factory: F) -> Self
    where
        P: Plugin,
        F: Fn() -> Result<P, BoxError> + Send + Sync + 'static,
    {
        let factory: PluginFactory = Arc::new(move || {
            let plugin = factory()?;
            Ok(Arc::new(plugin) as Arc<dyn Plugin>)
        });
        Self::with_factory(name, factory)
    }

    /// Creates a manifest from an already type-erased factory.
    pub fn with_factory(name: impl Into<String>, factory: PluginFactory) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            priority: 100,
            metadata: PluginMetadata::default(),
            factory,
        }
    }

    /// Declares dependencies on other plugins, by name.
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Sets the ordering hint for independent plugins (lower loads earlier).
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the version string.
    pub fn version(mut self, version: impl Into<Cow<'static, str>>) -> Self {
        self.metadata.version = version.into();
        self
    }

    /// Sets the one-line description.
    pub fn description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.metadata.description = description.into();
        self
    }

    /// Returns the manifest's plugin name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for PluginManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManifest")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("priority", &self.priority)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

// ─── PluginDescriptor ────────────────────────────────────────────────────────

/// The controller's record of one discovered plugin.
///
/// Only `state`, `error`, `dependents` and `warnings` change after
/// discovery.
#[derive(Clone)]
pub struct PluginDescriptor {
    name: String,
    dependencies: BTreeSet<String>,
    priority: i32,
    metadata: PluginMetadata,
    state: PluginState,
    error: Option<String>,
    dependents: BTreeSet<String>,
    warnings: Vec<MissingDependencyWarning>,
    factory: PluginFactory,
}

impl PluginDescriptor {
    /// Builds a descriptor in the `Discovered` state from a manifest.
    pub fn from_manifest(manifest: PluginManifest) -> Self {
        Self {
            name: manifest.name,
            dependencies: manifest.dependencies.into_iter().collect(),
            priority: manifest.priority,
            metadata: manifest.metadata,
            state: PluginState::Discovered,
            error: None,
            dependents: BTreeSet::new(),
            warnings: Vec::new(),
            factory: manifest.factory,
        }
    }

    /// Unique plugin name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names this plugin requires to be initialized first.
    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    /// Tie-break hint for independent plugins.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Descriptive metadata.
    pub fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PluginState {
        self.state
    }

    /// Message attached when the plugin entered `Error`.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Known plugins that depend on this one.
    pub fn dependents(&self) -> &BTreeSet<String> {
        &self.dependents
    }

    /// Dependencies that named undiscovered plugins.
    pub fn warnings(&self) -> &[MissingDependencyWarning] {
        &self.warnings
    }

    pub(crate) fn instantiate(&self) -> Result<Arc<dyn Plugin>, BoxError> {
        (self.factory)()
    }

    /// Marks the descriptor as failed without going through the state
    /// machine; used for manifests rejected during discovery.
    pub(crate) fn reject(&mut self, message: impl Into<String>) {
        self.state = PluginState::Error;
        self.error = Some(message.into());
    }

    pub(crate) fn set_state(&mut self, state: PluginState) {
        self.state = state;
    }

    pub(crate) fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub(crate) fn dependents_mut(&mut self) -> &mut BTreeSet<String> {
        &mut self.dependents
    }

    pub(crate) fn set_warnings(&mut self, warnings: Vec<MissingDependencyWarning>) {
        self.warnings = warnings;
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("priority", &self.priority)
            .field("state", &self.state)
            .field("error", &self.error)
            .field("dependents", &self.dependents)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PluginState::*;

    #[test]
    fn test_forward_transitions() {
        let path = [Discovered, Loading, Loaded, Initializing, Initialized, Active];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
            assert!(!pair[1].can_transition_to(pair[0]));
        }
        assert!(!Discovered.can_transition_to(Active));
        assert!(!Loaded.can_transition_to(Active));
    }

    #[test]
    fn test_error_reachable_from_non_terminal() {
        for state in [Discovered, Loading, Loaded, Initializing, Initialized, Active, Unloading] {
            assert!(state.can_transition_to(Error), "{state:?}");
        }
        assert!(!Unloaded.can_transition_to(Error));
    }

    #[test]
    fn test_unloading_sources() {
        for state in [Active, Initialized, Loaded, Error] {
            assert!(state.can_transition_to(Unloading), "{state:?}");
        }
        for state in [Discovered, Loading, Initializing, Unloaded] {
            assert!(!state.can_transition_to(Unloading), "{state:?}");
        }
        assert!(Unloading.can_transition_to(Unloaded));
        assert!(!Active.can_transition_to(Unloaded));
    }

    #[test]
    fn test_api_compatibility() {
        assert!(is_api_compatible(CONDUIT_PLUGIN_API_VERSION));
        assert!(is_api_compatible(0x0001_0000));
        assert!(!is_api_compatible(0x0002_0000));
        assert!(!is_api_compatible(0x0001_0001));
    }
}
