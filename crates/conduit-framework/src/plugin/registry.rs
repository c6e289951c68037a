//! Plugin discovery.
//!
//! A [`PluginRegistry`] aggregates one or more [`DiscoverySource`]s and turns
//! their manifests into validated [`PluginDescriptor`]s.  Two sources ship
//! with the framework:
//!
//! - [`StaticSource`]: manifests handed over programmatically.
//! - [`LinkedSource`]: every [`PluginEntry`] linked into the binary through
//!   [`register_plugin!`](crate::register_plugin).
//!
//! Discovery never fails as a whole.  Each rejected manifest is reported as a
//! [`DiscoveryError`]; when the manifest still has a usable name it is also
//! kept as a descriptor in the error state so it shows up in listings.

use std::collections::HashSet;
use std::sync::Arc;

use linkme::distributed_slice;
use tracing::{debug, warn};

use conduit_core::{BoxError, DiscoveryError};

use super::core::Plugin;
use super::descriptor::{
    PluginDescriptor, PluginFactory, PluginManifest, is_api_compatible,
};

// ─── DiscoverySource ─────────────────────────────────────────────────────────

/// Something that can enumerate plugin manifests.
pub trait DiscoverySource: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Enumerates manifests.  Entries that could not be read are returned as
    /// errors without aborting the rest.
    fn discover(&self) -> Vec<Result<PluginManifest, DiscoveryError>>;
}

/// Manifests supplied directly by the embedding application.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    manifests: Vec<PluginManifest>,
}

impl StaticSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a manifest, builder-style.
    pub fn with(mut self, manifest: PluginManifest) -> Self {
        self.manifests.push(manifest);
        self
    }

    /// Adds a manifest.
    pub fn push(&mut self, manifest: PluginManifest) {
        self.manifests.push(manifest);
    }
}

impl FromIterator<PluginManifest> for StaticSource {
    fn from_iter<I: IntoIterator<Item = PluginManifest>>(iter: I) -> Self {
        Self {
            manifests: iter.into_iter().collect(),
        }
    }
}

impl DiscoverySource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    fn discover(&self) -> Vec<Result<PluginManifest, DiscoveryError>> {
        self.manifests.iter().cloned().map(Ok).collect()
    }
}

// ─── Link-time registration ──────────────────────────────────────────────────

/// A plugin registered at link time via [`register_plugin!`](crate::register_plugin).
#[derive(Debug)]
pub struct PluginEntry {
    /// Plugin API version the entry was compiled against.
    pub api_version: u32,
    /// Unique plugin name.
    pub name: &'static str,
    /// Names of required plugins.
    pub depends_on: &'static [&'static str],
    /// Ordering hint for independent plugins.
    pub priority: i32,
    /// Semver version string.
    pub version: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Creates the live plugin instance.
    pub create: fn() -> Result<Arc<dyn Plugin>, BoxError>,
}

impl PluginEntry {
    fn to_manifest(&self) -> Result<PluginManifest, DiscoveryError> {
        if !is_api_compatible(self.api_version) {
            return Err(DiscoveryError::Source {
                plugin: self.name.to_string(),
                reason: format!(
                    "built against plugin API {:#010x}, which this host does not support",
                    self.api_version
                ),
            });
        }
        let create = self.create;
        let factory: PluginFactory = Arc::new(move || create());
        Ok(PluginManifest::with_factory(self.name, factory)
            .depends_on(self.depends_on.iter().copied())
            .priority(self.priority)
            .version(self.version)
            .description(self.description))
    }
}

/// All plugins linked into the binary.
#[distributed_slice]
pub static PLUGIN_ENTRIES: [PluginEntry];

/// Discovers every [`PluginEntry`] in [`PLUGIN_ENTRIES`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkedSource;

impl DiscoverySource for LinkedSource {
    fn name(&self) -> &str {
        "linked"
    }

    fn discover(&self) -> Vec<Result<PluginManifest, DiscoveryError>> {
        PLUGIN_ENTRIES.iter().map(PluginEntry::to_manifest).collect()
    }
}

// ─── PluginRegistry ──────────────────────────────────────────────────────────

/// Output of [`PluginRegistry::discover`].
#[derive(Debug, Default)]
pub struct Discovery {
    /// One descriptor per unique, named manifest, in discovery order.
    pub descriptors: Vec<PluginDescriptor>,
    /// Every rejected manifest.
    pub errors: Vec<DiscoveryError>,
}

/// Aggregates discovery sources.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    sources: Vec<Arc<dyn DiscoverySource>>,
}

impl PluginRegistry {
    /// Creates a registry with no sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source, builder-style.
    pub fn with_source(mut self, source: impl DiscoverySource + 'static) -> Self {
        self.add_source(source);
        self
    }

    /// Adds a source.  Sources are consulted in insertion order.
    pub fn add_source(&mut self, source: impl DiscoverySource + 'static) {
        self.sources.push(Arc::new(source));
    }

    /// Number of configured sources.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Enumerates all sources and validates their manifests.
    ///
    /// When two manifests share a name the first one wins and the second is
    /// reported as [`DiscoveryError::Duplicate`].
    pub fn discover(&self) -> Discovery {
        let mut out = Discovery::default();
        let mut seen = HashSet::new();

        for source in &self.sources {
            let entries = source.discover();
            debug!(source = source.name(), count = entries.len(), "Discovery source enumerated");

            for entry in entries {
                let manifest = match entry {
                    Ok(manifest) => manifest,
                    Err(e) => {
                        warn!(source = source.name(), error = %e, "Plugin discovery failed");
                        if let Some(name) = e.plugin().filter(|n| !n.trim().is_empty()) {
                            if seen.insert(name.to_string()) {
                                out.descriptors.push(placeholder(name, &e));
                            }
                        }
                        out.errors.push(e);
                        continue;
                    }
                };

                if manifest.name.trim().is_empty() {
                    warn!(source = source.name(), "Plugin manifest rejected: empty name");
                    out.errors.push(DiscoveryError::EmptyName);
                    continue;
                }
                if !seen.insert(manifest.name.clone()) {
                    warn!(plugin = %manifest.name, "Duplicate plugin manifest ignored");
                    out.errors.push(DiscoveryError::Duplicate(manifest.name));
                    continue;
                }

                let malformed = manifest
                    .dependencies
                    .iter()
                    .find(|d| !is_well_formed(d))
                    .cloned();
                let mut descriptor = PluginDescriptor::from_manifest(manifest);
                if let Some(dependency) = malformed {
                    let e = DiscoveryError::MalformedDependency {
                        plugin: descriptor.name().to_string(),
                        dependency,
                    };
                    warn!(plugin = %descriptor.name(), error = %e, "Plugin manifest rejected");
                    descriptor.reject(e.to_string());
                    out.errors.push(e);
                } else {
                    debug!(plugin = %descriptor.name(), "Plugin discovered");
                }
                out.descriptors.push(descriptor);
            }
        }

        out
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("PluginRegistry").field("sources", &names).finish()
    }
}

fn is_well_formed(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(|c| c.is_whitespace() || c.is_control())
}

fn placeholder(name: &str, error: &DiscoveryError) -> PluginDescriptor {
    let factory: PluginFactory = Arc::new(|| -> Result<Arc<dyn Plugin>, BoxError> {
        Err("plugin was rejected during discovery".into())
    });
    let mut descriptor = PluginDescriptor::from_manifest(PluginManifest::with_factory(name, factory));
    descriptor.reject(error.to_string());
    descriptor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginState;

    #[derive(Default)]
    struct Noop;

    impl Plugin for Noop {}

    fn manifest(name: &str) -> PluginManifest {
        PluginManifest::new(name, || Ok(Noop))
    }

    struct FailingSource;

    impl DiscoverySource for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }

        fn discover(&self) -> Vec<Result<PluginManifest, DiscoveryError>> {
            vec![
                Err(DiscoveryError::Source {
                    plugin: "broken".into(),
                    reason: "unreadable manifest".into(),
                }),
                Ok(manifest("healthy")),
            ]
        }
    }

    #[test]
    fn test_discover_keeps_valid_and_reports_invalid() {
        let source = StaticSource::new()
            .with(manifest("config"))
            .with(manifest(""))
            .with(manifest("chroma").depends_on(["config", "bad name"]));
        let discovery = PluginRegistry::new().with_source(source).discover();

        let names: Vec<&str> = discovery.descriptors.iter().map(|d| d.name()).collect();
        assert_eq!(names, ["config", "chroma"]);
        assert_eq!(discovery.descriptors[0].state(), PluginState::Discovered);
        assert_eq!(discovery.descriptors[1].state(), PluginState::Error);
        assert!(discovery.descriptors[1].error().is_some_and(|e| e.contains("bad name")));
        assert_eq!(discovery.errors.len(), 2);
        assert_eq!(discovery.errors[0], DiscoveryError::EmptyName);
    }

    #[test]
    fn test_duplicate_first_wins() {
        let first = StaticSource::new().with(manifest("config").priority(1));
        let second = StaticSource::new().with(manifest("config").priority(2));
        let discovery = PluginRegistry::new()
            .with_source(first)
            .with_source(second)
            .discover();

        assert_eq!(discovery.descriptors.len(), 1);
        assert_eq!(discovery.descriptors[0].priority(), 1);
        assert_eq!(discovery.errors, vec![DiscoveryError::Duplicate("config".into())]);
    }

    #[test]
    fn test_source_error_does_not_stop_discovery() {
        let discovery = PluginRegistry::new().with_source(FailingSource).discover();
        let broken = &discovery.descriptors[0];
        assert_eq!(broken.name(), "broken");
        assert_eq!(broken.state(), PluginState::Error);
        assert_eq!(discovery.descriptors[1].name(), "healthy");
        assert_eq!(discovery.errors.len(), 1);
    }

    #[test]
    fn test_linked_source_sees_registered_plugins() {
        let discovered = LinkedSource.discover();
        let linked = discovered
            .iter()
            .filter_map(|m| m.as_ref().ok())
            .find(|m| m.name() == "linked_sample")
            .expect("linked_sample should be discoverable");
        assert_eq!(linked.dependencies, vec!["config".to_string()]);
        assert_eq!(linked.priority, 7);
        assert_eq!(linked.metadata.description, "Registered at link time");
        assert!((linked.factory)().is_ok());
    }

    crate::register_plugin! {
        LINKED_SAMPLE = {
            name: "linked_sample",
            plugin: Noop,
            depends_on: ["config"],
            priority: 7,
            description: "Registered at link time",
        }
    }
}
