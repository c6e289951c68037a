//! Plugin contract, manifests and discovery.
//!
//! - [`Plugin`]: the lifecycle trait every plugin implements.
//! - [`PluginContext`]: the handle passed to every hook.
//! - [`PluginManifest`] / [`PluginDescriptor`]: what discovery produces and
//!   what the controller tracks.
//! - [`PluginRegistry`]: aggregates [`DiscoverySource`]s.
//! - [`register_plugin!`](crate::register_plugin): link-time registration.

mod core;
mod descriptor;
mod macros;
mod registry;

pub use self::core::{Plugin, PluginContext};
pub(crate) use self::core::PluginLookup;
pub use descriptor::{
    CONDUIT_PLUGIN_API_VERSION, PluginDescriptor, PluginFactory, PluginManifest, PluginMetadata,
    PluginState, is_api_compatible,
};
pub use registry::{
    Discovery, DiscoverySource, LinkedSource, PLUGIN_ENTRIES, PluginEntry, PluginRegistry,
    StaticSource,
};
