use std::any::Any;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use conduit_core::{BoxError, EventBus, ServiceRegistry};

use super::descriptor::PluginState;
use crate::pipeline::Middleware;

// ─── Plugin ──────────────────────────────────────────────────────────────────

/// The lifecycle contract every plugin implements.
///
/// All hooks have no-op defaults, so a plugin only overrides the stages it
/// cares about.  Hooks receive the plugin's [`PluginContext`], which stays
/// valid from load until unload.
///
/// A hook that returns `Err`, panics, or overruns the configured hook
/// timeout moves the plugin to the error state; it never affects unrelated
/// plugins.
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct ChromaPlugin;
///
/// #[async_trait]
/// impl Plugin for ChromaPlugin {
///     async fn init(&self, ctx: &PluginContext) -> Result<(), BoxError> {
///         let cfg: ChromaConfig = ctx.config_as()?;
///         ctx.provide("vector_store", Arc::new(Store::connect(&cfg.url)?));
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Checks the plugin's configuration.  Returning `false` fails the plugin
    /// before `init` runs.
    fn validate_config(&self, _ctx: &PluginContext) -> bool {
        true
    }

    /// Prepares internal state.  Runs once every dependency is initialized.
    async fn init(&self, _ctx: &PluginContext) -> Result<(), BoxError> {
        Ok(())
    }

    /// Starts serving.  Runs after every plugin has had its `init` pass.
    async fn activate(&self, _ctx: &PluginContext) -> Result<(), BoxError> {
        Ok(())
    }

    /// Stops serving.  Only called for plugins that reached the active state.
    async fn deactivate(&self, _ctx: &PluginContext) -> Result<(), BoxError> {
        Ok(())
    }

    /// Releases resources.  Called on unload whenever an instance exists.
    fn cleanup(&self) {}

    /// Returns the plugin as a middleware, if it is one.
    ///
    /// Middleware plugins are registered with the pipeline on activation and
    /// unregistered on unload.  Implementors return `Some(self)`.
    fn as_middleware(self: Arc<Self>) -> Option<Arc<dyn Middleware>> {
        None
    }

    /// Free-form runtime details surfaced by `plugin info`.
    fn describe(&self) -> Value {
        Value::Null
    }
}

// ─── PluginContext ───────────────────────────────────────────────────────────

/// Read access to the controller's plugin table.
pub(crate) trait PluginLookup: Send + Sync {
    fn instance(&self, name: &str) -> Option<Arc<dyn Plugin>>;
    fn state(&self, name: &str) -> Option<PluginState>;
}

/// Handle given to every plugin hook.
///
/// Provides the plugin's configuration section, the shared service registry
/// and event bus, and read-only lookups of other plugins.  Services
/// registered through [`PluginContext::provide`] are removed automatically
/// when the plugin is unloaded.
pub struct PluginContext {
    name: String,
    config: Arc<Value>,
    services: Arc<ServiceRegistry>,
    events: Arc<EventBus>,
    lookup: Weak<dyn PluginLookup>,
    provided: Mutex<Vec<String>>,
}

impl PluginContext {
    pub(crate) fn new(
        name: impl Into<String>,
        config: Arc<Value>,
        services: Arc<ServiceRegistry>,
        events: Arc<EventBus>,
        lookup: Weak<dyn PluginLookup>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            services,
            events,
            lookup,
            provided: Mutex::new(Vec::new()),
        }
    }

    /// Name of the plugin this context belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw configuration section for this plugin (`null` when absent).
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Deserialises the configuration section into `T`.
    ///
    /// An absent section is treated as an empty object, so a struct with
    /// `#[serde(default)]` fields always deserialises.
    pub fn config_as<T>(&self) -> serde_json::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        match self.config.as_ref() {
            Value::Null => T::deserialize(Value::Object(Default::default())),
            value => T::deserialize(value),
        }
    }

    /// The shared service registry.
    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    /// The shared event bus.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Registers a service owned by this plugin.
    pub fn provide<T>(&self, name: impl Into<String>, service: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        let name = name.into();
        self.services.register(name.clone(), service);
        let mut provided = self.provided.lock();
        if !provided.contains(&name) {
            provided.push(name);
        }
    }

    /// Live instance of another plugin, if it is currently loaded.
    pub fn plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.lookup.upgrade()?.instance(name)
    }

    /// Current state of another plugin.
    pub fn plugin_state(&self, name: &str) -> Option<PluginState> {
        self.lookup.upgrade()?.state(name)
    }

    /// Names of services registered through [`PluginContext::provide`].
    pub fn provided_services(&self) -> Vec<String> {
        self.provided.lock().clone()
    }

    /// Unregisters everything this plugin provided.
    pub(crate) fn withdraw_services(&self) {
        let names = std::mem::take(&mut *self.provided.lock());
        for name in names {
            self.services.unregister(&name);
            debug!(plugin = %self.name, service = %name, "Provided service withdrawn");
        }
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("provided", &*self.provided.lock())
            .finish_non_exhaustive()
    }
}
