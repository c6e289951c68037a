//! Plugin lifecycle orchestration.
//!
//! [`LifecycleController`] owns every plugin discovered through its
//! [`PluginRegistry`].  It:
//!
//! - Resolves a dependency order once per start or reload; a cycle aborts
//!   the whole operation before any plugin is touched.
//! - Drives plugins through three passes: load every plugin, then `init`
//!   every plugin, then `activate` every plugin.  Within a pass, plugins of
//!   the same dependency layer run concurrently when
//!   [`LifecycleOptions::parallel_passes`] is set; their outcomes are applied
//!   in load order once the whole layer has settled.
//! - Isolates failures: a hook that errors, panics or times out only moves
//!   its own plugin (and plugins depending on it) to the error state.
//! - Registers middleware plugins with the shared pipeline on activation and
//!   removes them again on unload.
//! - Cascades unloads to dependents and can reload a plugin in place.
//!
//! The plugin table sits behind a synchronous lock that is never held across
//! an `.await`.  Start, unload, reload and shutdown are serialised against
//! each other, so hooks must not call back into those operations.
//!
//! # Example
//!
//! ```rust,ignore
//! let controller = LifecycleController::builder()
//!     .source(StaticSource::new().with(config).with(chroma))
//!     .build();
//! let report = controller.start().await?;
//! controller.reload("chroma").await?;
//! controller.shutdown_all().await;
//! ```

mod report;

pub use report::{
    DependencyInfo, DependencyStatus, PluginInfo, PluginSummary, StartReport, ValidationOutcome,
};

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::{Value, json};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{Instrument, debug, error, info, info_span, warn};

use conduit_core::event::lifecycle;
use conduit_core::{
    BoxError, CycleError, DiscoveryError, EventBus, HookError, ServiceRegistry, guarded,
    guarded_sync,
};

use crate::error::{ControllerError, ControllerResult};
use crate::pipeline::MiddlewarePipeline;
use crate::plugin::{
    DiscoverySource, Plugin, PluginContext, PluginDescriptor, PluginLookup, PluginRegistry,
    PluginState,
};
use crate::resolver::{DependencyResolver, Resolution};

// =============================================================================
// Options
// =============================================================================

/// Tunables for lifecycle passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleOptions {
    /// Deadline for each `init` / `activate` / `deactivate` call.
    pub hook_timeout: Option<Duration>,
    /// Run independent plugins of one layer concurrently.
    pub parallel_passes: bool,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            hook_timeout: Some(Duration::from_secs(30)),
            parallel_passes: true,
        }
    }
}

// =============================================================================
// Plugin table (internal)
// =============================================================================

struct LiveSlot {
    instance: Arc<dyn Plugin>,
    context: Arc<PluginContext>,
    middleware: Option<String>,
}

#[derive(Default)]
struct PluginTable {
    /// Discovery order.
    descriptors: Vec<PluginDescriptor>,
    live: HashMap<String, LiveSlot>,
    resolution: Resolution,
    discovery_errors: Vec<DiscoveryError>,
}

impl PluginTable {
    fn position(&self, name: &str) -> Option<usize> {
        self.descriptors.iter().position(|d| d.name() == name)
    }

    fn get(&self, name: &str) -> Option<&PluginDescriptor> {
        self.descriptors.iter().find(|d| d.name() == name)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut PluginDescriptor> {
        self.descriptors.iter_mut().find(|d| d.name() == name)
    }

    fn state(&self, name: &str) -> Option<PluginState> {
        self.get(name).map(PluginDescriptor::state)
    }

    /// First known dependency of `name` that is not initialized.
    fn unmet_dependency(&self, name: &str) -> Option<(String, PluginState)> {
        let descriptor = self.get(name)?;
        descriptor.dependencies().iter().find_map(|dep| {
            let state = self.state(dep)?;
            (!state.is_initialized()).then(|| (dep.clone(), state))
        })
    }

    /// `name` plus everything that transitively depends on it.
    fn dependents_closure(&self, name: &str) -> BTreeSet<String> {
        let mut closure = BTreeSet::new();
        let mut stack = vec![name.to_string()];
        while let Some(next) = stack.pop() {
            if closure.contains(&next) {
                continue;
            }
            if let Some(descriptor) = self.get(&next) {
                stack.extend(descriptor.dependents().iter().cloned());
            }
            closure.insert(next);
        }
        closure
    }

    /// Known plugins in unload order (reverse load order), restricted to
    /// `filter` when given.
    fn unload_order(&self, filter: Option<&BTreeSet<String>>) -> Vec<String> {
        let keep = |n: &String| filter.is_none_or(|f| f.contains(n));
        let mut order: Vec<String> = self
            .resolution
            .order
            .iter()
            .rev()
            .filter(|n| keep(*n))
            .cloned()
            .collect();
        for descriptor in self.descriptors.iter().rev() {
            let name = descriptor.name().to_string();
            if keep(&name) && !order.contains(&name) {
                order.push(name);
            }
        }
        order
    }
}

type Armed = (String, Arc<dyn Plugin>, Arc<PluginContext>);

// =============================================================================
// Shared state
// =============================================================================

struct Inner {
    me: Weak<Inner>,
    registry: PluginRegistry,
    resolver: DependencyResolver,
    services: Arc<ServiceRegistry>,
    events: Arc<EventBus>,
    pipeline: Arc<MiddlewarePipeline>,
    plugin_configs: HashMap<String, Value>,
    options: LifecycleOptions,
    table: RwLock<PluginTable>,
    ops: AsyncMutex<()>,
}

impl PluginLookup for Inner {
    fn instance(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.table
            .read()
            .live
            .get(name)
            .map(|slot| Arc::clone(&slot.instance))
    }

    fn state(&self, name: &str) -> Option<PluginState> {
        self.table.read().state(name)
    }
}

fn in_scope(scope: Option<&HashSet<String>>, name: &str) -> bool {
    scope.is_none_or(|s| s.contains(name))
}

impl Inner {
    fn state_of(&self, name: &str) -> Option<PluginState> {
        self.table.read().state(name)
    }

    fn live_handles(&self, name: &str) -> Option<(Arc<dyn Plugin>, Arc<PluginContext>)> {
        let table = self.table.read();
        let slot = table.live.get(name)?;
        Some((Arc::clone(&slot.instance), Arc::clone(&slot.context)))
    }

    /// Applies a state change if the state machine allows it.
    fn transition(&self, name: &str, to: PluginState) -> bool {
        let mut table = self.table.write();
        let Some(descriptor) = table.get_mut(name) else {
            return false;
        };
        let from = descriptor.state();
        if !from.can_transition_to(to) {
            warn!(plugin = %name, from = %from, to = %to, "Illegal plugin state transition ignored");
            return false;
        }
        descriptor.set_state(to);
        debug!(plugin = %name, from = %from, to = %to, "Plugin state changed");
        true
    }

    async fn notify(&self, event_type: &str, name: &str, state: PluginState) {
        self.events
            .emit(event_type, json!({ "plugin": name, "state": state }))
            .await;
    }

    /// Moves `name` to the error state, recording `message`.
    async fn fail(&self, name: &str, stage: &'static str, message: String) {
        {
            let mut table = self.table.write();
            let Some(descriptor) = table.get_mut(name) else {
                return;
            };
            if !descriptor.state().can_transition_to(PluginState::Error) {
                return;
            }
            descriptor.set_state(PluginState::Error);
            descriptor.set_error(message.clone());
        }
        error!(plugin = %name, stage, error = %message, "Plugin failed");
        self.events
            .emit(
                lifecycle::FAILED,
                json!({ "plugin": name, "state": PluginState::Error, "error": message }),
            )
            .await;
    }

    fn resolve(&self) -> Result<Resolution, CycleError> {
        let mut table = self.table.write();
        let resolution = self.resolver.resolve(&mut table.descriptors)?;
        table.resolution = resolution.clone();
        Ok(resolution)
    }

    // ─── Passes ──────────────────────────────────────────────────────────────

    async fn run_passes(&self, scope: Option<&HashSet<String>>) {
        let (order, layers) = {
            let table = self.table.read();
            (
                table.resolution.order.clone(),
                table.resolution.layers.clone(),
            )
        };

        for name in order.iter().filter(|n| in_scope(scope, n)) {
            if self.state_of(name) == Some(PluginState::Discovered) {
                self.load(name).await;
            }
        }

        for layer in &layers {
            let batch: Vec<String> = layer
                .iter()
                .filter(|n| in_scope(scope, n))
                .cloned()
                .collect();
            self.init_layer(batch).await;
        }

        for layer in &layers {
            let batch: Vec<String> = layer
                .iter()
                .filter(|n| in_scope(scope, n))
                .cloned()
                .collect();
            self.activate_layer(batch).await;
        }
    }

    async fn load(&self, name: &str) {
        let Some(descriptor) = self.table.read().get(name).cloned() else {
            return;
        };
        if !self.transition(name, PluginState::Loading) {
            return;
        }

        let instance = match guarded_sync(|| descriptor.instantiate()) {
            Ok(Ok(instance)) => instance,
            Ok(Err(e)) => return self.fail(name, "load", e.to_string()).await,
            Err(e) => return self.fail(name, "load", e.to_string()).await,
        };

        let config = self.plugin_configs.get(name).cloned().unwrap_or(Value::Null);
        let lookup: Weak<dyn PluginLookup> = self.me.clone();
        let context = Arc::new(PluginContext::new(
            name,
            Arc::new(config),
            Arc::clone(&self.services),
            Arc::clone(&self.events),
            lookup,
        ));
        self.table.write().live.insert(
            name.to_string(),
            LiveSlot {
                instance,
                context,
                middleware: None,
            },
        );

        if self.transition(name, PluginState::Loaded) {
            info!(
                plugin = %name,
                version = %descriptor.metadata().version,
                "Plugin loaded"
            );
            self.notify(lifecycle::LOADED, name, PluginState::Loaded).await;
        }
    }

    async fn init_layer(&self, batch: Vec<String>) {
        let mut armed: Vec<Armed> = Vec::new();
        for name in batch {
            if self.state_of(&name) != Some(PluginState::Loaded) {
                continue;
            }
            let unmet = self.table.read().unmet_dependency(&name);
            if let Some((dep, state)) = unmet {
                let message = format!("dependency '{dep}' is {state}");
                self.fail(&name, "init", message).await;
                continue;
            }
            let Some((instance, context)) = self.live_handles(&name) else {
                continue;
            };
            match guarded_sync(|| instance.validate_config(&context)) {
                Ok(true) => {}
                Ok(false) => {
                    self.fail(&name, "validate", "configuration validation failed".into())
                        .await;
                    continue;
                }
                Err(e) => {
                    self.fail(&name, "validate", format!("configuration validation {e}"))
                        .await;
                    continue;
                }
            }
            if self.transition(&name, PluginState::Initializing) {
                armed.push((name, instance, context));
            }
        }

        let outcomes = self
            .run_hooks(armed, |plugin, ctx| async move { plugin.init(&ctx).await })
            .await;
        for (name, _, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    if self.transition(&name, PluginState::Initialized) {
                        info!(plugin = %name, "Plugin initialized");
                        self.notify(lifecycle::INITIALIZED, &name, PluginState::Initialized)
                            .await;
                    }
                }
                Err(e) => self.fail(&name, "init", e.to_string()).await,
            }
        }
    }

    async fn activate_layer(&self, batch: Vec<String>) {
        let mut armed: Vec<Armed> = Vec::new();
        for name in batch {
            if self.state_of(&name) != Some(PluginState::Initialized) {
                continue;
            }
            let unmet = self.table.read().unmet_dependency(&name);
            if let Some((dep, state)) = unmet {
                let message = format!("dependency '{dep}' is {state}");
                self.fail(&name, "activate", message).await;
                continue;
            }
            if let Some((instance, context)) = self.live_handles(&name) {
                armed.push((name, instance, context));
            }
        }

        let outcomes = self
            .run_hooks(armed, |plugin, ctx| async move { plugin.activate(&ctx).await })
            .await;
        for (name, instance, outcome) in outcomes {
            if let Err(e) = outcome {
                self.fail(&name, "activate", e.to_string()).await;
                continue;
            }
            if !self.transition(&name, PluginState::Active) {
                continue;
            }
            if let Some(middleware) = instance.as_middleware() {
                let middleware_name = middleware.name().to_string();
                self.pipeline.register(middleware);
                if let Some(slot) = self.table.write().live.get_mut(&name) {
                    slot.middleware = Some(middleware_name);
                }
            }
            info!(plugin = %name, "Plugin activated");
            self.notify(lifecycle::ACTIVATED, &name, PluginState::Active).await;
        }
    }

    /// Runs one hook for every armed plugin, concurrently or in order.
    /// Outcomes come back in the order the plugins were armed.
    async fn run_hooks<F, Fut>(
        &self,
        armed: Vec<Armed>,
        hook: F,
    ) -> Vec<(String, Arc<dyn Plugin>, Result<(), HookError>)>
    where
        F: Fn(Arc<dyn Plugin>, Arc<PluginContext>) -> Fut,
        Fut: Future<Output = Result<(), BoxError>>,
    {
        let timeout = self.options.hook_timeout;
        if self.options.parallel_passes {
            join_all(armed.into_iter().map(|(name, plugin, ctx)| {
                let call = guarded(timeout, hook(Arc::clone(&plugin), ctx));
                async move { (name, plugin, call.await) }
            }))
            .await
        } else {
            let mut outcomes = Vec::with_capacity(armed.len());
            for (name, plugin, ctx) in armed {
                let outcome = guarded(timeout, hook(Arc::clone(&plugin), ctx)).await;
                outcomes.push((name, plugin, outcome));
            }
            outcomes
        }
    }

    // ─── Teardown ────────────────────────────────────────────────────────────

    /// Unloads `name` and everything depending on it, dependents first.
    async fn unload_cascade(&self, name: &str) -> ControllerResult<Vec<String>> {
        let targets = {
            let table = self.table.read();
            if table.get(name).is_none() {
                return Err(ControllerError::unknown(name));
            }
            let closure = table.dependents_closure(name);
            table.unload_order(Some(&closure))
        };

        let mut unloaded = Vec::new();
        for target in targets {
            if self.unload_one(&target).await {
                unloaded.push(target);
            }
        }
        Ok(unloaded)
    }

    /// Tears down a single plugin.  Returns `false` if its state does not
    /// allow unloading.
    async fn unload_one(&self, name: &str) -> bool {
        let Some(state) = self.state_of(name) else {
            return false;
        };
        if !state.can_unload() {
            debug!(plugin = %name, state = %state, "Plugin not unloadable in its current state");
            return false;
        }
        if !self.transition(name, PluginState::Unloading) {
            return false;
        }

        let slot = self.table.write().live.remove(name);
        if let Some(slot) = &slot {
            if state == PluginState::Active {
                let call = slot.instance.deactivate(&slot.context);
                if let Err(e) = guarded(self.options.hook_timeout, call).await {
                    error!(plugin = %name, error = %e, "Plugin deactivate failed");
                }
            }
            if let Err(e) = guarded_sync(|| slot.instance.cleanup()) {
                error!(plugin = %name, error = %e, "Plugin cleanup failed");
            }
            if let Some(middleware) = &slot.middleware {
                self.pipeline.unregister(middleware);
            }
            slot.context.withdraw_services();
        }

        {
            let mut table = self.table.write();
            for descriptor in table.descriptors.iter_mut() {
                descriptor.dependents_mut().remove(name);
            }
        }
        self.transition(name, PluginState::Unloaded);
        drop(slot);

        info!(plugin = %name, "Plugin unloaded");
        self.notify(lifecycle::UNLOADED, name, PluginState::Unloaded)
            .await;
        true
    }

    // ─── Reports ─────────────────────────────────────────────────────────────

    fn start_report(&self) -> StartReport {
        let table = self.table.read();
        let resolution = &table.resolution;
        StartReport {
            order: resolution.order.clone(),
            active: resolution
                .order
                .iter()
                .filter(|n| table.state(n) == Some(PluginState::Active))
                .cloned()
                .collect(),
            failed: table
                .descriptors
                .iter()
                .filter(|d| d.state() == PluginState::Error)
                .map(summarize)
                .collect(),
            warnings: resolution.warnings.clone(),
            discovery_errors: table.discovery_errors.clone(),
            state_counts: table.descriptors.iter().fold(BTreeMap::new(), |mut counts, d| {
                *counts.entry(d.state().to_string()).or_insert(0) += 1;
                counts
            }),
        }
    }
}

fn summarize(descriptor: &PluginDescriptor) -> PluginSummary {
    PluginSummary {
        name: descriptor.name().to_string(),
        state: descriptor.state(),
        error: descriptor.error().map(str::to_string),
    }
}

// =============================================================================
// LifecycleController
// =============================================================================

/// Discovers, orders and drives plugins through their lifecycle.
///
/// Cheap to clone; clones share the same plugin table.
#[derive(Clone)]
pub struct LifecycleController {
    inner: Arc<Inner>,
}

impl LifecycleController {
    /// Returns a builder with no discovery sources and default options.
    pub fn builder() -> LifecycleControllerBuilder {
        LifecycleControllerBuilder::default()
    }

    // ─── Lifecycle operations ────────────────────────────────────────────────

    /// Discovers plugins and drives every one of them towards the active
    /// state.
    ///
    /// Only a dependency cycle fails the call; in that case no plugin leaves
    /// the discovered state.  Every other problem is recorded per plugin and
    /// summarised in the returned [`StartReport`].
    pub async fn start(&self) -> ControllerResult<StartReport> {
        let _serial = self.inner.ops.lock().await;
        let inner = &self.inner;

        let discovery = inner.registry.discover();
        info!(
            plugins = discovery.descriptors.len(),
            errors = discovery.errors.len(),
            "Plugin discovery complete"
        );
        {
            let mut table = inner.table.write();
            for descriptor in discovery.descriptors {
                if table.get(descriptor.name()).is_none() {
                    table.descriptors.push(descriptor);
                }
            }
            table.discovery_errors = discovery.errors;
        }

        if let Err(e) = inner.resolve() {
            error!(error = %e, "Dependency resolution failed; no plugin was started");
            return Err(e.into());
        }

        inner
            .run_passes(None)
            .instrument(info_span!("lifecycle_pass", trigger = "start"))
            .await;

        let report = inner.start_report();
        info!(
            active = report.active.len(),
            failed = report.failed.len(),
            "Plugin startup complete"
        );
        Ok(report)
    }

    /// Unloads `name`, first unloading everything that depends on it.
    ///
    /// Returns the plugins that were actually torn down, in teardown order.
    pub async fn unload(&self, name: &str) -> ControllerResult<Vec<String>> {
        let _serial = self.inner.ops.lock().await;
        self.inner
            .unload_cascade(name)
            .instrument(info_span!("unload", plugin = %name))
            .await
    }

    /// Unloads `name`, rediscovers, and starts it again.
    ///
    /// Dependents torn down by the cascade are restored too, along with any
    /// newly discovered plugin ordered after `name`.  Returns `true` if
    /// `name` ends up active.
    pub async fn reload(&self, name: &str) -> ControllerResult<bool> {
        let _serial = self.inner.ops.lock().await;
        let inner = &self.inner;
        let span = info_span!("reload", plugin = %name);

        let unloaded: HashSet<String> = inner
            .unload_cascade(name)
            .instrument(span.clone())
            .await?
            .into_iter()
            .collect();

        let discovery = inner.registry.discover();
        {
            let mut table = inner.table.write();
            for fresh in discovery.descriptors {
                match table.position(fresh.name()) {
                    Some(i) => {
                        let current = &table.descriptors[i];
                        let refresh = current.state() == PluginState::Unloaded
                            && (current.name() == name || unloaded.contains(current.name()));
                        if refresh {
                            table.descriptors[i] = fresh;
                        }
                    }
                    None => table.descriptors.push(fresh),
                }
            }
            table.discovery_errors = discovery.errors;
        }

        let resolution = inner.resolve()?;
        let mut scope: HashSet<String> = HashSet::from([name.to_string()]);
        if let Some(pos) = resolution.order.iter().position(|n| n == name) {
            let table = inner.table.read();
            scope.extend(
                resolution.order[pos..]
                    .iter()
                    .filter(|n| table.state(n) == Some(PluginState::Discovered))
                    .cloned(),
            );
        }

        inner
            .run_passes(Some(&scope))
            .instrument(info_span!(parent: &span, "lifecycle_pass", trigger = "reload"))
            .await;

        let active = inner.state_of(name) == Some(PluginState::Active);
        if active {
            info!(plugin = %name, "Plugin reloaded");
        } else {
            warn!(plugin = %name, "Plugin did not become active after reload");
        }
        Ok(active)
    }

    /// Unloads every plugin in reverse load order.
    pub async fn shutdown_all(&self) -> Vec<String> {
        let _serial = self.inner.ops.lock().await;
        let order = self.inner.table.read().unload_order(None);
        let mut unloaded = Vec::new();
        for name in order {
            if self.inner.unload_one(&name).await {
                unloaded.push(name);
            }
        }
        info!(count = unloaded.len(), "All plugins unloaded");
        unloaded
    }

    /// Re-runs the configuration check of one loaded plugin, or of every
    /// loaded plugin when `name` is `None`.
    pub fn validate(&self, name: Option<&str>) -> ControllerResult<Vec<ValidationOutcome>> {
        let targets: Vec<Armed> = {
            let table = self.inner.table.read();
            match name {
                Some(name) => {
                    if table.get(name).is_none() {
                        return Err(ControllerError::unknown(name));
                    }
                    let slot = table
                        .live
                        .get(name)
                        .ok_or_else(|| ControllerError::NotLoaded(name.to_string()))?;
                    vec![(
                        name.to_string(),
                        Arc::clone(&slot.instance),
                        Arc::clone(&slot.context),
                    )]
                }
                None => table
                    .descriptors
                    .iter()
                    .filter_map(|d| {
                        let slot = table.live.get(d.name())?;
                        Some((
                            d.name().to_string(),
                            Arc::clone(&slot.instance),
                            Arc::clone(&slot.context),
                        ))
                    })
                    .collect(),
            }
        };

        Ok(targets
            .into_iter()
            .map(|(name, instance, context)| {
                match guarded_sync(|| instance.validate_config(&context)) {
                    Ok(valid) => ValidationOutcome {
                        name,
                        valid,
                        reason: None,
                    },
                    Err(e) => ValidationOutcome {
                        name,
                        valid: false,
                        reason: Some(e.to_string()),
                    },
                }
            })
            .collect())
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    /// Every known plugin, in discovery order.
    pub fn plugins(&self) -> Vec<PluginSummary> {
        self.inner.table.read().descriptors.iter().map(summarize).collect()
    }

    /// Current state of `name`.
    pub fn state(&self, name: &str) -> Option<PluginState> {
        self.inner.state_of(name)
    }

    /// Live instance of `name`, if loaded.
    pub fn plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.inner.instance(name)
    }

    /// Snapshot of the descriptor for `name`.
    pub fn descriptor(&self, name: &str) -> Option<PluginDescriptor> {
        self.inner.table.read().get(name).cloned()
    }

    /// The most recently resolved load order.
    pub fn load_order(&self) -> Vec<String> {
        self.inner.table.read().resolution.order.clone()
    }

    /// Manifests rejected by the most recent discovery.
    pub fn discovery_errors(&self) -> Vec<DiscoveryError> {
        self.inner.table.read().discovery_errors.clone()
    }

    /// Detailed view of `name`.
    ///
    /// The instance's `describe` runs after the plugin table is released, so
    /// it may query the controller through its context.
    pub fn info(&self, name: &str) -> Option<PluginInfo> {
        let (mut info, instance) = {
            let table = self.inner.table.read();
            let descriptor = table.get(name)?;
            let slot = table.live.get(name);
            (
                Self::info_row(descriptor, slot),
                slot.map(|s| Arc::clone(&s.instance)),
            )
        };
        if let Some(instance) = instance {
            info.details = instance.describe();
        }
        Some(info)
    }

    fn info_row(descriptor: &PluginDescriptor, slot: Option<&LiveSlot>) -> PluginInfo {
        PluginInfo {
            name: descriptor.name().to_string(),
            version: descriptor.metadata().version.to_string(),
            description: descriptor.metadata().description.to_string(),
            priority: descriptor.priority(),
            state: descriptor.state(),
            error: descriptor.error().map(str::to_string),
            dependencies: descriptor.dependencies().iter().cloned().collect(),
            dependents: descriptor.dependents().iter().cloned().collect(),
            warnings: descriptor.warnings().to_vec(),
            middleware: slot.and_then(|s| s.middleware.clone()),
            services: slot.map(|s| s.context.provided_services()).unwrap_or_default(),
            details: Value::Null,
        }
    }

    /// Dependency view of `name`.
    pub fn dependencies(&self, name: &str) -> Option<DependencyInfo> {
        let table = self.inner.table.read();
        let descriptor = table.get(name)?;
        Some(DependencyInfo {
            name: descriptor.name().to_string(),
            dependencies: descriptor
                .dependencies()
                .iter()
                .map(|dep| DependencyStatus {
                    name: dep.clone(),
                    state: table.state(dep),
                })
                .collect(),
            dependents: descriptor.dependents().iter().cloned().collect(),
            load_position: table.resolution.order.iter().position(|n| n == name),
        })
    }

    /// The shared service registry.
    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.inner.services
    }

    /// The shared event bus.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.inner.events
    }

    /// The shared middleware pipeline.
    pub fn pipeline(&self) -> &Arc<MiddlewarePipeline> {
        &self.inner.pipeline
    }

    /// Options in effect.
    pub fn options(&self) -> &LifecycleOptions {
        &self.inner.options
    }
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("registry", &self.inner.registry)
            .field("plugins", &self.inner.table.read().descriptors.len())
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`LifecycleController`].
#[derive(Default)]
pub struct LifecycleControllerBuilder {
    registry: PluginRegistry,
    services: Option<Arc<ServiceRegistry>>,
    events: Option<Arc<EventBus>>,
    pipeline: Option<Arc<MiddlewarePipeline>>,
    plugin_configs: HashMap<String, Value>,
    options: LifecycleOptions,
}

impl LifecycleControllerBuilder {
    /// Adds a discovery source.
    pub fn source(mut self, source: impl DiscoverySource + 'static) -> Self {
        self.registry.add_source(source);
        self
    }

    /// Replaces the registry (and all sources added so far).
    pub fn registry(mut self, registry: PluginRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Shares an existing service registry.
    pub fn services(mut self, services: Arc<ServiceRegistry>) -> Self {
        self.services = Some(services);
        self
    }

    /// Shares an existing event bus.
    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Shares an existing middleware pipeline.
    pub fn pipeline(mut self, pipeline: Arc<MiddlewarePipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Sets the configuration section handed to plugin `name`.
    pub fn plugin_config(mut self, name: impl Into<String>, config: Value) -> Self {
        self.plugin_configs.insert(name.into(), config);
        self
    }

    /// Sets every plugin configuration section at once.
    pub fn plugin_configs(mut self, configs: HashMap<String, Value>) -> Self {
        self.plugin_configs = configs;
        self
    }

    /// Sets the per-hook deadline; `None` disables it.
    pub fn hook_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options.hook_timeout = timeout;
        self
    }

    /// Enables or disables concurrent hooks within a layer.
    pub fn parallel_passes(mut self, parallel: bool) -> Self {
        self.options.parallel_passes = parallel;
        self
    }

    /// Replaces all lifecycle options.
    pub fn options(mut self, options: LifecycleOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the controller.  Nothing is discovered until
    /// [`LifecycleController::start`].
    pub fn build(self) -> LifecycleController {
        let inner = Arc::new_cyclic(|me| Inner {
            me: me.clone(),
            registry: self.registry,
            resolver: DependencyResolver::new(),
            services: self.services.unwrap_or_default(),
            events: self.events.unwrap_or_default(),
            pipeline: self.pipeline.unwrap_or_default(),
            plugin_configs: self.plugin_configs,
            options: self.options,
            table: RwLock::new(PluginTable::default()),
            ops: AsyncMutex::new(()),
        });
        LifecycleController { inner }
    }
}

#[cfg(test)]
mod tests;
