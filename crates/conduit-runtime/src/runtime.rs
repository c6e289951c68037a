//! Runtime orchestration.
//!
//! [`ConduitRuntime`] ties configuration, logging, the lifecycle controller
//! and the middleware pipeline together.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use conduit_runtime::ConduitRuntime;
//!
//! // Loads conduit.toml from the current directory and discovers every
//! // plugin registered with `register_plugin!`.
//! let runtime = ConduitRuntime::builder().linked_plugins().build()?;
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::signal;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use conduit_core::Context;
use conduit_framework::{
    DiscoverySource, LifecycleController, LinkedSource, MiddlewarePipeline, PipelineService,
    PluginRegistry, StartReport,
};

use crate::commands::{CommandOutput, PluginCommand};
use crate::config::{ConduitConfig, ConfigLoader, ConfigResult, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// The Conduit runtime: owns the controller and its pipeline.
///
/// ```rust,ignore
/// let runtime = ConduitRuntime::builder()
///     .config_file("deploy/conduit.toml")
///     .profile("production")
///     .linked_plugins()
///     .build()?;
///
/// runtime.start().await?;
/// let out = runtime.process("index", json!({"path": "notes.md"}), Map::new()).await?;
/// runtime.stop().await?;
/// ```
pub struct ConduitRuntime {
    config: ConduitConfig,
    controller: LifecycleController,
    running: RwLock<bool>,
}

impl ConduitRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already loaded configuration.
    ///
    /// Installs the configured logging subscriber (unless one is already
    /// installed) and builds a controller over `registry`. Nothing is
    /// discovered until [`start`](Self::start).
    pub fn from_config(config: &ConduitConfig, registry: PluginRegistry) -> Self {
        logging::init_from_config(&config.logging);

        let pipeline = match config.pipeline.call_timeout() {
            Some(timeout) => MiddlewarePipeline::with_call_timeout(timeout),
            None => MiddlewarePipeline::new(),
        };
        let controller = LifecycleController::builder()
            .registry(registry)
            .pipeline(Arc::new(pipeline))
            .plugin_configs(config.plugins.clone())
            .options(config.lifecycle.to_options())
            .build();

        info!(
            log_level = %config.logging.level,
            log_output = ?config.logging.output,
            parallel_passes = config.lifecycle.parallel_passes,
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            controller,
            running: RwLock::new(false),
        }
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &ConduitConfig {
        &self.config
    }

    /// Returns the lifecycle controller.
    pub fn controller(&self) -> &LifecycleController {
        &self.controller
    }

    /// Returns the middleware pipeline shared with plugins.
    pub fn pipeline(&self) -> &Arc<MiddlewarePipeline> {
        self.controller.pipeline()
    }

    /// Returns a `tower::Service` over the pipeline.
    pub fn service(&self) -> PipelineService {
        PipelineService::new(Arc::clone(self.pipeline()))
    }

    /// Returns whether plugins have been started and not yet stopped.
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Discovers and starts every plugin.
    pub async fn start(&self) -> RuntimeResult<StartReport> {
        let mut running = self.running.write().await;
        if *running {
            warn!("Runtime is already running");
            return Err(RuntimeError::AlreadyRunning);
        }

        info!("Starting Conduit runtime");
        let report = self.controller.start().await?;
        *running = true;

        for failed in &report.failed {
            warn!(
                plugin = %failed.name,
                error = failed.error.as_deref().unwrap_or("unknown"),
                "Plugin failed to start"
            );
        }
        for warning in &report.warnings {
            warn!(%warning, "Missing plugin dependency");
        }
        info!(
            active = report.active.len(),
            failed = report.failed.len(),
            "Runtime started"
        );
        Ok(report)
    }

    /// Runs a pipeline invocation and returns the resulting data.
    pub async fn process(
        &self,
        operation: impl Into<String>,
        data: Value,
        metadata: Map<String, Value>,
    ) -> RuntimeResult<Value> {
        Ok(self.pipeline().process(operation, data, metadata).await?)
    }

    /// Runs `ctx` through the pipeline.
    pub async fn execute(&self, ctx: Context) -> RuntimeResult<Context> {
        Ok(self.pipeline().execute(ctx).await?)
    }

    /// Runs a management command against the controller.
    pub async fn command(&self, command: &PluginCommand) -> CommandOutput {
        command.execute(&self.controller).await
    }

    /// Unloads every plugin in reverse load order.
    ///
    /// Returns the plugins that were torn down.
    pub async fn stop(&self) -> RuntimeResult<Vec<String>> {
        let mut running = self.running.write().await;
        if !*running {
            warn!("Runtime is not running");
            return Ok(Vec::new());
        }

        info!("Stopping Conduit runtime");
        let unloaded = self.controller.shutdown_all().await;
        *running = false;

        info!(unloaded = unloaded.len(), "Runtime stopped");
        Ok(unloaded)
    }

    /// Runs the runtime until a shutdown signal is received.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await?;

        info!("Conduit runtime is now running. Press Ctrl+C to stop.");
        wait_for_shutdown().await;

        self.stop().await?;
        Ok(())
    }

    /// Runs the runtime until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await?;
        Ok(())
    }
}

impl std::fmt::Debug for ConduitRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConduitRuntime")
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

/// Waits for Ctrl+C, or SIGTERM on unix.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
                return;
            }
            Err(e) => {
                error!(error = %e, "Failed to register SIGTERM handler, waiting for Ctrl+C only");
            }
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a [`ConduitRuntime`].
///
/// Plugins come from the discovery sources added here; call
/// [`linked_plugins`](Self::linked_plugins) to include everything registered
/// with `register_plugin!`.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    registry: PluginRegistry,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder searching the current directory.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            registry: PluginRegistry::new(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Enables loading environment variables (enabled by default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically, over files and env.
    pub fn merge(mut self, config: ConduitConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Adds a plugin discovery source.
    pub fn source(mut self, source: impl DiscoverySource + 'static) -> Self {
        self.registry.add_source(source);
        self
    }

    /// Adds the link-time plugin registry.
    pub fn linked_plugins(self) -> Self {
        self.source(LinkedSource)
    }

    /// Loads and validates configuration, then builds the runtime.
    pub fn build(self) -> ConfigResult<ConduitRuntime> {
        let config = self.config_loader.load()?;
        validate_config(&config)?;
        Ok(ConduitRuntime::from_config(&config, self.registry))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
