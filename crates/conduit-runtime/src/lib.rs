//! Conduit Runtime - Orchestration layer for the Conduit plugin orchestrator.
//!
//! This crate provides:
//! - Layered configuration (`ConduitConfig`, `ConfigLoader`)
//! - Logging setup driven by that configuration
//! - Runtime orchestration (`ConduitRuntime`): start, process, stop
//! - Operator commands (`PluginCommand`) for listing, inspecting, reloading,
//!   unloading and validating plugins
//!
//! ```ignore
//! use conduit_runtime::ConduitRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = ConduitRuntime::builder().linked_plugins().build()?;
//!
//!     // Start plugins, run until Ctrl+C, then unload everything
//!     runtime.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use commands::{CommandOutput, PluginCommand};
pub use config::{
    ConduitConfig, ConfigError, ConfigLoader, ConfigResult, LifecycleConfig, LoggingConfig,
    PipelineConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{ConduitRuntime, RuntimeBuilder};

// Re-export tracing for use by plugin crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
