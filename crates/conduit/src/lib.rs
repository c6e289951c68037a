//! # Conduit
//!
//! A plugin lifecycle orchestrator with a phased middleware pipeline.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────┐     ┌──────────────────────────────────┐
//! │  Discovery   │────▶│   Resolver    │────▶│ Lifecycle passes                 │
//! │ (sources)    │     │ (topo order)  │     │ load ─▶ initialize ─▶ activate   │
//! └──────────────┘     └───────────────┘     └────────────────┬─────────────────┘
//!                                                             │ middleware plugins
//!                                                             ▼
//!            Context ──▶ PRE_PROCESS ──▶ PROCESS ──▶ POST_PROCESS ──▶ result
//!                              └──── failure ──▶ ON_ERROR ──▶ CLEANUP
//! ```
//!
//! - **Plugins** declare dependencies and a priority; the controller orders
//!   them, isolates their failures, and unloads dependents before their
//!   dependencies.
//! - **Middleware** (usually provided by plugins) transforms a [`Context`]
//!   through ordered phases.
//! - **Services** and **events** are shared between plugins through the
//!   context each plugin receives.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use conduit::prelude::*;
//!
//! #[derive(Default)]
//! struct Audit;
//!
//! #[async_trait]
//! impl Plugin for Audit {
//!     async fn init(&self, ctx: &PluginContext) -> Result<(), BoxError> {
//!         info!(plugin = ctx.name(), "ready");
//!         Ok(())
//!     }
//! }
//!
//! register_plugin! {
//!     AUDIT = { name: "audit", plugin: Audit, depends_on: ["config"] }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     ConduitRuntime::builder().linked_plugins().build()?.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use conduit_core as core;
pub use conduit_framework as framework;
pub use conduit_runtime as runtime;

pub use conduit_core::Context;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use conduit::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use conduit_runtime::{ConduitConfig, ConduitRuntime, PluginCommand};

    // Plugin authoring
    pub use async_trait::async_trait;
    pub use conduit_framework::register_plugin;
    pub use conduit_framework::{
        Middleware, Plugin, PluginContext, PluginManifest, PluginState, StaticSource,
    };

    // Shared foundations
    pub use conduit_core::{
        BoxError, Context, Event, EventBus, MiddlewareFailure, Phase, ServiceRegistry,
    };

    // Logging macros
    pub use conduit_runtime::prelude::*;
}
