//! # Conduit Framework
//!
//! Plugin lifecycle orchestration and the middleware pipeline.
//!
//! This layer provides:
//! - The [`Plugin`] trait and the [`PluginContext`] handle given to its hooks
//! - Discovery through [`PluginRegistry`], with static and link-time sources
//! - Dependency ordering with cycle detection ([`DependencyResolver`])
//! - The [`LifecycleController`] driving plugins through their states
//! - The phased [`MiddlewarePipeline`], also usable as a `tower::Service`
//!
//! Shared foundations (errors, events, services, pipeline context) live in
//! `conduit-core` and are re-exported here where plugin authors need them.

pub mod controller;
pub mod error;
pub mod pipeline;
pub mod plugin;
pub mod resolver;

pub use controller::{
    DependencyInfo, DependencyStatus, LifecycleController, LifecycleControllerBuilder,
    LifecycleOptions, PluginInfo, PluginSummary, StartReport, ValidationOutcome,
};
pub use error::{ControllerError, ControllerResult};
pub use pipeline::{Middleware, MiddlewarePipeline, PipelineService};
pub use plugin::{
    CONDUIT_PLUGIN_API_VERSION, Discovery, DiscoverySource, LinkedSource, Plugin, PluginContext,
    PluginDescriptor, PluginEntry, PluginManifest, PluginMetadata, PluginRegistry, PluginState,
    StaticSource,
};
pub use resolver::{DependencyResolver, Resolution};

#[doc(hidden)]
pub use conduit_core as __core;
#[doc(hidden)]
pub use linkme as __linkme;
