//! # Conduit Core
//!
//! Foundation types shared by every Conduit layer.
//!
//! - **Errors**: the failure taxonomy, scoped from a single hook call up to
//!   the one fatal condition, a dependency cycle ([`error`]).
//! - **Events**: an ordered publish/subscribe bus ([`EventBus`]).
//! - **Services**: a named lookup table for cross-plugin sharing
//!   ([`ServiceRegistry`]).
//! - **Pipeline context**: the value moved through middleware ([`Context`],
//!   [`Phase`]).
//! - **Guarded calls**: deadline and panic isolation for foreign code
//!   ([`guard`]).

pub mod context;
pub mod error;
pub mod event;
pub mod guard;
pub mod service;

pub use context::{Context, Phase};
pub use error::{
    BoxError, CycleError, DiscoveryError, HookError, MiddlewareFailure, MissingDependencyWarning,
    PipelineError, PipelineResult,
};
pub use event::{Event, EventBus, SubscriptionId};
pub use guard::{guarded, guarded_sync};
pub use service::{ServiceArc, ServiceRegistry};
