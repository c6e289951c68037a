//! Configuration module for the Conduit runtime.
//!
//! Configuration is layered with `figment` (defaults, files, `CONDUIT_*`
//! environment variables, programmatic overrides) and validated before the
//! runtime is built.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    ConduitConfig, LifecycleConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    PipelineConfig, SpanEventConfig,
};
pub use validation::validate_config;
