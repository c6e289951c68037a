//! Pipeline phases and the per-invocation [`Context`].
//!
//! A `Context` is created by the pipeline for a single invocation and moved
//! through each middleware call in turn.  Middleware receive it by value and
//! hand back the (possibly updated) context, so no middleware can hold on to
//! it past its own call.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One stage of middleware execution.
///
/// `PreProcess → Process → PostProcess` is the normal flow; `OnError` and
/// `Cleanup` are the exceptional and terminal phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Runs before main processing.
    PreProcess,
    /// Main processing.
    Process,
    /// Runs after successful processing.
    PostProcess,
    /// Runs when a processing phase failed.
    OnError,
    /// Always runs last, success or failure.
    Cleanup,
}

impl Phase {
    /// All phases, in execution order.
    pub const ALL: [Phase; 5] = [
        Phase::PreProcess,
        Phase::Process,
        Phase::PostProcess,
        Phase::OnError,
        Phase::Cleanup,
    ];

    /// Returns the phase name as used in logs and configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreProcess => "pre_process",
            Self::Process => "process",
            Self::PostProcess => "post_process",
            Self::OnError => "on_error",
            Self::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The value moved through a pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// The payload being processed.
    pub data: Value,
    /// Free-form metadata shared between middleware.
    pub metadata: Map<String, Value>,
    /// The phase currently executing.
    pub phase: Phase,
    /// Name of the operation being processed.
    pub operation: String,
    /// File the operation concerns, if any.
    pub file_path: Option<PathBuf>,
}

impl Context {
    /// Creates a context for `operation` carrying `data`.
    pub fn new(operation: impl Into<String>, data: Value) -> Self {
        Self {
            data,
            metadata: Map::new(),
            phase: Phase::PreProcess,
            operation: operation.into(),
            file_path: None,
        }
    }

    /// Attaches a file path (builder style).
    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Replaces the metadata map (builder style).
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Inserts a single metadata entry, returning the previous value.
    pub fn insert_meta(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.metadata.insert(key.into(), value.into())
    }

    /// Looks up a metadata entry.
    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_phase_order_and_names() {
        assert!(Phase::PreProcess < Phase::Process);
        assert!(Phase::Process < Phase::PostProcess);
        assert_eq!(Phase::OnError.to_string(), "on_error");
        assert_eq!(
            serde_json::to_value(Phase::PostProcess).ok(),
            Some(json!("post_process"))
        );
    }

    #[test]
    fn test_context_builder() {
        let mut ctx = Context::new("split", json!({"title": "x"})).with_file_path("/tmp/a.json");
        assert_eq!(ctx.phase, Phase::PreProcess);
        assert_eq!(ctx.insert_meta("count", 3), None);
        assert_eq!(ctx.meta("count"), Some(&json!(3)));
        assert_eq!(ctx.file_path.as_deref(), Some(std::path::Path::new("/tmp/a.json")));
    }
}
