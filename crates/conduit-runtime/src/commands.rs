//! Operator commands against a running controller.
//!
//! Each [`PluginCommand`] maps to one management operation and yields a
//! [`CommandOutput`]: an exit code plus a JSON report. Argument parsing and
//! rendering are left to the host.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use conduit_framework::LifecycleController;

/// Exit code for a successful command.
pub const EXIT_OK: i32 = 0;
/// Exit code for a failed command.
pub const EXIT_FAILURE: i32 = 1;

/// A plugin management command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum PluginCommand {
    /// Name, state and error of every known plugin.
    List,
    /// Descriptor and instance details of one plugin.
    Info { name: String },
    /// Unload and start one plugin again; fails unless it ends up active.
    Reload { name: String },
    /// Unload one plugin and everything depending on it.
    Unload { name: String },
    /// Dependencies, dependents and load position of one plugin.
    Dependencies { name: String },
    /// Re-run the configuration check of one or all loaded plugins.
    Validate { name: Option<String> },
}

/// Result of a [`PluginCommand`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub report: Value,
}

impl CommandOutput {
    fn ok(report: Value) -> Self {
        Self {
            exit_code: EXIT_OK,
            report,
        }
    }

    fn failure(report: Value) -> Self {
        Self {
            exit_code: EXIT_FAILURE,
            report,
        }
    }

    fn error(message: impl std::fmt::Display) -> Self {
        Self::failure(json!({ "error": message.to_string() }))
    }

    /// Returns `true` if the command succeeded.
    pub fn is_success(&self) -> bool {
        self.exit_code == EXIT_OK
    }
}

impl PluginCommand {
    /// Runs the command against `controller`.
    pub async fn execute(&self, controller: &LifecycleController) -> CommandOutput {
        debug!(command = ?self, "Executing plugin command");
        let output = match self {
            Self::List => CommandOutput::ok(to_report(&controller.plugins())),

            Self::Info { name } => match controller.info(name) {
                Some(info) => CommandOutput::ok(to_report(&info)),
                None => CommandOutput::error(format!("unknown plugin '{name}'")),
            },

            Self::Reload { name } => match controller.reload(name).await {
                Ok(active) => {
                    let report = json!({
                        "plugin": name,
                        "state": controller.state(name),
                        "error": controller.descriptor(name).and_then(|d| d.error().map(str::to_string)),
                    });
                    if active {
                        CommandOutput::ok(report)
                    } else {
                        CommandOutput::failure(report)
                    }
                }
                Err(e) => CommandOutput::error(e),
            },

            Self::Unload { name } => match controller.unload(name).await {
                Ok(unloaded) => CommandOutput::ok(json!({
                    "plugin": name,
                    "unloaded": unloaded,
                })),
                Err(e) => CommandOutput::error(e),
            },

            Self::Dependencies { name } => match controller.dependencies(name) {
                Some(deps) => CommandOutput::ok(to_report(&deps)),
                None => CommandOutput::error(format!("unknown plugin '{name}'")),
            },

            Self::Validate { name } => match controller.validate(name.as_deref()) {
                Ok(outcomes) => {
                    let report = to_report(&outcomes);
                    if outcomes.iter().all(|o| o.valid) {
                        CommandOutput::ok(report)
                    } else {
                        CommandOutput::failure(report)
                    }
                }
                Err(e) => CommandOutput::error(e),
            },
        };

        if !output.is_success() {
            warn!(command = ?self, report = %output.report, "Plugin command failed");
        }
        output
    }
}

fn to_report<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| json!({ "error": e.to_string() }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use conduit_core::BoxError;
    use conduit_framework::{Plugin, PluginContext, PluginManifest, PluginState, StaticSource};

    use super::*;

    struct Checked {
        valid: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Plugin for Checked {
        fn validate_config(&self, _ctx: &PluginContext) -> bool {
            self.valid.load(Ordering::SeqCst)
        }

        async fn init(&self, _ctx: &PluginContext) -> Result<(), BoxError> {
            Ok(())
        }
    }

    fn manifest(name: &str, valid: &Arc<AtomicBool>) -> PluginManifest {
        let valid = Arc::clone(valid);
        PluginManifest::new(name, move || {
            Ok(Checked {
                valid: Arc::clone(&valid),
            })
        })
    }

    async fn started(valid: &Arc<AtomicBool>) -> LifecycleController {
        let source = StaticSource::new()
            .with(manifest("config", valid))
            .with(manifest("chroma", valid).depends_on(["config"]));
        let controller = LifecycleController::builder().source(source).build();
        controller.start().await.unwrap();
        controller
    }

    fn flag() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(true))
    }

    #[tokio::test]
    async fn test_list() {
        let controller = started(&flag()).await;
        let output = PluginCommand::List.execute(&controller).await;
        assert!(output.is_success());
        let rows = output.report.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "config");
        assert_eq!(rows[0]["state"], "active");
        assert_eq!(rows[1]["error"], Value::Null);
    }

    #[tokio::test]
    async fn test_info() {
        let controller = started(&flag()).await;
        let output = PluginCommand::Info {
            name: "ghost".into(),
        }
        .execute(&controller)
        .await;
        assert_eq!(output.exit_code, EXIT_FAILURE);
        assert!(output.report["error"].as_str().unwrap().contains("ghost"));

        let output = PluginCommand::Info {
            name: "chroma".into(),
        }
        .execute(&controller)
        .await;
        assert!(output.is_success());
        assert_eq!(output.report["dependencies"], json!(["config"]));
    }

    #[tokio::test]
    async fn test_unload_and_reload() {
        let controller = started(&flag()).await;

        let output = PluginCommand::Unload {
            name: "config".into(),
        }
        .execute(&controller)
        .await;
        assert!(output.is_success());
        assert_eq!(output.report["unloaded"], json!(["chroma", "config"]));

        let output = PluginCommand::Reload {
            name: "config".into(),
        }
        .execute(&controller)
        .await;
        assert!(output.is_success());
        assert_eq!(output.report["state"], "active");
        assert_eq!(controller.state("chroma"), Some(PluginState::Unloaded));
    }

    #[tokio::test]
    async fn test_reload_not_active_fails() {
        let valid = flag();
        let controller = started(&valid).await;
        valid.store(false, Ordering::SeqCst);

        let output = PluginCommand::Reload {
            name: "chroma".into(),
        }
        .execute(&controller)
        .await;
        assert_eq!(output.exit_code, EXIT_FAILURE);
        assert_eq!(output.report["state"], "error");
        assert!(output.report["error"].is_string());
    }

    #[tokio::test]
    async fn test_unload_unknown_plugin_fails() {
        let controller = started(&flag()).await;
        let output = PluginCommand::Unload {
            name: "ghost".into(),
        }
        .execute(&controller)
        .await;
        assert!(!output.is_success());
    }

    #[tokio::test]
    async fn test_dependencies() {
        let controller = started(&flag()).await;
        let output = PluginCommand::Dependencies {
            name: "config".into(),
        }
        .execute(&controller)
        .await;
        assert!(output.is_success());
        assert_eq!(output.report["dependents"], json!(["chroma"]));
        assert_eq!(output.report["load_position"], 0);

        let output = PluginCommand::Dependencies {
            name: "ghost".into(),
        }
        .execute(&controller)
        .await;
        assert!(!output.is_success());
    }

    #[tokio::test]
    async fn test_validate() {
        let valid = flag();
        let controller = started(&valid).await;

        let output = PluginCommand::Validate { name: None }
            .execute(&controller)
            .await;
        assert!(output.is_success());
        assert_eq!(output.report.as_array().unwrap().len(), 2);

        valid.store(false, Ordering::SeqCst);
        let output = PluginCommand::Validate {
            name: Some("chroma".into()),
        }
        .execute(&controller)
        .await;
        assert_eq!(output.exit_code, EXIT_FAILURE);
        assert_eq!(output.report[0]["valid"], false);

        let output = PluginCommand::Validate {
            name: Some("missing".into()),
        }
        .execute(&controller)
        .await;
        assert!(!output.is_success());
    }

    #[test]
    fn test_command_serde() {
        let command: PluginCommand =
            serde_json::from_value(json!({ "command": "reload", "name": "chroma" })).unwrap();
        assert_eq!(
            command,
            PluginCommand::Reload {
                name: "chroma".into()
            }
        );
        let command: PluginCommand =
            serde_json::from_value(json!({ "command": "validate", "name": null })).unwrap();
        assert_eq!(command, PluginCommand::Validate { name: None });
    }
}
