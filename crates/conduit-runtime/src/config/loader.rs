//! Configuration loader using figment.
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: enables TOML files (`conduit.toml`, `config.toml`)
//! - `yaml-config`: enables YAML files (`conduit.yaml`, `conduit.yml`, ...)
//!
//! Both can be enabled at once; both formats are then searched.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Profile-specific config file (`conduit.{profile}.toml` / `.yaml`)
//! 3. Main config file (`conduit.toml` / `conduit.yaml`)
//! 4. Environment variables (`CONDUIT_*`)
//! 5. Programmatic overrides passed to [`ConfigLoader::merge`]
//!
//! # Environment Variable Mapping
//!
//! Variables use the `CONDUIT_` prefix with `__` as the nesting separator:
//!
//! - `CONDUIT_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `CONDUIT_LIFECYCLE__HOOK_TIMEOUT_MS=5000` → `lifecycle.hook_timeout_ms = 5000`
//! - `CONDUIT_PLUGINS__CHROMA__HOST=db` → `plugins.chroma.host = "db"`
//!
//! # Example
//!
//! ```rust,ignore
//! use conduit_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("./deploy/conduit.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::ConduitConfig;

/// Environment variable prefix.
const ENV_PREFIX: &str = "CONDUIT_";

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    /// Development profile (default).
    #[default]
    Development,
    /// Production profile.
    Production,
    /// Custom profile name.
    Custom(String),
}

impl Profile {
    /// Returns the profile name as a string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name, accepting the usual short forms.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `CONDUIT_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var("CONDUIT_PROFILE")
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    /// Programmatic overrides.
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    /// Specific config file to load (overrides search).
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a new configuration loader with defaults.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Profile::parse(&profile.into());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds current directory to search paths.
    pub fn with_current_dir(self) -> Self {
        if let Ok(cwd) = std::env::current_dir() {
            self.search_path(cwd)
        } else {
            self
        }
    }

    /// Adds user config directory to search paths.
    pub fn with_user_config_dir(self) -> Self {
        if let Some(config_dir) = dirs::config_dir() {
            self.search_path(config_dir.join("conduit"))
        } else {
            self
        }
    }

    /// Sets a specific configuration file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges additional configuration programmatically.  Overrides win
    /// over files and environment variables.
    pub fn merge(mut self, config: ConduitConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads and returns the configuration.
    pub fn load(self) -> ConfigResult<ConduitConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: ConduitConfig = figment.extract()?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            plugins = config.plugins.len(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Builds the figment instance with all sources.
    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(ConduitConfig::default()));
        let overrides = std::mem::take(&mut self.figment);

        if let Some(path) = self.config_file.take() {
            if path.exists() {
                info!(path = %path.display(), "Loading configuration file");
                figment = Self::merge_config_file(figment, &path)?;
            } else {
                return Err(ConfigError::FileNotFound(path));
            }
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!("Loading environment variables with {ENV_PREFIX} prefix");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        Ok(figment.merge(overrides))
    }

    /// Merges a single config file into the figment, dispatching on file extension.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
        }
    }

    /// Resolves the effective list of search paths.
    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if self.search_paths.is_empty() {
            let mut paths = Vec::new();
            if let Ok(cwd) = std::env::current_dir() {
                paths.push(cwd);
            }
            if let Some(config_dir) = dirs::config_dir() {
                paths.push(config_dir.join("conduit"));
            }
            paths
        } else {
            self.search_paths.clone()
        }
    }

    /// Searches one file format.
    ///
    /// For each `search_paths × base_names` pair a profile-specific variant
    /// is merged first, then the base file. Stops at the first base file
    /// found.
    #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
    fn load_format_files<F>(
        &self,
        mut figment: Figment,
        search_paths: &[PathBuf],
        base_names: &[&str],
        merge_fn: F,
    ) -> (Figment, bool)
    where
        F: Fn(Figment, &Path) -> Figment,
    {
        for search_path in search_paths {
            for base_name in base_names {
                let Some((stem, ext)) = base_name.rsplit_once('.') else {
                    continue;
                };

                // e.g. conduit.production.toml
                let profile_path =
                    search_path.join(format!("{stem}.{}.{ext}", self.profile.as_str()));
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile-specific config");
                    figment = merge_fn(figment, &profile_path);
                }

                let base_path = search_path.join(base_name);
                if base_path.exists() {
                    info!(path = %base_path.display(), "Loading configuration file");
                    figment = merge_fn(figment, &base_path);
                    return (figment, true);
                }
            }
        }
        (figment, false)
    }

    /// Searches for and loads configuration files from search paths.
    #[allow(unused_mut)]
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        let search_paths = self.resolve_search_paths();
        let mut found = false;

        #[cfg(feature = "toml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["conduit.toml", "config.toml"],
                |fig, path| fig.merge(Toml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        #[cfg(feature = "yaml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["conduit.yaml", "conduit.yml", "config.yaml", "config.yml"],
                |fig, path| fig.merge(Yaml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        if !found {
            warn!(
                paths = ?search_paths,
                "No configuration file found, using defaults"
            );
        }
        figment
    }
}

/// Loads configuration from the default search paths and environment.
pub fn load_config() -> ConfigResult<ConduitConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from `path`, with environment overrides.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<ConduitConfig> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;
    use crate::config::{LogLevel, LogOutput, validate_config};

    fn load_in(jail: &Jail) -> figment::error::Result<ConduitConfig> {
        ConfigLoader::new()
            .search_path(jail.directory())
            .load()
            .map_err(|e| e.to_string().into())
    }

    #[test]
    fn test_default_config() {
        Jail::expect_with(|jail| {
            let config = load_in(jail)?;
            assert_eq!(config.logging.level.as_str(), "info");
            assert_eq!(config.lifecycle.hook_timeout_ms, Some(30_000));
            Ok(())
        });
    }

    #[test]
    fn test_file_and_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "conduit.toml",
                r#"
                [logging]
                level = "debug"
                output = "silent"

                [lifecycle]
                hook_timeout_ms = 1000

                [plugins.chroma]
                host = "localhost"
                port = 8000
                "#,
            )?;
            jail.set_env("CONDUIT_LIFECYCLE__HOOK_TIMEOUT_MS", "500");
            jail.set_env("CONDUIT_PLUGINS__CHROMA__HOST", "db.internal");

            let config = load_in(jail)?;
            assert_eq!(config.logging.level, LogLevel::Debug);
            assert_eq!(config.logging.output, LogOutput::Silent);
            assert_eq!(config.lifecycle.hook_timeout_ms, Some(500));
            assert_eq!(config.plugins["chroma"]["host"], "db.internal");
            assert_eq!(config.plugins["chroma"]["port"], 8000);
            Ok(())
        });
    }

    #[test]
    fn test_programmatic_overrides_win() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "conduit.toml",
                r#"
                [logging]
                level = "debug"
                "#,
            )?;
            jail.set_env("CONDUIT_LOGGING__LEVEL", "error");

            let mut overrides = ConduitConfig::default();
            overrides.logging.level = LogLevel::Warn;
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .merge(overrides)
                .load()
                .map_err(|e| e.to_string())?;
            assert_eq!(config.logging.level, LogLevel::Warn);
            Ok(())
        });
    }

    #[test]
    fn test_zero_hook_timeout_disables_deadline() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "conduit.toml",
                r#"
                [lifecycle]
                parallel_passes = false
                "#,
            )?;
            let config = load_in(jail)?;
            assert_eq!(config.lifecycle.hook_timeout_ms, Some(30_000));

            jail.create_file(
                "conduit.toml",
                r#"
                [lifecycle]
                hook_timeout_ms = 0

                [pipeline]
                middleware_timeout_ms = 0
                "#,
            )?;
            let config = load_in(jail)?;
            assert!(validate_config(&config).is_ok());
            assert!(config.lifecycle.to_options().hook_timeout.is_none());
            assert!(config.pipeline.call_timeout().is_none());
            Ok(())
        });
    }

    #[test]
    fn test_profile_file_is_overridden_by_base() {
        Jail::expect_with(|jail| {
            jail.set_env("CONDUIT_PROFILE", "prod");
            jail.create_file(
                "conduit.production.toml",
                r#"
                [lifecycle]
                parallel_passes = false

                [pipeline]
                middleware_timeout_ms = 200
                "#,
            )?;
            jail.create_file(
                "conduit.toml",
                r#"
                [pipeline]
                middleware_timeout_ms = 100
                "#,
            )?;

            let config = load_in(jail)?;
            assert!(!config.lifecycle.parallel_passes);
            assert_eq!(config.pipeline.middleware_timeout_ms, Some(100));
            Ok(())
        });
    }

    #[test]
    fn test_profile_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env("CONDUIT_PROFILE", "production");
            assert_eq!(Profile::from_env(), Profile::Production);
            jail.set_env("CONDUIT_PROFILE", "staging");
            assert_eq!(Profile::from_env(), Profile::Custom("staging".into()));
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        Jail::expect_with(|jail| {
            let result = ConfigLoader::new()
                .without_env()
                .file(jail.directory().join("absent.toml"))
                .load();
            assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
            Ok(())
        });
    }

    #[test]
    fn test_unsupported_extension() {
        Jail::expect_with(|jail| {
            jail.create_file("conduit.ini", "level = debug")?;
            let result = ConfigLoader::new()
                .without_env()
                .file(jail.directory().join("conduit.ini"))
                .load();
            assert!(matches!(result, Err(ConfigError::UnsupportedFormat(ext)) if ext == "ini"));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_value_is_parse_error() {
        Jail::expect_with(|jail| {
            jail.create_file("conduit.toml", "[logging]\nlevel = \"loud\"\n")?;
            let result = ConfigLoader::new()
                .without_env()
                .search_path(jail.directory())
                .load();
            assert!(matches!(result, Err(ConfigError::ParseError(_))));
            Ok(())
        });
    }
}
