use crate::cli::error::{CliError, Result};
use crate::core::config::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings stored in `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    /// How the external tool is launched and its output parsed
    #[serde(default)]
    pub runner: Config,

    /// Output formatting preferences
    #[serde(default)]
    pub output: OutputDefaults,
}

/// Output formatting defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDefaults {
    /// Enable colored output by default
    #[serde(default = "default_true")]
    pub color: bool,

    /// Echo the tool's raw output during `run`
    #[serde(default)]
    pub stream_logs: bool,

    /// Print JSON instead of text
    #[serde(default)]
    pub json: bool,
}

impl Default for OutputDefaults {
    fn default() -> Self {
        Self {
            color: default_true(),
            stream_logs: false,
            json: false,
        }
    }
}

impl FileConfig {
    /// Load configuration from file, writing defaults when it does not exist
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            let config = Self::default();
            config.save_to_file(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| CliError::configuration(format!("Failed to parse config file: {}", e)))
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| CliError::configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(crate::cli::ensure_config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load_default() -> Result<Self> {
        Self::load_from_file(Self::default_path()?)
    }

    /// Merge global command-line flags, giving priority to them
    pub fn merge_with_cli_args(mut self, cli_args: &crate::cli::app::Cli) -> Self {
        if cli_args.no_color {
            self.output.color = false;
        }
        self
    }

    /// Apply per-run overrides; flags win over the file
    pub fn with_overrides(mut self, executable: Option<&str>, working_dir: Option<&Path>) -> Self {
        if let Some(executable) = executable {
            self.runner.executable = executable.to_string();
        }
        if let Some(dir) = working_dir {
            self.runner.working_dir = Some(dir.to_path_buf());
        }
        self
    }

    /// Validated runtime configuration
    pub fn into_config(self) -> Result<Config> {
        self.runner.validate()?;
        Ok(self.runner)
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::StepStatus;
    use tempfile::tempdir;

    #[test]
    fn test_config_default() {
        let config = FileConfig::default();
        assert_eq!(config.runner.executable, "apitest");
        assert_eq!(config.runner.kill_grace_ms, 5_000);
        assert!(config.output.color);
        assert!(!config.output.stream_logs);
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut config = FileConfig::default();
        config.runner.executable = "newman".to_string();
        config.runner.empty_step_status = StepStatus::Skipped;
        config
            .runner
            .env
            .insert("API_BASE".to_string(), "http://localhost:8080".to_string());
        config.output.color = false;

        config.save_to_file(&config_path).unwrap();
        let loaded = FileConfig::load_from_file(&config_path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_file_creation() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let config = FileConfig::load_from_file(&config_path).unwrap();

        assert!(config_path.exists());
        assert_eq!(config, FileConfig::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "[runner]\nmax_body_lines = 50\n").unwrap();

        let config = FileConfig::load_from_file(&config_path).unwrap();

        assert_eq!(config.runner.max_body_lines, 50);
        assert_eq!(config.runner.executable, "apitest");
        assert!(config.output.color);
    }

    #[test]
    fn test_malformed_file_is_configuration_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "[runner\nexecutable = ").unwrap();

        let err = FileConfig::load_from_file(&config_path).unwrap_err();
        assert!(matches!(err, CliError::Configuration(_)));
    }

    #[test]
    fn test_overrides_win_and_validate() {
        let temp_dir = tempdir().unwrap();

        let config = FileConfig::default()
            .with_overrides(Some("newman"), Some(temp_dir.path()))
            .into_config()
            .unwrap();
        assert_eq!(config.executable, "newman");
        assert_eq!(config.working_dir.as_deref(), Some(temp_dir.path()));

        let err = FileConfig::default()
            .with_overrides(None, Some(&temp_dir.path().join("missing")))
            .into_config()
            .unwrap_err();
        assert!(matches!(err, CliError::Steprun(_)));
    }
}
