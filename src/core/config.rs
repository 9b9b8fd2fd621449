use crate::core::error::{Error, Result};
use crate::core::types::StepStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default name of the external test tool looked up on `PATH`
pub const DEFAULT_EXECUTABLE: &str = "apitest";

/// Runtime configuration for launching the tool and parsing its output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Executable name or path of the external tool
    #[serde(default = "default_executable")]
    pub executable: String,

    /// Working directory for the subprocess (inherits ours when unset)
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Extra environment variables for the subprocess
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Time between the polite termination signal and a forced kill
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,

    /// Status given to steps with no assertions and no explicit marker
    #[serde(default)]
    pub empty_step_status: StepStatus,

    /// Maximum number of lines buffered for one multi-line body fragment
    #[serde(default = "default_max_body_lines")]
    pub max_body_lines: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            working_dir: None,
            env: HashMap::new(),
            kill_grace_ms: default_kill_grace_ms(),
            empty_step_status: StepStatus::default(),
            max_body_lines: default_max_body_lines(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when the executable is empty, the
    /// body line cap is zero, or the empty-step policy is `failed`.
    pub fn validate(&self) -> Result<()> {
        if self.executable.trim().is_empty() {
            return Err(Error::invalid_config("executable must not be empty"));
        }
        if self.max_body_lines == 0 {
            return Err(Error::invalid_config("max_body_lines must be at least 1"));
        }
        if self.empty_step_status == StepStatus::Failed {
            return Err(Error::invalid_config(
                "empty_step_status must be 'passed' or 'skipped'",
            ));
        }
        if let Some(dir) = &self.working_dir {
            if !dir.is_dir() {
                return Err(Error::invalid_config(format!(
                    "working directory '{}' does not exist",
                    dir.display()
                )));
            }
        }
        Ok(())
    }
}

/// Fluent construction of [`Config`]
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn executable(mut self, executable: impl Into<String>) -> Self {
        self.config.executable = executable.into();
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.env.insert(key.into(), value.into());
        self
    }

    pub fn kill_grace_ms(mut self, ms: u64) -> Self {
        self.config.kill_grace_ms = ms;
        self
    }

    pub fn empty_step_status(mut self, status: StepStatus) -> Self {
        self.config.empty_step_status = status;
        self
    }

    pub fn max_body_lines(mut self, lines: usize) -> Self {
        self.config.max_body_lines = lines;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn default_executable() -> String {
    DEFAULT_EXECUTABLE.to_string()
}

fn default_kill_grace_ms() -> u64 {
    5_000
}

fn default_max_body_lines() -> usize {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.executable, "apitest");
        assert_eq!(config.kill_grace_ms, 5_000);
        assert_eq!(config.empty_step_status, StepStatus::Passed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_validates() {
        assert!(Config::builder().executable("").build().is_err());
        assert!(Config::builder().max_body_lines(0).build().is_err());
        assert!(Config::builder()
            .empty_step_status(StepStatus::Failed)
            .build()
            .is_err());

        let config = Config::builder()
            .executable("newman")
            .empty_step_status(StepStatus::Skipped)
            .env("API_TOKEN", "secret")
            .build()
            .unwrap();
        assert_eq!(config.executable, "newman");
        assert_eq!(config.env.get("API_TOKEN"), Some(&"secret".to_string()));
    }

    #[test]
    fn test_missing_working_dir_is_rejected() {
        let result = Config::builder()
            .working_dir("/definitely/not/a/real/dir")
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: Config = serde_json::from_str(r#"{"executable": "runner"}"#).unwrap();
        assert_eq!(config.executable, "runner");
        assert_eq!(config.max_body_lines, 500);
        assert!(config.env.is_empty());
    }
}
