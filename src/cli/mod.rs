//! Command-line front end for running and replaying API test reports.
//! ## Usage
//!
//! ```bash
//! # Run a collection and watch its steps as they finish
//! steprun run collections/users.yaml --tags smoke,auth
//!
//! # Same run, also echoing the tool's raw output
//! steprun run collections/users.yaml --stream-logs
//!
//! # Rebuild the step report from a captured log
//! steprun parse nightly.log --json
//!
//! # Inspect or create the configuration file
//! steprun config show
//! ```

pub mod app;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;

pub use app::{Cli, Commands};
pub use error::{CliError, Result};

/// Version information for the CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default directory holding `config.toml`
pub fn default_config_dir() -> std::path::PathBuf {
    directories::ProjectDirs::from("", "", "steprun")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| {
            // Fallback to home directory if project dirs not available
            dirs::home_dir()
                .unwrap_or_else(|| std::path::PathBuf::from("."))
                .join(".steprun")
        })
}

/// Ensure the config directory exists
pub fn ensure_config_dir() -> Result<std::path::PathBuf> {
    let dir = default_config_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
