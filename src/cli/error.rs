use thiserror::Error;

/// Errors surfaced by the `steprun` binary
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The run finished but did not succeed
    #[error("Run failed: {0}")]
    RunFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Steprun(#[from] crate::core::error::Error),
}

impl CliError {
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn run_failed<S: Into<String>>(msg: S) -> Self {
        Self::RunFailed(msg.into())
    }

    /// Get user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration(msg) => format!(
                "{}. Run 'steprun config path' to locate the file, or 'steprun config init --force' to reset it.",
                msg
            ),
            Self::Steprun(err) => err.user_message(),
            _ => self.to_string(),
        }
    }
}

/// Convenient result type for the CLI
pub type Result<T> = std::result::Result<T, CliError>;
