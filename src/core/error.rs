use thiserror::Error;

/// Error type for session control, process launch and configuration
///
/// Parse anomalies never surface here: the stream parser absorbs them. A
/// stop request for an unknown session is a normal
/// [`StopResult`](crate::core::StopResult), not an error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("An execution is already running for handle '{0}'")]
    AlreadyRunning(String),

    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("Failed to launch process: {0}")]
    Launch(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid run options: {0}")]
    InvalidOptions(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Async task error: {0}")]
    AsyncTask(#[from] tokio::task::JoinError),
}

impl Error {
    /// Create an already-running error for the given handle
    pub fn already_running<S: Into<String>>(handle: S) -> Self {
        Self::AlreadyRunning(handle.into())
    }

    /// Create a launch error
    pub fn launch<S: Into<String>>(msg: S) -> Self {
        Self::Launch(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an invalid options error
    pub fn invalid_options<S: Into<String>>(msg: S) -> Self {
        Self::InvalidOptions(msg.into())
    }

    /// The caller asked for something the current state does not allow
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRunning(_) | Self::InvalidOptions(_) | Self::InvalidConfig(_)
        )
    }

    /// The external process could not be started at all
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, Self::ExecutableNotFound(_) | Self::Launch(_))
    }

    /// Get user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            Self::AlreadyRunning(handle) => format!(
                "An execution is already running for '{}'. Cancel it before starting another.",
                handle
            ),
            Self::ExecutableNotFound(name) => format!(
                "Executable '{}' was not found. Install it or set 'executable' in the config file.",
                name
            ),
            Self::InvalidConfig(msg) => format!(
                "Invalid configuration: {}. Run 'steprun config show' to inspect the active settings.",
                msg
            ),
            _ => self.to_string(),
        }
    }
}

/// Convenient result type for the crate
pub type Result<T> = std::result::Result<T, Error>;
