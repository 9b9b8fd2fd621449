//! Core types, configuration and errors
//!
//! Everything in here is free of I/O and async machinery so it can be shared
//! by the parser, the session layer and any presentation code.

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, ConfigBuilder, DEFAULT_EXECUTABLE};
pub use error::{Error, Result};
pub use types::{
    AssertionResult, CapturedVariable, ExportedVariable, LogLevel, RequestDetails,
    ResponseDetails, RunOptions, SessionHandle, SessionId, StepRecord, StepStatus, StopResult,
    TerminalResult, VariableScope,
};
