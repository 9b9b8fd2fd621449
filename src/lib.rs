//! # steprun
//!
//! Run an API test tool as a subprocess and rebuild a structured report of
//! its steps from the live output stream.
//!
//! The crate is organised leaves-first:
//!
//! - [`runtime::parser`]: an incremental line parser producing [`StepRecord`]s
//! - [`SessionManager`]: one subprocess per handle, output fanned out as
//!   [`SessionEvent`]s
//! - [`Aggregator`]: a single-execution view with progress notifications and
//!   cancellation
//!
//! The `cli` feature adds the `steprun` binary on top of these.
//!
//! ```rust,no_run
//! use steprun::{Aggregator, Config, RunOptions};
//!
//! # #[tokio::main]
//! # async fn main() -> steprun::Result<()> {
//! let aggregator = Aggregator::new(Config::default());
//! let view = aggregator
//!     .execute(RunOptions::new("collections/users.yaml").tags(["smoke"]))
//!     .await?;
//!
//! for step in &view.steps {
//!     println!("{} {}", step.status, step.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod runtime;

#[cfg(feature = "cli")]
pub mod cli;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::core::{
    AssertionResult, CapturedVariable, Config, ConfigBuilder, Error, ExportedVariable, LogLevel,
    RequestDetails, ResponseDetails, Result, RunOptions, SessionHandle, SessionId, StepRecord,
    StepStatus, StopResult, TerminalResult, VariableScope,
};
pub use crate::runtime::{
    AggregatedView, Aggregator, AggregatorBuilder, ProcessLauncher, ProcessRegistry,
    SessionEvent, SessionEventKind, SessionManager, SessionStatus, StepProgress, StreamParser,
    TokioLauncher,
};
