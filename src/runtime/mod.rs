//! Runtime: parsing, process management, sessions and aggregation

pub mod aggregator;
pub mod events;
pub mod parser;
pub mod process;
pub mod registry;
pub mod session;


pub use aggregator::{AggregatedView, Aggregator, AggregatorBuilder};
pub use events::{EventBus, SessionEvent, SessionEventKind, StepProgress};
pub use parser::{Clock, ParserOptions, StreamParser};
pub use process::{
    LaunchRequest, LaunchedProcess, OutputStream, ProcessControl, ProcessEvent, ProcessLauncher,
    TokioLauncher,
};
pub use registry::{CancelFlag, ProcessRegistry};
pub use session::{SessionManager, SessionSnapshot, SessionStatus};
