//! Data model shared by the parser, the session layer and consumers

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::core::error::{Error, Result};

/// Unique identifier for one execution session
pub type SessionId = Uuid;

/// Outcome of a finalized step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Passed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Passed => "passed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility of a captured variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VariableScope {
    #[default]
    Local,
    Global,
}

/// Request performed by a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetails {
    pub method: String,
    pub url: String,
    /// Headers in the order the tool printed them
    pub headers: IndexMap<String, String>,
    pub body: Option<Value>,
    /// Query string of `url`, empty when there is none
    pub query_params: IndexMap<String, String>,
}

/// Response observed by a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDetails {
    pub status_code: u16,
    pub status_text: String,
    pub headers: IndexMap<String, String>,
    pub body: Value,
    pub response_time_ms: u64,
    pub content_type: String,
}

/// A single pass/fail check reported by the tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResult {
    pub path: String,
    pub operator: String,
    pub expected: String,
    pub actual: String,
    pub passed: bool,
    pub message: Option<String>,
}

/// A value extracted from a step for reuse later in the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedVariable {
    pub name: String,
    pub value: Value,
    pub source_expression: String,
    pub scope: VariableScope,
}

/// A value published for other steps or runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedVariable {
    pub name: String,
    pub value: Value,
    /// Placeholder other steps use to reference the value, e.g. `{{create_user.user_id}}`
    pub reference_handle: String,
}

/// One reconstructed unit of work
///
/// Records are only ever produced by the parser's finalization path and are
/// never modified after they have been handed out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub name: String,
    pub id: Option<String>,
    pub index: Option<u32>,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub request: Option<RequestDetails>,
    pub response: Option<ResponseDetails>,
    pub assertions: Vec<AssertionResult>,
    pub captured: Vec<CapturedVariable>,
    pub exported: Vec<ExportedVariable>,
    pub error: Option<String>,
}

impl StepRecord {
    pub fn passed_assertions(&self) -> usize {
        self.assertions.iter().filter(|a| a.passed).count()
    }

    pub fn failed_assertions(&self) -> usize {
        self.assertions.iter().filter(|a| !a.passed).count()
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

/// Logical execution slot; at most one session runs per handle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(String);

impl SessionHandle {
    /// Create a fresh, unique handle
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionHandle {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Options for a single run of the external tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    /// File or collection passed to the tool as its positional argument
    pub target: PathBuf,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Slot to run in; a fresh handle is generated when absent
    #[serde(default)]
    pub handle: Option<SessionHandle>,
}

impl RunOptions {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            verbose: false,
            dry_run: false,
            priority: None,
            tags: Vec::new(),
            handle: None,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn handle(mut self, handle: SessionHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Check the options before anything is launched
    pub fn validate(&self) -> Result<()> {
        if self.target.as_os_str().is_empty() {
            return Err(Error::invalid_options("target path is empty"));
        }
        if let Some(priority) = &self.priority {
            if priority.trim().is_empty() {
                return Err(Error::invalid_options("priority is empty"));
            }
        }
        if let Some(tag) = self.tags.iter().find(|t| t.contains(',')) {
            return Err(Error::invalid_options(format!(
                "tag '{}' contains a comma",
                tag
            )));
        }
        Ok(())
    }

    /// Argument vector for the external tool
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![self.target.to_string_lossy().into_owned()];

        if self.verbose {
            args.push("--verbose".to_string());
        }
        if self.dry_run {
            args.push("--dry-run".to_string());
        }
        if let Some(priority) = &self.priority {
            args.push("--priority".to_string());
            args.push(priority.trim().to_string());
        }

        let tags: Vec<&str> = self
            .tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if !tags.is_empty() {
            args.push("--tags".to_string());
            args.push(tags.join(","));
        }

        args
    }
}

/// Result of a stop request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopResult {
    pub success: bool,
    pub message: String,
}

impl StopResult {
    pub fn stopped(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Severity attached to a raw log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Final outcome of a run as seen by consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}
