//! Incremental reconstruction of step records from the tool's text report
//!
//! [`StreamParser`] consumes one line at a time and keeps at most one step
//! open. A step is finalized when the next step starts, when an explicit close
//! marker arrives, or when [`StreamParser::get_steps`] treats the end of the
//! stream as an implicit close. All three paths go through the same
//! transition table and the same finalization code.
//!
//! # Examples
//!
//! ```rust
//! use steprun::runtime::parser::StreamParser;
//! use steprun::StepStatus;
//!
//! let mut parser = StreamParser::new();
//! parser.add_line("[STEP 1/2] Create user");
//! parser.add_line("POST https://api.example.com/users");
//! parser.add_line("Status: 201");
//! parser.add_line("✓ status_code: expected 201, got 201");
//!
//! let steps = parser.get_steps();
//! assert_eq!(steps.len(), 1);
//! assert_eq!(steps[0].status, StepStatus::Passed);
//! ```

mod patterns;
mod step;

#[cfg(test)]
mod parser_test;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::core::{Config, StepRecord, StepStatus};
use patterns::{classify, strip_ansi, LineKind};
use step::InProgressStep;

/// Source of timestamps for step start and end times
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Finalization policy knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserOptions {
    /// Status of a step with no assertions and no explicit marker
    pub empty_step_status: StepStatus,
    /// Lines buffered for one body fragment before it is kept as raw text
    pub max_body_lines: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            empty_step_status: StepStatus::Passed,
            max_body_lines: 500,
        }
    }
}

impl From<&Config> for ParserOptions {
    fn from(config: &Config) -> Self {
        Self {
            empty_step_status: config.empty_step_status,
            max_body_lines: config.max_body_lines,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    StepStart,
    StepEnd,
    Enrich,
    EndOfStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Ignore,
    Open,
    FinalizeThenOpen,
    Enrich,
    Finalize,
}

const TRANSITIONS: &[(Phase, Signal, Action)] = &[
    (Phase::Idle, Signal::StepStart, Action::Open),
    (Phase::Idle, Signal::StepEnd, Action::Ignore),
    (Phase::Idle, Signal::Enrich, Action::Ignore),
    (Phase::Idle, Signal::EndOfStream, Action::Ignore),
    (Phase::Open, Signal::StepStart, Action::FinalizeThenOpen),
    (Phase::Open, Signal::StepEnd, Action::Finalize),
    (Phase::Open, Signal::Enrich, Action::Enrich),
    (Phase::Open, Signal::EndOfStream, Action::Finalize),
];

fn action_for(phase: Phase, signal: Signal) -> Action {
    TRANSITIONS
        .iter()
        .find(|(p, s, _)| *p == phase && *s == signal)
        .map(|(_, _, action)| *action)
        .unwrap_or(Action::Ignore)
}

/// Line-at-a-time parser for one session's output
///
/// Each session owns a fresh parser. Nothing here returns an error: lines
/// that match no recognizer, or fragments that fail to parse, leave the
/// structured state untouched.
pub struct StreamParser {
    open: Option<InProgressStep>,
    completed: Vec<StepRecord>,
    declared_total: Option<u32>,
    partial: String,
    options: ParserOptions,
    clock: Clock,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::with_options(ParserOptions::default())
    }

    pub fn with_options(options: ParserOptions) -> Self {
        Self {
            open: None,
            completed: Vec::new(),
            declared_total: None,
            partial: String::new(),
            options,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock, mainly for deterministic timestamps in tests
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Feed text to the parser
    ///
    /// Text with embedded newlines is handled as several lines, so a batch
    /// and the same lines fed one by one produce the same records.
    pub fn add_line(&mut self, text: &str) {
        for line in text.lines() {
            self.process_line(line);
        }
    }

    /// Feed an arbitrary chunk of the byte stream
    ///
    /// A trailing partial line is held back until its newline arrives or
    /// [`get_steps`](Self::get_steps) flushes it.
    pub fn push_chunk(&mut self, chunk: &str) {
        self.partial.push_str(chunk);
        while let Some(pos) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=pos).collect();
            self.process_line(line.trim_end_matches(['\n', '\r']));
        }
    }

    /// Records finalized so far, without closing the open step
    pub fn steps(&self) -> &[StepRecord] {
        &self.completed
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn is_step_open(&self) -> bool {
        self.open.is_some()
    }

    /// Total announced by a `[STEP n/total]` marker, if any
    pub fn declared_total(&self) -> Option<u32> {
        self.declared_total
    }

    /// Close the stream and return every finalized record
    ///
    /// Calling this again without new input returns the same list.
    pub fn get_steps(&mut self) -> Vec<StepRecord> {
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.process_line(line.trim_end_matches('\r'));
        }
        self.apply(Signal::EndOfStream, None);
        self.completed.clone()
    }

    /// Consume the parser, closing the stream first
    pub fn into_steps(mut self) -> Vec<StepRecord> {
        self.get_steps();
        self.completed
    }

    /// Drop all state, keeping options and clock
    pub fn reset(&mut self) {
        self.open = None;
        self.completed.clear();
        self.declared_total = None;
        self.partial.clear();
    }

    fn process_line(&mut self, raw: &str) {
        let line = strip_ansi(raw);

        if let Some(step) = self.open.as_mut() {
            if step.has_pending_body() {
                let kind = classify(&line, &step.context());
                if !kind.interrupts_body() {
                    step.continue_body(&line, self.options.max_body_lines);
                    return;
                }
                step.flush_body();
                self.dispatch(kind);
                return;
            }
        }

        let context = self
            .open
            .as_ref()
            .map(InProgressStep::context)
            .unwrap_or_default();
        let kind = classify(&line, &context);
        self.dispatch(kind);
    }

    fn dispatch(&mut self, kind: LineKind) {
        let signal = match &kind {
            LineKind::StepStart(_) => Signal::StepStart,
            LineKind::StepEnd(_) => Signal::StepEnd,
            LineKind::Unrecognized => return,
            _ => Signal::Enrich,
        };
        self.apply(signal, Some(kind));
    }

    fn apply(&mut self, signal: Signal, kind: Option<LineKind>) {
        let phase = if self.open.is_some() {
            Phase::Open
        } else {
            Phase::Idle
        };

        match (action_for(phase, signal), kind) {
            (Action::Open, Some(LineKind::StepStart(start))) => self.open_step(start),
            (Action::FinalizeThenOpen, Some(LineKind::StepStart(start))) => {
                self.finalize_open();
                self.open_step(start);
            }
            (Action::Finalize, Some(LineKind::StepEnd(end))) => {
                if let Some(step) = self.open.as_mut() {
                    step.mark_end(&end);
                }
                self.finalize_open();
            }
            (Action::Finalize, _) => self.finalize_open(),
            (Action::Enrich, Some(kind)) => {
                if let Some(step) = self.open.as_mut() {
                    step.enrich(kind, self.options.max_body_lines);
                }
            }
            _ => {}
        }
    }

    fn open_step(&mut self, start: patterns::StepStart) {
        if let Some(total) = start.total {
            self.declared_total = Some(total);
        }
        self.open = Some(InProgressStep::open(start, (self.clock)()));
    }

    fn finalize_open(&mut self) {
        let Some(step) = self.open.take() else {
            return;
        };
        let record = step.finalize((self.clock)(), self.options.empty_step_status);
        debug!(
            step = %record.name,
            status = %record.status,
            assertions = record.assertions.len(),
            "step finalized"
        );
        self.completed.push(record);
    }
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StreamParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamParser")
            .field("open", &self.open.as_ref().map(InProgressStep::name))
            .field("completed", &self.completed.len())
            .field("declared_total", &self.declared_total)
            .field("options", &self.options)
            .finish()
    }
}
