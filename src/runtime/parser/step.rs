//! The mutable in-progress step and its finalization

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::patterns::{EndOutcome, LineContext, LineKind, Section, StepEnd, StepStart};
use crate::core::types::{
    CapturedVariable, ExportedVariable, RequestDetails, ResponseDetails, StepRecord, StepStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyTarget {
    Request,
    Response,
}

/// Accumulates a structured-value fragment until its brackets balance
#[derive(Debug)]
struct BodyBuffer {
    target: BodyTarget,
    text: String,
    lines: usize,
    depth: i64,
    opened: bool,
    in_string: bool,
}

impl BodyBuffer {
    fn new(target: BodyTarget) -> Self {
        Self {
            target,
            text: String::new(),
            lines: 0,
            depth: 0,
            opened: false,
            in_string: false,
        }
    }

    /// Append one line; true once the fragment is complete
    fn push(&mut self, line: &str) -> bool {
        if self.lines > 0 {
            self.text.push('\n');
        }
        self.text.push_str(line);
        self.lines += 1;

        let mut escaped = false;
        for ch in line.chars() {
            if self.in_string {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == '"' {
                    self.in_string = false;
                }
                continue;
            }
            match ch {
                '"' if self.opened => self.in_string = true,
                '{' | '[' => {
                    self.depth += 1;
                    self.opened = true;
                }
                '}' | ']' if self.opened => self.depth -= 1,
                _ => {}
            }
        }

        self.opened && self.depth <= 0
    }
}

/// Parse a brace-delimited fragment, falling back to the raw text
pub(crate) fn parse_fragment(text: &str) -> Value {
    let trimmed = text.trim();
    if let (Some(start), Some(end)) = (trimmed.find(['{', '[']), trimmed.rfind(['}', ']'])) {
        if end >= start {
            if let Ok(value) = serde_json::from_str(&trimmed[start..=end]) {
                return value;
            }
        }
    }
    Value::String(trimmed.to_string())
}

/// Interpret a captured or exported value, keeping plain text as a string
pub(crate) fn parse_value(raw: &str) -> Value {
    let raw = raw.trim();
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn query_params(raw_url: &str) -> IndexMap<String, String> {
    if let Ok(url) = Url::parse(raw_url) {
        return url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
    }

    let Some((_, query)) = raw_url.split_once('?') else {
        return IndexMap::new();
    };
    query
        .split('#')
        .next()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Partial state of the step currently being reconstructed
///
/// Never handed out; [`InProgressStep::finalize`] is the only way to turn it
/// into a [`StepRecord`].
#[derive(Debug)]
pub(crate) struct InProgressStep {
    name: String,
    id: Option<String>,
    index: Option<u32>,
    started_at: DateTime<Utc>,
    request: Option<RequestDetails>,
    response: Option<ResponseDetails>,
    assertions: Vec<crate::core::types::AssertionResult>,
    captured: Vec<CapturedVariable>,
    exported: Vec<ExportedVariable>,
    error: Option<String>,
    section: Section,
    outcome: Option<StepStatus>,
    duration_ms: Option<u64>,
    body: Option<BodyBuffer>,
}

impl InProgressStep {
    pub fn open(start: StepStart, started_at: DateTime<Utc>) -> Self {
        Self {
            name: start.name,
            id: start.id,
            index: start.index,
            started_at,
            request: None,
            response: None,
            assertions: Vec::new(),
            captured: Vec::new(),
            exported: Vec::new(),
            error: None,
            section: Section::None,
            outcome: None,
            duration_ms: None,
            body: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> LineContext {
        LineContext {
            section: self.section,
        }
    }

    pub fn has_pending_body(&self) -> bool {
        self.body.is_some()
    }

    /// Feed a line to the multi-line body in flight
    pub fn continue_body(&mut self, line: &str, max_lines: usize) {
        let Some(buffer) = self.body.as_mut() else {
            return;
        };
        if buffer.push(line) || buffer.lines >= max_lines {
            self.flush_body();
        }
    }

    /// Close a pending body as-is, keeping it as raw text when unbalanced
    pub fn flush_body(&mut self) {
        if let Some(buffer) = self.body.take() {
            let value = parse_fragment(&buffer.text);
            self.attach_body(buffer.target, value);
        }
    }

    fn attach_body(&mut self, target: BodyTarget, value: Value) {
        match target {
            BodyTarget::Request => match self.request.as_mut() {
                Some(request) => request.body = Some(value),
                None => debug!(step = %self.name, "request body without a request line dropped"),
            },
            BodyTarget::Response => {
                self.response.get_or_insert_with(ResponseDetails::default).body = value;
            }
        }
    }

    fn start_body(&mut self, target: BodyTarget, fragment: &str, max_lines: usize) {
        self.flush_body();
        let mut buffer = BodyBuffer::new(target);
        let complete = buffer.push(fragment);
        if complete || !buffer.opened || max_lines <= 1 {
            self.attach_body(target, parse_fragment(&buffer.text));
        } else {
            self.body = Some(buffer);
        }
    }

    fn step_key(&self) -> String {
        if let Some(id) = &self.id {
            return id.clone();
        }
        let key = slug(&self.name);
        if !key.is_empty() {
            return key;
        }
        match self.index {
            Some(index) => format!("step_{}", index),
            None => "step".to_string(),
        }
    }

    /// Apply an enrichment line to the step
    pub fn enrich(&mut self, kind: LineKind, max_body_lines: usize) {
        match kind {
            LineKind::Skip(reason) => {
                debug!(step = %self.name, reason = ?reason, "explicit skip marker");
                self.outcome = Some(StepStatus::Skipped);
            }
            LineKind::Error(message) => {
                self.error = Some(match self.error.take() {
                    Some(previous) => format!("{}; {}", previous, message),
                    None => message,
                });
                self.section = Section::None;
            }
            LineKind::Assertion(assertion) => {
                self.assertions.push(assertion);
                self.section = Section::None;
            }
            LineKind::Export(export) => {
                let reference_handle = export
                    .reference
                    .unwrap_or_else(|| format!("{{{{{}.{}}}}}", self.step_key(), export.name));
                self.exported.push(ExportedVariable {
                    value: parse_value(&export.raw_value),
                    name: export.name,
                    reference_handle,
                });
                self.section = Section::None;
            }
            LineKind::Capture(capture) => {
                self.captured.push(CapturedVariable {
                    value: parse_value(&capture.raw_value),
                    name: capture.name,
                    source_expression: capture.source_expression,
                    scope: capture.scope,
                });
                if self.section != Section::Captures {
                    self.section = Section::None;
                }
            }
            LineKind::SectionHeader(section) => self.section = section,
            LineKind::Request(line) => {
                self.request = Some(RequestDetails {
                    query_params: query_params(&line.url),
                    method: line.method,
                    url: line.url,
                    ..Default::default()
                });
                self.section = Section::Request;
                if let Some(body) = line.inline_body {
                    self.start_body(BodyTarget::Request, &body, max_body_lines);
                }
            }
            LineKind::Response(line) => {
                let response = self.response.get_or_insert_with(ResponseDetails::default);
                if let Some(code) = line.status_code {
                    response.status_code = code;
                }
                if let Some(text) = line.status_text {
                    response.status_text = text;
                }
                if let Some(ms) = line.response_time_ms {
                    response.response_time_ms = ms;
                }
                self.section = Section::Response;
            }
            LineKind::Duration(ms) => self.duration_ms = Some(ms),
            LineKind::Header(name, value) => match self.section {
                Section::Request => {
                    if let Some(request) = self.request.as_mut() {
                        request.headers.insert(name, value);
                    }
                }
                Section::Response => {
                    let response = self.response.get_or_insert_with(ResponseDetails::default);
                    if name.eq_ignore_ascii_case("content-type") {
                        response.content_type = value.clone();
                    }
                    response.headers.insert(name, value);
                }
                Section::None | Section::Captures => {}
            },
            LineKind::Body(body) => {
                if let Some(section) = body.target {
                    self.section = section;
                }
                let target = match self.section {
                    Section::Request => Some(BodyTarget::Request),
                    Section::Response => Some(BodyTarget::Response),
                    Section::None | Section::Captures if self.response.is_some() => {
                        Some(BodyTarget::Response)
                    }
                    Section::None | Section::Captures if self.request.is_some() => {
                        Some(BodyTarget::Request)
                    }
                    Section::None | Section::Captures => None,
                };
                if let Some(target) = target {
                    self.start_body(target, &body.fragment, max_body_lines);
                }
            }
            LineKind::StepStart(_) | LineKind::StepEnd(_) | LineKind::Unrecognized => {}
        }
    }

    /// Record an explicit close marker before finalization
    pub fn mark_end(&mut self, end: &StepEnd) {
        match end.outcome {
            EndOutcome::Failed => {
                self.outcome = Some(StepStatus::Failed);
                if self.error.is_none() {
                    self.error = end.reason.clone();
                }
            }
            EndOutcome::Skipped => self.outcome = Some(StepStatus::Skipped),
            EndOutcome::Passed => {
                if self.outcome.is_none() {
                    self.outcome = Some(StepStatus::Passed);
                }
            }
            EndOutcome::Completed => {}
        }
        if let Some(ms) = end.duration_ms {
            self.duration_ms = Some(ms);
        }
    }

    /// Close the step with whatever it has accumulated
    pub fn finalize(mut self, ended_at: DateTime<Utc>, empty_status: StepStatus) -> StepRecord {
        self.flush_body();

        let any_failed = self.assertions.iter().any(|a| !a.passed);
        let status = match self.outcome {
            Some(StepStatus::Skipped) => StepStatus::Skipped,
            Some(StepStatus::Failed) => StepStatus::Failed,
            _ if any_failed || self.error.is_some() => StepStatus::Failed,
            Some(StepStatus::Passed) => StepStatus::Passed,
            None if self.assertions.is_empty() => empty_status,
            None => StepStatus::Passed,
        };

        let duration_ms = self.duration_ms.unwrap_or_else(|| {
            u64::try_from((ended_at - self.started_at).num_milliseconds()).unwrap_or(0)
        });

        StepRecord {
            name: self.name,
            id: self.id,
            index: self.index,
            status,
            started_at: self.started_at,
            ended_at,
            duration_ms,
            request: self.request,
            response: self.response,
            assertions: self.assertions,
            captured: self.captured,
            exported: self.exported,
            error: self.error,
        }
    }
}
