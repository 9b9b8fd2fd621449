//! Line recognizers for the tool's text report
//!
//! Each recognizer looks at one cleaned line plus the current step-local
//! context and either claims it or passes. They run in a fixed order; the
//! first match wins, with step boundaries always checked first.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::types::{AssertionResult, VariableScope};

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("line pattern must compile")
}

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| re(r"\x1b\[[0-9;?]*[ -/]*[@-~]"));

static STEP_BRACKET: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)^\s*\[STEP\s+(\d+)\s*/\s*(\d+)\s*\]\s*(.+?)\s*$"));
static STEP_ARROW: Lazy<Regex> = Lazy::new(|| re(r"(?i)^\s*▶\s*Step\s+(\d+)\s*:\s*(.+?)\s*$"));
static STEP_RUNNING: Lazy<Regex> = Lazy::new(|| re(r"(?i)^\s*Running step\s*:\s*(.+?)\s*$"));
static STEP_ID_SUFFIX: Lazy<Regex> = Lazy::new(|| re(r"^(.*?)\s*\(id:\s*([^)]+?)\s*\)$"));

static STEP_DONE: Lazy<Regex> = Lazy::new(|| {
    re(r"(?i)^\s*Step\s+(?:\d+\s+)?(completed|complete|finished|passed|failed|skipped)\b(.*)$")
});
static BARE_MARK: Lazy<Regex> = Lazy::new(|| {
    re(r"^\s*([✓✔✅✗✘×❌])?\s*((?i:passed|pass|failed|fail|ok))?\s*(?:\(\s*(\d+(?:\.\d+)?)\s*ms\s*\))?\s*$")
});
static DURATION_SUFFIX: Lazy<Regex> = Lazy::new(|| re(r"\(\s*(\d+(?:\.\d+)?)\s*ms\s*\)"));

static SKIP_MARK: Lazy<Regex> = Lazy::new(|| {
    re(r"^\s*(?:⊘|↷|⏭\x{FE0F}?|SKIPPED\b|SKIP\b|Skipped\b)\s*:?\s*(.*?)\s*$")
});
static ERROR_LINE: Lazy<Regex> =
    Lazy::new(|| re(r"^\s*(?:[✗✘×❌]\s*)?(?:Error|ERROR|error)\s*:\s*(.+?)\s*$"));

static ASSERTION: Lazy<Regex> = Lazy::new(|| {
    re(r"^\s*(✓|✔|✅|✗|✘|×|❌|PASSED\b|PASS\b|FAILED\b|FAIL\b|Assertion\b|Assert\b)\s*:?\s*(.+?)\s*$")
});
static ASSERT_VERDICT: Lazy<Regex> = Lazy::new(|| re(r"(?i)^(passed|failed|ok)\b\s*:?\s*"));
static FAIL_WORD: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bfail(?:ed|ure)?\b"));
static EXPECTED_ACTUAL: Lazy<Regex> = Lazy::new(|| {
    re(r"(?i)\bexpected\b\s*:?\s*(.*?)\s*[,;]?\s*(?:but\s+)?\b(?:got|actual|received|was)\b\s*:?\s*(.*?)\s*\)?\s*$")
});
static EXPECTED_ONLY: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bexpected\b\s*:?\s*(.+?)\s*\)?\s*$"));

static REQUEST: Lazy<Regex> = Lazy::new(|| {
    re(r"^\s*(?:(?:→|->|>>|>)\s*)?(?:(?i:request)\s*:\s*)?(GET|POST|PUT|PATCH|DELETE|HEAD|OPTIONS|TRACE|CONNECT)\s+(\S+)\s*(.*?)\s*$")
});

static STATUS: Lazy<Regex> = Lazy::new(|| {
    re(r"(?i)\bstatus(?:\s+code)?\s*:\s*(\d{3})\b[ \t]*([A-Za-z][A-Za-z '\-]*[A-Za-z])?")
});
static HTTP_STATUS_LINE: Lazy<Regex> = Lazy::new(|| {
    re(r"^\s*(?:(?:←|<-|<)\s*)?HTTP/\d(?:\.\d)?\s+(\d{3})\b[ \t]*([A-Za-z][A-Za-z '\-]*[A-Za-z])?")
});
static RESPONSE_TIME: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)\bresponse\s*time\s*:\s*(\d+(?:\.\d+)?)\s*ms\b"));
static STEP_DURATION: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)^\s*(?:duration|took|elapsed)\s*:?\s*(\d+(?:\.\d+)?)\s*ms\b"));

static EXPORT: Lazy<Regex> = Lazy::new(|| {
    re(r"^\s*(?:📤\s*)?(?i:exported|export)\b(?:\s*\(\s*(?i:local|global)\s*\))?\s*:?\s*([A-Za-z_$][\w.$-]*)\s*(?:=|→|->|:)\s*(.+?)\s*$")
});
static EXPORT_REFERENCE: Lazy<Regex> =
    Lazy::new(|| re(r"^(.*?)\s+(?:as|ref:?|→|->)\s*(\{\{[^}]+\}\})$"));

static CAPTURE: Lazy<Regex> = Lazy::new(|| {
    re(r"^\s*(?:📥\s*)?(?i:captured|capture)\b(?:\s*\(\s*((?i:local|global))\s*\))?\s*:?\s*(?:((?i:local|global))\s+)?([A-Za-z_$][\w.$-]*)\s*(?:=|→|->|:)\s*(.+?)\s*$")
});
static CAPTURE_SECTION: Lazy<Regex> = Lazy::new(|| {
    re(r"(?i)^\s*(?:📥\s*)?(?:captured(?:\s+variables)?|captures|variables)\s*:?\s*$")
});
static SECTION_ASSIGNMENT: Lazy<Regex> =
    Lazy::new(|| re(r"^\s*([A-Za-z_$][\w.$-]*)\s*(?:=|→|->|:)\s*(.+?)\s*$"));
static ASSIGNMENT: Lazy<Regex> =
    Lazy::new(|| re(r"^\s*([A-Za-z_$][\w.$-]*)\s*(?:=|→|->)\s*(.+?)\s*$"));
static SOURCE_PAREN: Lazy<Regex> =
    Lazy::new(|| re(r"^(.*?)\s*\((?:from|via|source:?)\s+([^)]+?)\s*\)$"));
static SOURCE_ARROW: Lazy<Regex> = Lazy::new(|| re(r"^(.*?)\s+(?:from|←|<-)\s+(\S+)$"));

static HEADERS_SECTION: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)^\s*(?:(request|response)\s+)?headers\s*:?\s*$"));
static HEADER: Lazy<Regex> =
    Lazy::new(|| re(r"^\s+([A-Za-z0-9][A-Za-z0-9_-]*)\s*:\s*(.*?)\s*$"));
static BODY_PREFIX: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)^\s*(?:(request|response)\s+)?body\s*:\s*(.*?)\s*$"));

/// Part of the step the parser is currently reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Section {
    #[default]
    None,
    Request,
    Response,
    Captures,
}

/// Step-local context available to recognizers
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LineContext {
    pub section: Section,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StepStart {
    pub name: String,
    pub id: Option<String>,
    pub index: Option<u32>,
    pub total: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EndOutcome {
    Completed,
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StepEnd {
    pub outcome: EndOutcome,
    pub duration_ms: Option<u64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RequestLine {
    pub method: String,
    pub url: String,
    pub inline_body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct ResponseLine {
    pub status_code: Option<u16>,
    pub status_text: Option<String>,
    pub response_time_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CaptureLine {
    pub name: String,
    pub raw_value: String,
    pub source_expression: String,
    pub scope: VariableScope,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExportLine {
    pub name: String,
    pub raw_value: String,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BodyLine {
    /// Explicit target from a `Request body:` / `Response body:` prefix
    pub target: Option<Section>,
    pub fragment: String,
}

/// Classification of one line
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LineKind {
    StepStart(StepStart),
    StepEnd(StepEnd),
    Skip(Option<String>),
    Error(String),
    Assertion(AssertionResult),
    Export(ExportLine),
    Capture(CaptureLine),
    SectionHeader(Section),
    Request(RequestLine),
    Response(ResponseLine),
    Duration(u64),
    Header(String, String),
    Body(BodyLine),
    Unrecognized,
}

impl LineKind {
    /// Lines that end a pending multi-line body instead of extending it
    pub fn interrupts_body(&self) -> bool {
        !matches!(
            self,
            LineKind::Header(..) | LineKind::Body(_) | LineKind::Unrecognized
        )
    }
}

type Recognizer = fn(&str, &LineContext) -> Option<LineKind>;

/// Recognizers in evaluation order
const RECOGNIZERS: &[(&str, Recognizer)] = &[
    ("step-start", step_start),
    ("step-end", step_end),
    ("skip", skip_marker),
    ("error", error_line),
    ("assertion", assertion),
    ("export", export),
    ("capture", explicit_capture),
    ("section", section_header),
    ("section-capture", section_capture),
    ("request", request),
    ("response", response),
    ("duration", duration),
    ("header", header),
    ("body", body),
    ("assignment", assignment),
];

/// Classify one cleaned line
pub(crate) fn classify(line: &str, ctx: &LineContext) -> LineKind {
    if line.trim().is_empty() {
        return LineKind::Unrecognized;
    }
    for (name, recognize) in RECOGNIZERS {
        if let Some(kind) = recognize(line, ctx) {
            tracing::trace!(recognizer = name, "line recognized");
            return kind;
        }
    }
    LineKind::Unrecognized
}

/// Remove terminal colour sequences
pub(crate) fn strip_ansi(line: &str) -> std::borrow::Cow<'_, str> {
    ANSI_ESCAPE.replace_all(line, "")
}

fn parse_ms(text: &str) -> Option<u64> {
    text.parse::<f64>()
        .ok()
        .filter(|ms| ms.is_finite() && *ms >= 0.0)
        .map(|ms| ms.round() as u64)
}

fn split_step_id(name: &str) -> (String, Option<String>) {
    match STEP_ID_SUFFIX.captures(name) {
        Some(caps) if !caps[1].trim().is_empty() => {
            (caps[1].trim().to_string(), Some(caps[2].to_string()))
        }
        _ => (name.trim().to_string(), None),
    }
}

fn step_start(line: &str, _ctx: &LineContext) -> Option<LineKind> {
    let (name, index, total): (String, Option<u32>, Option<u32>) = if let Some(caps) =
        STEP_BRACKET.captures(line)
    {
        (
            caps[3].to_string(),
            caps[1].parse().ok(),
            caps[2].parse().ok(),
        )
    } else if let Some(caps) = STEP_ARROW.captures(line) {
        (caps[2].to_string(), caps[1].parse().ok(), None)
    } else if let Some(caps) = STEP_RUNNING.captures(line) {
        (caps[1].to_string(), None, None)
    } else {
        return None;
    };

    let (name, id) = split_step_id(&name);
    Some(LineKind::StepStart(StepStart {
        name,
        id,
        index,
        total,
    }))
}

fn step_end(line: &str, _ctx: &LineContext) -> Option<LineKind> {
    if let Some(caps) = STEP_DONE.captures(line) {
        let outcome = match caps[1].to_ascii_lowercase().as_str() {
            "passed" => EndOutcome::Passed,
            "failed" => EndOutcome::Failed,
            "skipped" => EndOutcome::Skipped,
            _ => EndOutcome::Completed,
        };
        let rest = &caps[2];
        let duration_ms = DURATION_SUFFIX
            .captures(rest)
            .and_then(|c| parse_ms(&c[1]));
        let reason = DURATION_SUFFIX
            .replace_all(rest, "")
            .trim()
            .trim_start_matches([':', '-', '—'])
            .trim()
            .to_string();
        return Some(LineKind::StepEnd(StepEnd {
            outcome,
            duration_ms,
            reason: (!reason.is_empty()).then_some(reason),
        }));
    }

    let caps = BARE_MARK.captures(line)?;
    let mark = caps.get(1).map(|m| m.as_str());
    let word = caps.get(2).map(|m| m.as_str().to_ascii_lowercase());
    let outcome = match (mark, word.as_deref()) {
        (Some("✓" | "✔" | "✅"), _) => EndOutcome::Passed,
        (Some(_), _) => EndOutcome::Failed,
        (None, Some("failed" | "fail")) => EndOutcome::Failed,
        (None, Some(_)) => EndOutcome::Passed,
        (None, None) => return None,
    };
    Some(LineKind::StepEnd(StepEnd {
        outcome,
        duration_ms: caps.get(3).and_then(|m| parse_ms(m.as_str())),
        reason: None,
    }))
}

fn skip_marker(line: &str, _ctx: &LineContext) -> Option<LineKind> {
    let caps = SKIP_MARK.captures(line)?;
    let reason = caps[1].trim();
    Some(LineKind::Skip(
        (!reason.is_empty()).then(|| reason.to_string()),
    ))
}

fn error_line(line: &str, _ctx: &LineContext) -> Option<LineKind> {
    ERROR_LINE
        .captures(line)
        .map(|caps| LineKind::Error(caps[1].to_string()))
}

fn assertion(line: &str, _ctx: &LineContext) -> Option<LineKind> {
    let caps = ASSERTION.captures(line)?;
    let marker = &caps[1];
    let rest = caps[2].trim();

    let (passed, rest) = match marker {
        "✓" | "✔" | "✅" | "PASS" | "PASSED" => (true, rest),
        "✗" | "✘" | "×" | "❌" | "FAIL" | "FAILED" => (false, rest),
        _ => {
            // "Assert"/"Assertion" carry the verdict in the text
            let passed = !FAIL_WORD.is_match(rest) && !rest.contains(['✗', '✘', '❌']);
            let stripped = ASSERT_VERDICT.replace(rest, "");
            return Some(LineKind::Assertion(parse_assertion(
                stripped.trim_start_matches(['✓', '✔', '✗', '✘', '❌']).trim(),
                passed,
            )));
        }
    };

    Some(LineKind::Assertion(parse_assertion(rest, passed)))
}

/// Split assertion text into path, operator, expected and actual parts
pub(crate) fn parse_assertion(text: &str, passed: bool) -> AssertionResult {
    let (text, message) = match text.split_once(" - ").or_else(|| text.split_once(" — ")) {
        Some((head, msg)) if !msg.trim().is_empty() => (head.trim(), Some(msg.trim().to_string())),
        _ => (text.trim(), None),
    };

    let (head, expected, actual) = if let Some(caps) = EXPECTED_ACTUAL.captures(text) {
        let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
        (
            &text[..start],
            Some(unquote(&caps[1])),
            Some(unquote(&caps[2])),
        )
    } else if let Some(caps) = EXPECTED_ONLY.captures(text) {
        let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
        (&text[..start], Some(unquote(&caps[1])), None)
    } else {
        (text, None, None)
    };

    let head = head
        .trim()
        .trim_end_matches([':', ',', '(', ';'])
        .trim();
    let (path, operator, value) = split_head(head);

    AssertionResult {
        path,
        operator,
        expected: expected.unwrap_or_else(|| unquote(&value)),
        actual: actual.unwrap_or_default(),
        passed,
        message,
    }
}

fn split_head(head: &str) -> (String, String, String) {
    let tokens: Vec<&str> = head.split_whitespace().collect();

    for i in 1..tokens.len() {
        if let Some((operator, used)) = operator_at(&tokens[i..]) {
            let path = tokens[..i].join(" ");
            let value = tokens[i + used..].join(" ");
            return (
                path.trim_end_matches(':').to_string(),
                operator.to_string(),
                value,
            );
        }
    }

    if let Some((path, value)) = head.split_once(':') {
        let value_tokens: Vec<&str> = value.split_whitespace().collect();
        return match operator_at(&value_tokens) {
            Some((operator, used)) => (
                path.trim().to_string(),
                operator.to_string(),
                value_tokens[used..].join(" "),
            ),
            None => (
                path.trim().to_string(),
                "equals".to_string(),
                value.trim().to_string(),
            ),
        };
    }

    (head.to_string(), "equals".to_string(), String::new())
}

/// Normalize an operator at the front of `tokens`, returning how many tokens it used
fn operator_at(tokens: &[&str]) -> Option<(&'static str, usize)> {
    let first = tokens.first()?.to_ascii_lowercase();
    let second = tokens.get(1).map(|t| t.to_ascii_lowercase());

    let two_word = match (first.as_str(), second.as_deref()) {
        ("not", Some("equals" | "equal" | "eq")) | ("is", Some("not")) => Some("not_equals"),
        ("to", Some("equal" | "be")) => Some("equals"),
        ("greater", Some("than")) => Some(">"),
        ("less", Some("than")) => Some("<"),
        ("has", Some("type")) | ("is", Some("type")) => Some("type"),
        _ => None,
    };
    if let Some(op) = two_word {
        return Some((op, 2));
    }

    let op = match first.as_str() {
        "==" | "===" | "=" | "eq" | "equals" | "equal" | "is" => "equals",
        "!=" | "!==" | "ne" | "neq" | "not_equals" => "not_equals",
        "contains" | "includes" | "has" => "contains",
        "exists" | "present" => "exists",
        "matches" | "=~" | "~=" => "matches",
        ">" | "gt" => ">",
        ">=" | "gte" => ">=",
        "<" | "lt" => "<",
        "<=" | "lte" => "<=",
        "in" => "in",
        "type" | "typeof" | "is_type" => "type",
        _ => return None,
    };
    Some((op, 1))
}

fn unquote(text: &str) -> String {
    let text = text.trim();
    for quote in ['"', '\'', '`'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return text[1..text.len() - 1].to_string();
        }
    }
    text.to_string()
}

fn looks_like_url(candidate: &str) -> bool {
    candidate.contains("://") || candidate.starts_with('/') || candidate.starts_with("{{")
}

fn request(line: &str, _ctx: &LineContext) -> Option<LineKind> {
    let caps = REQUEST.captures(line)?;
    let url = caps[2].to_string();
    if !looks_like_url(&url) {
        return None;
    }
    let trailing = caps[3].trim();
    let inline_body = trailing
        .find(['{', '['])
        .map(|start| trailing[start..].to_string());
    Some(LineKind::Request(RequestLine {
        method: caps[1].to_string(),
        url,
        inline_body,
    }))
}

fn clean_status_text(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let cut = lower.find("response").unwrap_or(text.len());
    let text = text[..cut].trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn response(line: &str, _ctx: &LineContext) -> Option<LineKind> {
    let status = HTTP_STATUS_LINE
        .captures(line)
        .or_else(|| STATUS.captures(line));
    let time = RESPONSE_TIME.captures(line);
    if status.is_none() && time.is_none() {
        return None;
    }

    let mut parsed = ResponseLine::default();
    if let Some(caps) = status {
        parsed.status_code = caps[1].parse().ok().filter(|code| (100..=599).contains(code));
        parsed.status_text = caps.get(2).and_then(|m| clean_status_text(m.as_str()));
    }
    if let Some(caps) = time {
        parsed.response_time_ms = parse_ms(&caps[1]);
    }
    Some(LineKind::Response(parsed))
}

fn duration(line: &str, _ctx: &LineContext) -> Option<LineKind> {
    STEP_DURATION
        .captures(line)
        .and_then(|caps| parse_ms(&caps[1]))
        .map(LineKind::Duration)
}

fn export(line: &str, _ctx: &LineContext) -> Option<LineKind> {
    let caps = EXPORT.captures(line)?;
    let raw = caps[2].to_string();
    let (raw_value, reference) = match EXPORT_REFERENCE.captures(&raw) {
        Some(r) => (r[1].to_string(), Some(r[2].to_string())),
        None => (raw, None),
    };
    Some(LineKind::Export(ExportLine {
        name: caps[1].to_string(),
        raw_value,
        reference,
    }))
}

fn split_source(raw: &str) -> (String, String) {
    if let Some(caps) = SOURCE_PAREN.captures(raw) {
        return (caps[1].trim().to_string(), caps[2].to_string());
    }
    if let Some(caps) = SOURCE_ARROW.captures(raw) {
        return (caps[1].trim().to_string(), caps[2].to_string());
    }
    (raw.trim().to_string(), String::new())
}

fn scope_from(text: Option<&str>) -> VariableScope {
    match text.map(|s| s.to_ascii_lowercase()) {
        Some(s) if s == "global" => VariableScope::Global,
        _ => VariableScope::Local,
    }
}

fn explicit_capture(line: &str, _ctx: &LineContext) -> Option<LineKind> {
    let caps = CAPTURE.captures(line)?;
    let scope = scope_from(caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()));
    let (raw_value, source_expression) = split_source(&caps[4]);
    Some(LineKind::Capture(CaptureLine {
        name: caps[3].to_string(),
        raw_value,
        source_expression,
        scope,
    }))
}

fn section_header(line: &str, ctx: &LineContext) -> Option<LineKind> {
    if CAPTURE_SECTION.is_match(line) {
        return Some(LineKind::SectionHeader(Section::Captures));
    }
    if let Some(caps) = HEADERS_SECTION.captures(line) {
        let section = match caps.get(1).map(|m| m.as_str().to_ascii_lowercase()) {
            Some(s) if s == "request" => Section::Request,
            Some(_) => Section::Response,
            None => ctx.section,
        };
        return Some(LineKind::SectionHeader(section));
    }
    if let Some(caps) = BODY_PREFIX.captures(line) {
        if caps[2].is_empty() {
            let section = match caps.get(1).map(|m| m.as_str().to_ascii_lowercase()) {
                Some(s) if s == "request" => Section::Request,
                Some(_) => Section::Response,
                None => ctx.section,
            };
            return Some(LineKind::SectionHeader(section));
        }
    }
    None
}

fn capture_from(caps: &regex::Captures<'_>) -> LineKind {
    let (raw_value, source_expression) = split_source(&caps[2]);
    LineKind::Capture(CaptureLine {
        name: caps[1].to_string(),
        raw_value,
        source_expression,
        scope: VariableScope::Local,
    })
}

fn section_capture(line: &str, ctx: &LineContext) -> Option<LineKind> {
    if ctx.section != Section::Captures {
        return None;
    }
    SECTION_ASSIGNMENT
        .captures(line)
        .map(|caps| capture_from(&caps))
}

fn header(line: &str, ctx: &LineContext) -> Option<LineKind> {
    if !matches!(ctx.section, Section::Request | Section::Response) {
        return None;
    }
    HEADER
        .captures(line)
        .map(|caps| LineKind::Header(caps[1].to_string(), caps[2].to_string()))
}

fn body(line: &str, ctx: &LineContext) -> Option<LineKind> {
    if let Some(caps) = BODY_PREFIX.captures(line) {
        let target = caps.get(1).map(|m| {
            if m.as_str().eq_ignore_ascii_case("request") {
                Section::Request
            } else {
                Section::Response
            }
        });
        return Some(LineKind::Body(BodyLine {
            target,
            fragment: caps[2].to_string(),
        }));
    }

    if !matches!(ctx.section, Section::Request | Section::Response) {
        return None;
    }
    // a fragment opens the line or follows a `key:` label
    let trimmed = line.trim_start();
    let start = if trimmed.starts_with(['{', '[']) {
        0
    } else {
        let colon = trimmed.find(':')?;
        let rest = &trimmed[colon + 1..];
        let value = rest.trim_start();
        if !value.starts_with(['{', '[']) {
            return None;
        }
        colon + 1 + (rest.len() - value.len())
    };
    Some(LineKind::Body(BodyLine {
        target: None,
        fragment: trimmed[start..].to_string(),
    }))
}

fn assignment(line: &str, _ctx: &LineContext) -> Option<LineKind> {
    ASSIGNMENT.captures(line).map(|caps| capture_from(&caps))
}
