//! Terminal rendering for steps, logs and run summaries

use colored::{ColoredString, Colorize};
use serde::Serialize;

use crate::cli::error::Result;
use crate::core::types::{LogLevel, StepRecord, StepStatus};
use crate::runtime::aggregator::AggregatedView;

/// Status symbol colored by outcome
pub fn status_mark(status: StepStatus) -> ColoredString {
    match status {
        StepStatus::Passed => "✓".green(),
        StepStatus::Failed => "✗".red(),
        StepStatus::Skipped => "⊘".yellow(),
    }
}

/// One finished step, with its failed assertions and error indented below
pub fn format_step(position: usize, total: usize, step: &StepRecord) -> String {
    let mut line = format!(
        "{} {} {}",
        format!("[{}/{}]", position, total).dimmed(),
        status_mark(step.status),
        step.name.bold()
    );

    let mut details = Vec::new();
    if let Some(request) = &step.request {
        details.push(format!("{} {}", request.method, request.url));
    }
    if let Some(response) = &step.response {
        details.push(response.status_code.to_string());
    }
    details.push(format!("{}ms", step.duration_ms));
    line.push_str(&format!(" {}", format!("({})", details.join(", ")).dimmed()));

    for assertion in step.assertions.iter().filter(|a| !a.passed) {
        let text = assertion
            .message
            .clone()
            .unwrap_or_else(|| {
                format!(
                    "{}: expected {}, got {}",
                    assertion.path, assertion.expected, assertion.actual
                )
            });
        line.push_str(&format!("\n    {} {}", "✗".red(), text));
    }
    if let Some(error) = &step.error {
        line.push_str(&format!("\n    {} {}", "error:".red().bold(), error));
    }
    line
}

/// Raw tool output echoed with `--stream-logs`
pub fn format_log(level: LogLevel, message: &str) -> String {
    match level {
        LogLevel::Info => format!("  {} {}", "│".dimmed(), message),
        LogLevel::Warn => format!("  {} {}", "│".yellow(), message.yellow()),
        LogLevel::Error => format!("  {} {}", "│".red(), message.red()),
    }
}

/// Closing line of a run
pub fn format_summary(view: &AggregatedView) -> String {
    let total = view.steps.len();
    let failed = view.failed_steps();
    let skipped = view
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Skipped)
        .count();
    let passed = total - failed - skipped;

    let counts = format!(
        "{} passed, {} failed, {} skipped",
        passed.to_string().green(),
        failed.to_string().red(),
        skipped.to_string().yellow()
    );
    let duration = view
        .terminal_result
        .as_ref()
        .map(|r| format!(" in {}ms", r.duration_ms))
        .unwrap_or_default();

    let mut summary = if view.passed() {
        format!("{} {}{}", "PASSED".green().bold(), counts, duration)
    } else {
        format!("{} {}{}", "FAILED".red().bold(), counts, duration)
    };
    if let Some(error) = &view.last_error {
        summary.push_str(&format!("\n{}", error.red()));
    }
    summary
}

/// Steps rebuilt from a captured log
pub fn format_steps(steps: &[StepRecord]) -> String {
    let total = steps.len();
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| format_step(i + 1, total, step))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pretty JSON on stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
