use super::*;
use crate::core::VariableScope;
use chrono::{Duration, TimeZone};
use proptest::prelude::*;
use serde_json::json;
use std::sync::atomic::{AtomicI64, Ordering};

fn fixed_clock() -> Clock {
    let instant = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    Arc::new(move || instant)
}

/// Advances 250 ms on every read
fn ticking_clock() -> Clock {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let ticks = Arc::new(AtomicI64::new(0));
    Arc::new(move || base + Duration::milliseconds(250 * ticks.fetch_add(1, Ordering::SeqCst)))
}

fn parse(lines: &[&str]) -> Vec<StepRecord> {
    let mut parser = StreamParser::new().with_clock(fixed_clock());
    for line in lines {
        parser.add_line(line);
    }
    parser.get_steps()
}

#[test]
fn test_create_user_scenario() {
    let steps = parse(&[
        "[STEP 1/2] Create user",
        "POST https://api.example.com/users",
        "Status: 201",
        "✓ status_code: expected 201, got 201",
    ]);

    assert_eq!(steps.len(), 1);
    let step = &steps[0];
    assert_eq!(step.name, "Create user");
    assert_eq!(step.index, Some(1));
    assert_eq!(step.status, StepStatus::Passed);

    let request = step.request.as_ref().unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.url, "https://api.example.com/users");
    assert!(request.query_params.is_empty());

    assert_eq!(step.response.as_ref().unwrap().status_code, 201);
    assert_eq!(step.assertions.len(), 1);
    assert!(step.assertions[0].passed);
    assert_eq!(step.passed_assertions(), 1);
}

#[test]
fn test_next_step_start_finalizes_previous() {
    let mut parser = StreamParser::new().with_clock(fixed_clock());
    parser.add_line("[STEP 1/2] Create user");
    parser.add_line("POST https://api.example.com/users");
    assert_eq!(parser.completed_count(), 0);
    assert!(parser.is_step_open());

    parser.add_line("[STEP 2/2] Fetch user");
    assert_eq!(parser.completed_count(), 1);
    assert_eq!(parser.steps()[0].name, "Create user");
    assert_eq!(parser.declared_total(), Some(2));

    let steps = parser.get_steps();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[1].name, "Fetch user");
    assert!(!parser.is_step_open());
}

#[test]
fn test_failed_assertion_fails_step() {
    let steps = parse(&[
        "▶ Step 1: Fetch user",
        "GET https://api.example.com/users/1",
        "Status: 200 OK",
        "✓ status_code: expected 200, got 200",
        r#"✗ body.name: expected "Bob", got "Alice""#,
    ]);

    assert_eq!(steps[0].status, StepStatus::Failed);
    assert_eq!(steps[0].failed_assertions(), 1);
    assert_eq!(steps[0].assertions[1].expected, "Bob");
    assert_eq!(steps[0].assertions[1].actual, "Alice");
}

#[test]
fn test_zero_assertions_follow_policy() {
    let lines = ["Running step: Warm up", "GET /health", "Status: 204"];
    assert_eq!(parse(&lines)[0].status, StepStatus::Passed);

    let mut parser = StreamParser::with_options(ParserOptions {
        empty_step_status: StepStatus::Skipped,
        ..Default::default()
    });
    for line in lines {
        parser.add_line(line);
    }
    assert_eq!(parser.get_steps()[0].status, StepStatus::Skipped);
}

#[test]
fn test_explicit_skip_marker() {
    let steps = parse(&[
        "[STEP 1/2] Delete user",
        "⊘ Skipped: depends on Create user",
        "[STEP 2/2] Cleanup",
        "Step skipped",
    ]);

    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].status, StepStatus::Skipped);
    assert_eq!(steps[1].status, StepStatus::Skipped);
}

#[test]
fn test_get_steps_is_idempotent() {
    let mut parser = StreamParser::new();
    parser.add_line("[STEP 1/1] Create user");
    parser.add_line("✓ status_code: expected 201, got 201");

    let first = parser.get_steps();
    let second = parser.get_steps();
    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
}

#[test]
fn test_lines_outside_steps_are_ignored() {
    let steps = parse(&[
        "apitest v2.1.0",
        "GET https://api.example.com/ignored",
        "✓ status_code: expected 200, got 200",
        "Step completed",
        "[STEP 1/1] Only step",
    ]);

    assert_eq!(steps.len(), 1);
    assert!(steps[0].request.is_none());
    assert!(steps[0].assertions.is_empty());
}

#[test]
fn test_explicit_close_markers() {
    let mut parser = StreamParser::new().with_clock(fixed_clock());
    parser.add_line("[STEP 1/3] Login");
    parser.add_line("✓ PASSED (45ms)");
    assert_eq!(parser.completed_count(), 1);

    parser.add_line("[STEP 2/3] Fetch profile");
    parser.add_line("Step failed: connection reset (120 ms)");
    parser.add_line("[STEP 3/3] Logout");
    parser.add_line("✗");

    let steps = parser.get_steps();
    assert_eq!(steps[0].status, StepStatus::Passed);
    assert_eq!(steps[0].duration_ms, 45);
    assert_eq!(steps[1].status, StepStatus::Failed);
    assert_eq!(steps[1].error.as_deref(), Some("connection reset"));
    assert_eq!(steps[1].duration_ms, 120);
    assert_eq!(steps[2].status, StepStatus::Failed);
}

#[test]
fn test_error_line_fails_step() {
    let steps = parse(&[
        "[STEP 1/1] Fetch user",
        "GET https://api.example.com/users/1",
        "✗ Error: connection refused",
    ]);

    assert_eq!(steps[0].status, StepStatus::Failed);
    assert_eq!(steps[0].error.as_deref(), Some("connection refused"));
}

#[test]
fn test_duration_from_clock_and_override() {
    let mut parser = StreamParser::new().with_clock(ticking_clock());
    parser.add_line("[STEP 1/2] First");
    parser.add_line("[STEP 2/2] Second");
    parser.add_line("Duration: 900 ms");

    let steps = parser.get_steps();
    assert_eq!(steps[0].duration_ms, 250);
    assert_eq!(steps[0].ended_at - steps[0].started_at, Duration::milliseconds(250));
    assert_eq!(steps[1].duration_ms, 900);
}

#[test]
fn test_request_and_response_details() {
    let steps = parse(&[
        "[STEP 1/1] Get user",
        "GET https://api.example.com/users/1?expand=roles&verbose=true",
        "  Accept: application/json",
        "  X-Request-Id: abc-123",
        "Status: 200 OK | Response time: 35 ms",
        "Headers:",
        "  Content-Type: application/json",
        "Body: {",
        r#"  "id": 1,"#,
        r#"  "name": "Bob","#,
        r#"  "tags": ["a", "}"]"#,
        "}",
        "✓ body.id equals 1",
    ]);

    let step = &steps[0];
    let request = step.request.as_ref().unwrap();
    assert_eq!(request.method, "GET");
    assert_eq!(
        request.headers.keys().collect::<Vec<_>>(),
        vec!["Accept", "X-Request-Id"]
    );
    assert_eq!(request.query_params.get("expand").map(String::as_str), Some("roles"));
    assert_eq!(request.query_params.get("verbose").map(String::as_str), Some("true"));

    let response = step.response.as_ref().unwrap();
    assert_eq!(response.status_code, 200);
    assert_eq!(response.status_text, "OK");
    assert_eq!(response.response_time_ms, 35);
    assert_eq!(response.content_type, "application/json");
    assert_eq!(
        response.body,
        json!({"id": 1, "name": "Bob", "tags": ["a", "}"]})
    );

    assert_eq!(step.assertions.len(), 1);
    assert_eq!(step.assertions[0].path, "body.id");
    assert_eq!(step.status, StepStatus::Passed);
}

#[test]
fn test_inline_request_body() {
    let steps = parse(&[
        "[STEP 1/1] Create user",
        r#"POST https://api.example.com/users {"name": "Bob", "age": 30}"#,
    ]);
    assert_eq!(
        steps[0].request.as_ref().unwrap().body,
        Some(json!({"name": "Bob", "age": 30}))
    );
}

#[test]
fn test_malformed_body_kept_as_text() {
    let steps = parse(&[
        "[STEP 1/2] Broken",
        "Status: 500",
        r#"Response body: {"error": oops}"#,
        "[STEP 2/2] Unterminated",
        "Status: 200",
        r#"Body: {"id": 7,"#,
    ]);

    assert_eq!(steps.len(), 2);
    assert_eq!(
        steps[0].response.as_ref().unwrap().body,
        json!(r#"{"error": oops}"#)
    );
    assert_eq!(
        steps[1].response.as_ref().unwrap().body,
        json!(r#"{"id": 7,"#)
    );
}

#[test]
fn test_body_line_cap_falls_back_to_raw_text() {
    let mut parser = StreamParser::with_options(ParserOptions {
        max_body_lines: 3,
        ..Default::default()
    });
    for line in [
        "[STEP 1/1] Big",
        "Status: 200",
        "Body: {",
        r#"  "a": 1,"#,
        r#"  "b": 2,"#,
        "✓ status_code: expected 200, got 200",
    ] {
        parser.add_line(line);
    }

    let steps = parser.get_steps();
    let body = &steps[0].response.as_ref().unwrap().body;
    assert!(body.is_string());
    assert_eq!(steps[0].assertions.len(), 1);
}

#[test]
fn test_step_start_interrupts_pending_body() {
    let steps = parse(&[
        "[STEP 1/2] First",
        "Status: 200",
        "Body: {",
        r#"  "partial": true,"#,
        "[STEP 2/2] Second",
    ]);

    assert_eq!(steps.len(), 2);
    assert!(steps[0].response.as_ref().unwrap().body.is_string());
    assert_eq!(steps[1].name, "Second");
}

#[test]
fn test_unterminated_body_does_not_hide_later_lines() {
    let steps = parse(&[
        "[STEP 1/1] Broken body",
        "Status: 500",
        r#"Response body: {"error": "boom""#,
        "✗ status_code: expected 200, got 500",
        "Captured: user_id = 42",
    ]);

    assert_eq!(steps.len(), 1);
    let step = &steps[0];
    assert_eq!(step.status, StepStatus::Failed);
    assert_eq!(step.assertions.len(), 1);
    assert!(!step.assertions[0].passed);
    assert_eq!(step.captured.len(), 1);
    assert_eq!(step.captured[0].name, "user_id");
    assert_eq!(
        step.response.as_ref().unwrap().body,
        json!(r#"{"error": "boom""#)
    );
}

#[test]
fn test_template_braces_in_prose_are_not_a_body() {
    let steps = parse(&[
        "[STEP 1/1] Fetch",
        "Status: 200",
        r#"Response body: {"id": 1}"#,
        "Using {{base_url}} template",
        "✓ status_code: expected 200, got 200",
    ]);

    assert_eq!(steps[0].status, StepStatus::Passed);
    assert_eq!(steps[0].response.as_ref().unwrap().body, json!({"id": 1}));
}

#[test]
fn test_captures_and_exports() {
    let steps = parse(&[
        "[STEP 1/2] Login (id: login)",
        r#"POST https://api.example.com/login {"user": "bob"}"#,
        "Status: 200",
        r#"Captured: token = "abc123" (from body.token)"#,
        "Captured (global): tenant = acme",
        "Captured variables:",
        "  user_id: 42",
        r#"Exported session = "xyz""#,
        "[STEP 2/2] Create user",
        "Export user_id = 7",
        "Exported admin = true as {{shared.admin}}",
    ]);

    let login = &steps[0];
    assert_eq!(login.id.as_deref(), Some("login"));
    assert_eq!(login.captured.len(), 3);
    assert_eq!(login.captured[0].name, "token");
    assert_eq!(login.captured[0].value, json!("abc123"));
    assert_eq!(login.captured[0].source_expression, "body.token");
    assert_eq!(login.captured[1].scope, VariableScope::Global);
    assert_eq!(login.captured[2].name, "user_id");
    assert_eq!(login.captured[2].value, json!(42));
    assert_eq!(login.exported[0].value, json!("xyz"));
    assert_eq!(login.exported[0].reference_handle, "{{login.session}}");

    let create = &steps[1];
    assert_eq!(create.exported[0].reference_handle, "{{create_user.user_id}}");
    assert_eq!(create.exported[0].value, json!(7));
    assert_eq!(create.exported[1].reference_handle, "{{shared.admin}}");
    assert_eq!(create.exported[1].value, json!(true));
}

#[test]
fn test_ansi_sequences_are_stripped() {
    let steps = parse(&[
        "\x1b[1m[STEP 1/1] Colored\x1b[0m",
        "\x1b[32m✓\x1b[0m status_code: expected 200, got 200",
    ]);
    assert_eq!(steps[0].name, "Colored");
    assert_eq!(steps[0].assertions.len(), 1);
}

#[test]
fn test_push_chunk_buffers_partial_lines() {
    let mut parser = StreamParser::new().with_clock(fixed_clock());
    parser.push_chunk("[STEP 1/2] Create us");
    assert!(!parser.is_step_open());
    parser.push_chunk("er\r\nPOST https://api.example.com/users\n[STEP 2/2] Fe");
    assert!(parser.is_step_open());
    assert_eq!(parser.completed_count(), 0);
    parser.push_chunk("tch user");

    let steps = parser.get_steps();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].name, "Create user");
    assert_eq!(steps[1].name, "Fetch user");
}

#[test]
fn test_reset_clears_everything() {
    let mut parser = StreamParser::new();
    parser.add_line("[STEP 1/4] One");
    parser.add_line("[STEP 2/4] Two");
    parser.push_chunk("[STEP 3/4] Thr");
    parser.reset();

    assert_eq!(parser.completed_count(), 0);
    assert_eq!(parser.declared_total(), None);
    assert!(parser.get_steps().is_empty());
}

#[test]
fn test_embedded_newlines_split_into_lines() {
    let mut batch = StreamParser::new().with_clock(fixed_clock());
    batch.add_line("[STEP 1/1] Create user\nPOST https://api.example.com/users\nStatus: 201");

    let incremental = parse(&[
        "[STEP 1/1] Create user",
        "POST https://api.example.com/users",
        "Status: 201",
    ]);
    assert_eq!(batch.get_steps(), incremental);
}

const ENRICHMENT: &[&str] = &[
    "POST https://api.example.com/users",
    "GET /users?page=2",
    "Status: 200 OK",
    "Response time: 12 ms",
    "✓ status_code: expected 200, got 200",
    r#"✗ body.name: expected "Bob", got "Alice""#,
    "Captured: user_id = 42",
    r#"Exported token = "abc""#,
    r#"Body: {"id": 1}"#,
    "progress: 50%",
    "Step completed",
];

fn step_start_line(form: usize, position: usize) -> String {
    match form % 3 {
        0 => format!("[STEP {}/9] Step number {}", position, position),
        1 => format!("▶ Step {}: Step number {}", position, position),
        _ => format!("Running step: Step number {}", position),
    }
}

fn script() -> impl Strategy<Value = (Vec<String>, usize)> {
    prop::collection::vec(
        (0usize..3, prop::collection::vec(0..ENRICHMENT.len(), 0..6)),
        0..6,
    )
    .prop_map(|steps| {
        let mut lines = vec!["apitest starting".to_string()];
        for (position, (form, enrichment)) in steps.iter().enumerate() {
            lines.push(step_start_line(*form, position + 1));
            lines.extend(enrichment.iter().map(|i| ENRICHMENT[*i].to_string()));
        }
        (lines, steps.len())
    })
}

proptest! {
    #[test]
    fn prop_chunked_lines_match_line_at_a_time(
        (lines, k) in script(),
        groups in prop::collection::vec(1usize..4, 1..12),
    ) {
        let mut single = StreamParser::new().with_clock(fixed_clock());
        for line in &lines {
            single.add_line(line);
        }
        let expected = single.get_steps();
        prop_assert_eq!(expected.len(), k);

        let mut chunked = StreamParser::new().with_clock(fixed_clock());
        let mut rest = lines.as_slice();
        let mut sizes = groups.iter().cycle();
        while !rest.is_empty() {
            let size = (*sizes.next().unwrap()).min(rest.len());
            chunked.add_line(&rest[..size].join("\n"));
            rest = &rest[size..];
        }
        prop_assert_eq!(chunked.get_steps(), expected);
    }

    #[test]
    fn prop_byte_chunks_match_whole_text(
        (lines, k) in script(),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
    ) {
        let text = lines.join("\n");

        let mut whole = StreamParser::new().with_clock(fixed_clock());
        whole.add_line(&text);
        let expected = whole.get_steps();
        prop_assert_eq!(expected.len(), k);

        let boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        let mut points: Vec<usize> = if boundaries.is_empty() {
            Vec::new()
        } else {
            cuts.iter().map(|c| *c.get(&boundaries)).collect()
        };
        points.sort_unstable();
        points.dedup();

        let mut streamed = StreamParser::new().with_clock(fixed_clock());
        let mut last = 0;
        for point in points {
            streamed.push_chunk(&text[last..point]);
            last = point;
        }
        streamed.push_chunk(&text[last..]);
        prop_assert_eq!(streamed.get_steps(), expected);
    }

    #[test]
    fn prop_any_failed_assertion_fails_step(passing in 0usize..4, failing in 1usize..3) {
        let mut parser = StreamParser::new();
        parser.add_line("[STEP 1/1] Checks");
        for _ in 0..passing {
            parser.add_line("✓ status_code: expected 200, got 200");
        }
        for _ in 0..failing {
            parser.add_line("✗ status_code: expected 200, got 500");
        }
        let steps = parser.get_steps();
        prop_assert_eq!(steps[0].status, StepStatus::Failed);
        prop_assert_eq!(steps[0].assertions.len(), passing + failing);
    }
}
