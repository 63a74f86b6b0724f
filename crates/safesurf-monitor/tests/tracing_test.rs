#![allow(clippy::unwrap_used)]
use std::io::BufRead;
use std::sync::Arc;

use safesurf_backend::{RetryPolicy, RiskClassifierClient};
use safesurf_core::fakes::FakeBackend;
use safesurf_core::{ReputationBackend, RiskLevel};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;

fn read_lines(path: &std::path::Path) -> Vec<serde_json::Value> {
    let file = std::fs::File::open(path).unwrap();
    std::io::BufReader::new(file)
        .lines()
        .map(|l| l.unwrap())
        .filter(|l| !l.is_empty())
        .map(|line| {
            serde_json::from_str(&line).unwrap_or_else(|e| panic!("invalid JSON: {e}\nline: {line}"))
        })
        .collect()
}

/// The JSONL layer as the binary configures it produces valid JSON with
/// span context.
#[test]
fn jsonl_layer_produces_valid_json() {
    let dir = tempfile::tempdir().unwrap();
    let trace_file = dir.path().join("test-traces.jsonl");

    let file_appender = tracing_appender::rolling::never(dir.path(), "test-traces.jsonl");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let jsonl_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_span_list(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    let subscriber = tracing_subscriber::Registry::default().with(jsonl_layer);

    tracing::subscriber::with_default(subscriber, || {
        let span = tracing::info_span!("navigation_check", destination = "tab:1");
        let _enter = span.enter();
        tracing::info!(attempt = 1, "test event");
    });

    drop(guard);

    let lines = read_lines(&trace_file);
    assert!(lines.len() >= 2, "expected at least 2 JSONL lines, got {}", lines.len());
    for line in &lines {
        assert!(line.get("timestamp").is_some(), "missing timestamp");
        assert!(line.get("level").is_some(), "missing level");
    }

    let event = lines
        .iter()
        .find(|l| l["fields"]["message"] == "test event")
        .expect("missing 'test event' line");
    assert_eq!(event["fields"]["attempt"], 1);
    assert_eq!(event["spans"][0]["name"], "navigation_check");
    assert_eq!(event["spans"][0]["destination"], "tab:1");
}

/// A failing classification leaves a warn line per attempt inside the
/// `classify` span.
#[tokio::test(start_paused = true)]
async fn classification_retries_are_traced() {
    let dir = tempfile::tempdir().unwrap();
    let trace_file = dir.path().join("traces.jsonl");

    let file_appender = tracing_appender::rolling::never(dir.path(), "traces.jsonl");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let jsonl_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_span_list(true)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_filter(tracing_subscriber::EnvFilter::new("debug"));

    let subscriber = tracing_subscriber::Registry::default().with(jsonl_layer);
    let dispatch = tracing::dispatcher::Dispatch::new(subscriber);
    let default_guard = tracing::dispatcher::set_default(&dispatch);

    let backend = Arc::new(FakeBackend::responding(2, "Known phishing"));
    backend.push_failure();
    let classifier = RiskClassifierClient::new(
        Arc::clone(&backend) as Arc<dyn ReputationBackend>,
        RetryPolicy::default(),
    );
    let verdict = classifier.classify("http://evil.test").await;
    assert_eq!(verdict.risk, RiskLevel::Risky);

    drop(default_guard);
    drop(guard);

    let lines = read_lines(&trace_file);
    let failure = lines
        .iter()
        .find(|l| l["fields"]["message"] == "classification attempt failed")
        .expect("missing retry warning");
    assert_eq!(failure["level"], "WARN");
    assert_eq!(failure["fields"]["attempt"], 1);
    assert_eq!(failure["spans"][0]["name"], "classify");
    assert_eq!(failure["spans"][0]["url"], "http://evil.test");

    assert!(
        lines
            .iter()
            .any(|l| l["fields"]["message"] == "classification received"),
        "missing success line"
    );
}
