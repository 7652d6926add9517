//! Integration tests for codeswitch-bench CLI and library.
//!
//! These tests verify end-to-end functionality including:
//! - CLI commands work correctly
//! - A full run writes one record per pair to disk
//! - Result files feed the report
//! - The shipped stimulus set and run config are valid

// Allow less strict lints for test code
#![allow(clippy::needless_raw_string_hashes)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unwrap_used)]

use codeswitch_bench::{
    read_records, AdapterError, BatchRunner, ErrorKind, MarkerLexicon, ModelAdapter, ModelConfig,
    OpenMode, PromptTemplates, Provider, RecordSink, ResultStore, RetryPolicy, RunConfig,
    RunReport, RunnerConfig, StatConfig, StimulusSet, Target, Variety,
};
use std::cell::Cell;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::process::Command;
use std::thread;
use std::time::Duration;

// ============================================================================
// Helpers
// ============================================================================

/// Adapter that echoes the stimulus back, failing with `fail` on chosen calls
struct EchoAdapter {
    calls: Cell<usize>,
    fail_on: Vec<usize>,
    fail: ErrorKind,
}

impl EchoAdapter {
    fn new() -> Self {
        Self {
            calls: Cell::new(0),
            fail_on: Vec::new(),
            fail: ErrorKind::Provider,
        }
    }

    fn failing(kind: ErrorKind, calls: Vec<usize>) -> Self {
        Self {
            calls: Cell::new(0),
            fail_on: calls,
            fail: kind,
        }
    }
}

impl ModelAdapter for EchoAdapter {
    fn name(&self) -> &str {
        "echo"
    }

    fn generate(&self, prompt: &str, _config: &ModelConfig) -> Result<String, AdapterError> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        if self.fail_on.contains(&call) {
            return Err(AdapterError::new(self.fail, "echo", "scripted failure"));
        }
        // Templates end with the stimulus text after a colon
        Ok(prompt.rsplit(": ").next().unwrap_or(prompt).to_string())
    }
}

fn test_runner() -> BatchRunner {
    BatchRunner::new(
        RunnerConfig {
            run_id: "integration".to_string(),
            retry: RetryPolicy::immediate(3, 2),
            pace: Duration::ZERO,
            task_types: None,
            prompts: PromptTemplates::default(),
        },
        MarkerLexicon::default(),
    )
}

fn shipped_stimuli() -> StimulusSet {
    StimulusSet::load("data/stimuli.csv").unwrap()
}

/// Serve `count` connections with a fixed chat-completions reply
fn serve_chat_completions(count: usize, content: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let body = format!(
        r#"{{"choices":[{{"message":{{"role":"assistant","content":"{}"}},"finish_reason":"stop"}}]}}"#,
        content
    );

    thread::spawn(move || {
        for _ in 0..count {
            let Ok((stream, _)) = listener.accept() else {
                return;
            };
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    break;
                }
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((k, v)) = line.split_once(':') {
                    if k.eq_ignore_ascii_case("content-length") {
                        content_length = v.trim().parse().unwrap_or(0);
                    }
                }
            }
            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).ok();

            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let mut stream = stream;
            stream.write_all(response.as_bytes()).ok();
            stream.flush().ok();
        }
    });

    format!("http://{addr}")
}

// ============================================================================
// CLI Integration Tests
// ============================================================================

#[test]
fn test_cli_help_command() {
    let output = Command::new("cargo")
        .args(["run", "--quiet", "--", "--help"])
        .output()
        .expect("Failed to execute CLI");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("codeswitch-bench"),
        "Help should mention project name"
    );
    assert!(stdout.contains("run"), "Help should list run command");
    assert!(stdout.contains("report"), "Help should list report command");
}

#[test]
fn test_cli_stimuli_command() {
    let output = Command::new("cargo")
        .args(["run", "--quiet", "--", "stimuli", "--path", "data/stimuli.csv"])
        .output()
        .expect("Failed to execute CLI");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stimuli failed: {}", stdout);
    assert!(stdout.contains("Total stimuli: 12"));
    assert!(stdout.contains("AAVE: 3"));
}

#[test]
fn test_cli_run_missing_config_fails() {
    let temp_dir = tempfile::tempdir().unwrap();
    let output = Command::new("cargo")
        .args([
            "run",
            "--quiet",
            "--",
            "run",
            "--config",
            temp_dir.path().join("missing.yaml").to_str().unwrap(),
            "--output",
            temp_dir.path().join("out.csv").to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to load config"), "stderr: {}", stderr);
}

#[test]
fn test_cli_run_missing_api_key_fails_before_any_call() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = temp_dir.path().join("run.yaml");
    std::fs::write(
        &config,
        "models:\n  - name: m\n    provider: mistral\n    api_key_env: CODESWITCH_TEST_UNSET_KEY\n",
    )
    .unwrap();
    let results = temp_dir.path().join("out.csv");

    let output = Command::new("cargo")
        .args([
            "run",
            "--quiet",
            "--",
            "run",
            "--config",
            config.to_str().unwrap(),
            "--output",
            results.to_str().unwrap(),
        ])
        .env_remove("CODESWITCH_TEST_UNSET_KEY")
        .output()
        .expect("Failed to execute CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("CODESWITCH_TEST_UNSET_KEY"), "stderr: {}", stderr);
    assert!(!results.exists());
}

#[test]
fn test_cli_run_skip_missing_keys_runs_remaining_models() {
    let stimuli = shipped_stimuli();
    let base_url = serve_chat_completions(stimuli.len(), "He finna head out real quick.");

    let temp_dir = tempfile::tempdir().unwrap();
    let config = temp_dir.path().join("run.yaml");
    std::fs::write(
        &config,
        format!(
            "models:\n  - name: keyless\n    provider: cohere\n    api_key_env: CODESWITCH_TEST_UNSET_KEY\n  - name: local\n    provider: mistral\n    api_key_env: CODESWITCH_TEST_KEY\n    base_url: {base_url}\nrequest:\n  timeout_ms: 5000\n  pace_ms: 0\n"
        ),
    )
    .unwrap();
    let results = temp_dir.path().join("out.csv");

    let output = Command::new("cargo")
        .args([
            "run",
            "--quiet",
            "--",
            "run",
            "--config",
            config.to_str().unwrap(),
            "--output",
            results.to_str().unwrap(),
            "--skip-missing-keys",
        ])
        .env("CODESWITCH_TEST_KEY", "local-key")
        .env_remove("CODESWITCH_TEST_UNSET_KEY")
        .output()
        .expect("Failed to execute CLI");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stderr: {}", stderr);
    assert!(stderr.contains("CODESWITCH_TEST_UNSET_KEY"), "stderr: {}", stderr);

    let records = read_records(&results).unwrap();
    assert_eq!(records.len(), 12);
    assert!(records.iter().all(|r| r.model == "local" && r.attempts == 1));
}

#[test]
fn test_cli_run_and_report_against_local_server() {
    let stimuli = shipped_stimuli();
    let base_url = serve_chat_completions(stimuli.len(), "He finna head out real quick.");

    let temp_dir = tempfile::tempdir().unwrap();
    let config = temp_dir.path().join("run.yaml");
    std::fs::write(
        &config,
        format!(
            "models:\n  - name: local\n    provider: mistral\n    api_key_env: CODESWITCH_TEST_KEY\n    base_url: {base_url}\nrequest:\n  timeout_ms: 5000\n  pace_ms: 0\n"
        ),
    )
    .unwrap();
    let results = temp_dir.path().join("results/out.jsonl");

    let output = Command::new("cargo")
        .args([
            "run",
            "--quiet",
            "--",
            "run",
            "--config",
            config.to_str().unwrap(),
            "--stimuli",
            "data/stimuli.csv",
            "--output",
            results.to_str().unwrap(),
        ])
        .env("CODESWITCH_TEST_KEY", "local-key")
        .output()
        .expect("Failed to execute CLI");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "run failed: {} {}",
        stdout,
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("Successes: 12"));

    let records = read_records(&results).unwrap();
    assert_eq!(records.len(), 12);
    assert!(records.iter().all(|r| r.success && r.model == "local"));

    let report_path = temp_dir.path().join("report.md");
    let output = Command::new("cargo")
        .args([
            "run",
            "--quiet",
            "--",
            "report",
            "--input",
            results.to_str().unwrap(),
            "--output",
            report_path.to_str().unwrap(),
            "--bootstrap",
            "200",
        ])
        .output()
        .expect("Failed to execute CLI");
    assert!(output.status.success());
    let markdown = std::fs::read_to_string(&report_path).unwrap();
    assert!(markdown.contains("## Model Results"));
    assert!(markdown.contains("local"));
}

// ============================================================================
// Shipped Data Tests
// ============================================================================

#[test]
fn test_shipped_stimuli_are_balanced() {
    let stats = shipped_stimuli().stats();
    assert_eq!(stats.total, 12);
    for variety in Variety::ALL {
        assert_eq!(stats.by_variety.get(&variety), Some(&3), "{variety}");
    }
    assert_eq!(stats.with_markers, 9);
}

#[test]
fn test_shipped_config_is_valid() {
    let config = RunConfig::load("config/run.yaml").unwrap();
    let names: Vec<_> = config.models.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["gemini", "mistral", "cohere"]);
    assert!(config.marker_lexicon().is_ok());
}

#[test]
fn test_shipped_stimuli_markers_are_present_in_source() {
    let lexicon = MarkerLexicon::default();
    for stimulus in &shipped_stimuli() {
        let markers = lexicon.markers_for_stimulus(stimulus);
        let scores = codeswitch_bench::score(&stimulus.text, &stimulus.text, markers);
        if stimulus.variety == Variety::StdEng {
            assert_eq!(scores.marker_retention, None, "{}", stimulus.id);
        } else {
            assert_eq!(
                scores.markers_in_source,
                stimulus.markers.len(),
                "{} markers should all occur in its text",
                stimulus.id
            );
            assert_eq!(scores.marker_retention, Some(1.0));
        }
    }
}

// ============================================================================
// Library Workflow Tests
// ============================================================================

#[test]
fn test_full_run_to_csv_and_report() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("responses.csv");

    let stimuli = shipped_stimuli();
    let echo = EchoAdapter::new();
    let flaky = EchoAdapter::failing(ErrorKind::RateLimit, vec![1, 2, 3]);
    let targets = [
        Target::new(ModelConfig::new("echo", Provider::Gemini, "k"), &echo),
        Target::new(ModelConfig::new("flaky", Provider::Cohere, "k"), &flaky),
    ];

    let mut store = ResultStore::open(&path, OpenMode::Fresh).unwrap();
    let outcome = test_runner().run(&stimuli, &targets, &mut store).unwrap();
    drop(store);

    assert_eq!(outcome.records, 24);
    assert_eq!(outcome.failures, 1);

    let records = read_records(&path).unwrap();
    assert_eq!(records.len(), 24);
    assert_eq!(records[0].stimulus_id, "aave_01");
    assert_eq!(records[0].model, "echo");
    assert_eq!(records[1].model, "flaky");
    assert_eq!(records[1].error_kind, Some(ErrorKind::RateLimit));
    assert_eq!(records[1].retry_count, 2);

    // Echoed text keeps every marker
    let echoed = records.iter().find(|r| r.stimulus_id == "span_01" && r.model == "echo");
    assert_eq!(echoed.unwrap().marker_retention, Some(1.0));

    let report = RunReport::from_records(
        &records,
        &StatConfig {
            bootstrap_n: 200,
            ..StatConfig::default()
        },
    );
    assert_eq!(report.summary.total_records, 24);
    assert_eq!(report.models.len(), 2);
    assert_eq!(report.varieties.len(), 4);
    assert_eq!(report.models[1].errors.get("RateLimitError"), Some(&1));
}

#[test]
fn test_appending_runs_keeps_history() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("responses.jsonl");
    let stimuli = shipped_stimuli();

    for _ in 0..2 {
        let echo = EchoAdapter::new();
        let targets = [Target::new(ModelConfig::new("echo", Provider::Mistral, "k"), &echo)];
        let mut store = ResultStore::open(&path, OpenMode::Append).unwrap();
        test_runner().run(&stimuli, &targets, &mut store).unwrap();
    }

    assert_eq!(read_records(&path).unwrap().len(), 24);
}

#[test]
fn test_auth_failure_disables_model_across_run() {
    let stimuli = shipped_stimuli();
    let revoked = EchoAdapter::failing(ErrorKind::Auth, vec![1]);
    let targets = [Target::new(
        ModelConfig::new("revoked", Provider::Gemini, "k"),
        &revoked,
    )];

    let mut sink: Vec<codeswitch_bench::ResponseRecord> = Vec::new();
    let outcome = test_runner()
        .run(&stimuli, &targets, &mut sink as &mut dyn RecordSink)
        .unwrap();

    assert_eq!(revoked.calls.get(), 1);
    assert_eq!(outcome.failures, 12);
    assert!(sink
        .iter()
        .all(|r| r.error_kind == Some(ErrorKind::Auth) && r.retry_count == 0));
}
