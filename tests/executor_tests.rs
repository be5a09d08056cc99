//! Executor tests against real processes. Each test writes a small shell
//! script standing in for the evaluator binary.

mod common;

use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use num_bigint::BigInt;
use tempfile::TempDir;
use uuid::Uuid;

use common::job_request;
use mtce_queue::config::EvaluatorConfig;
use mtce_queue::scheduler::EvalResult;
use mtce_queue::worker::executor::evaluator_args;
use mtce_queue::worker::{EvaluatorExecutor, ExecRequest, Executor, ProcessStatus};
use mtce_queue::JobRunner;

/// Write an executable `/bin/sh` script into `dir`
fn write_script(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("mtce");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn test_executor(binary: &Path) -> EvaluatorExecutor {
    EvaluatorExecutor::new(
        EvaluatorConfig::new(binary)
            .with_timeout(Duration::from_secs(10))
            .with_kill_grace(Duration::from_millis(200)),
    )
}

fn failure_message(result: EvalResult) -> String {
    match result {
        EvalResult::Failure { message } => message,
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_arguments_reach_evaluator() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, r#"printf '%s\n' "$@""#);
    let executor = test_executor(&script);

    let weights = BTreeMap::from([
        ("attack_speed".to_string(), "10".to_string()),
        ("max_health".to_string(), "-2000000000".to_string()),
    ]);
    let input = dir.path().join("charms.txt");
    let request = ExecRequest {
        job_id: Uuid::new_v4(),
        input_path: &input,
        charm_power: 12,
        weights: &weights,
    };

    let output = executor.execute(request).await;

    assert_eq!(output.status, ProcessStatus::Exited(0));
    let stdout = String::from_utf8(output.stdout).unwrap();
    let received: Vec<&str> = stdout.lines().collect();
    assert_eq!(received, evaluator_args(&request));
    assert_eq!(received[0], "--bot-mode");
    assert_eq!(received[6], "10");
}

#[tokio::test]
async fn test_stderr_captured_on_failure() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "echo partial; echo 'bad charm line' >&2; exit 1");
    let executor = test_executor(&script);

    let weights = BTreeMap::new();
    let input = dir.path().join("charms.txt");
    let output = executor
        .execute(ExecRequest {
            job_id: Uuid::new_v4(),
            input_path: &input,
            charm_power: 15,
            weights: &weights,
        })
        .await;

    assert_eq!(output.status, ProcessStatus::Exited(1));
    assert_eq!(output.stdout, b"partial\n");
    assert_eq!(output.stderr, b"bad charm line\n");
}

#[tokio::test]
async fn test_end_to_end_reads_input_file() {
    let dir = TempDir::new().unwrap();
    // Weight is the number of charm lines; selection is reversed
    let script = write_script(&dir, r#"count=$(grep -c . "$3"); echo "$count"; echo 2; echo 0; echo 1"#);
    let runner = JobRunner::with_evaluator(
        EvaluatorConfig::new(&script).with_timeout(Duration::from_secs(10)),
    );

    let result = runner.submit(job_request("alice", 3)).await;

    assert_eq!(
        result,
        EvalResult::Success {
            weight: BigInt::from(3),
            selected: vec![2, 0, 1],
        }
    );
}

#[tokio::test]
async fn test_big_weight_from_evaluator() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "echo 123456789012345678901234567890; echo 0");
    let runner = JobRunner::with_evaluator(EvaluatorConfig::new(&script));

    let result = runner.submit(job_request("alice", 1)).await;

    assert_eq!(
        result,
        EvalResult::Success {
            weight: "123456789012345678901234567890".parse().unwrap(),
            selected: vec![0],
        }
    );
}

#[tokio::test]
async fn test_nonzero_exit_reports_code() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "exit 2");
    let runner = JobRunner::with_evaluator(EvaluatorConfig::new(&script));

    let message = failure_message(runner.submit(job_request("bob", 2)).await);

    assert!(message.contains('2'));
    assert_eq!(message, "Exited with code 2.");
}

#[tokio::test]
async fn test_empty_output_is_illegal() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "exit 0");
    let runner = JobRunner::with_evaluator(EvaluatorConfig::new(&script));

    let message = failure_message(runner.submit(job_request("bob", 2)).await);

    assert!(message.contains("illegal output"));
}

#[tokio::test]
async fn test_timeout_terminates_process() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "exec sleep 30");
    let runner = JobRunner::with_evaluator(
        EvaluatorConfig::new(&script)
            .with_timeout(Duration::from_millis(300))
            .with_kill_grace(Duration::from_millis(500)),
    );

    let start = Instant::now();
    let message = failure_message(runner.submit(job_request("carol", 40)).await);

    assert_eq!(message, "Task timed out (try fewer charms?).");
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_timeout_kills_process_ignoring_sigterm() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "trap '' TERM; exec sleep 30");
    let executor = EvaluatorExecutor::new(
        EvaluatorConfig::new(&script)
            .with_timeout(Duration::from_millis(200))
            .with_kill_grace(Duration::from_millis(200)),
    );

    let weights = BTreeMap::new();
    let input = dir.path().join("charms.txt");
    let start = Instant::now();
    let output = executor
        .execute(ExecRequest {
            job_id: Uuid::new_v4(),
            input_path: &input,
            charm_power: 15,
            weights: &weights,
        })
        .await;

    assert_eq!(
        output.status,
        ProcessStatus::Signaled {
            signal: 9,
            timed_out: true,
        }
    );
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_signal_reported_by_name() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "kill -9 $$");
    let runner = JobRunner::with_evaluator(EvaluatorConfig::new(&script));

    let message = failure_message(runner.submit(job_request("dave", 1)).await);

    assert_eq!(message, "Signal received: SIGKILL, please report.");
}

#[tokio::test]
async fn test_missing_binary_is_spawn_failure() {
    let dir = TempDir::new().unwrap();
    let runner = JobRunner::with_evaluator(EvaluatorConfig::new(dir.path().join("missing")));

    let message = failure_message(runner.submit(job_request("erin", 1)).await);

    assert!(message.starts_with("Failed with error: "));
}

#[tokio::test]
async fn test_non_executable_binary_is_spawn_failure() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mtce");
    std::fs::write(&path, "#!/bin/sh\necho 1\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
    let runner = JobRunner::with_evaluator(EvaluatorConfig::new(&path));

    let message = failure_message(runner.submit(job_request("frank", 1)).await);
    assert!(message.starts_with("Failed with error: "));

    // The runner keeps serving after a spawn failure
    let message = failure_message(runner.submit(job_request("frank", 1)).await);
    assert!(message.starts_with("Failed with error: "));
}
