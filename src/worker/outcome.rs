//! Turns a raw evaluator outcome into the [`EvalResult`] handed to the submitter.
//!
//! Every branch is written to the audit log with the full captured output;
//! only the short failure message travels back in the result.

use num_bigint::BigInt;
use uuid::Uuid;

use crate::error::EvalFailure;
use crate::scheduler::EvalResult;
use crate::worker::executor::{signal_name, ProcessOutput, ProcessStatus};

/// Classify the process outcome and, on a clean exit, parse its stdout.
pub fn interpret(job_id: Uuid, output: ProcessOutput) -> EvalResult {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    let failure = match output.status {
        ProcessStatus::Exited(0) => match parse_stdout(&stdout) {
            Ok((weight, selected)) => {
                tracing::info!(
                    target: "audit",
                    event = "eval_queue.done",
                    job_id = %job_id,
                    weight = %weight,
                    charms = ?selected,
                    stdout = %stdout,
                    stderr = %stderr,
                );
                return EvalResult::Success { weight, selected };
            }
            Err(failure) => {
                tracing::info!(
                    target: "audit",
                    event = "eval_queue.parse.error",
                    job_id = %job_id,
                    stdout = %stdout,
                    stderr = %stderr,
                );
                failure
            }
        },
        ProcessStatus::Exited(code) => {
            tracing::info!(
                target: "audit",
                event = "eval_queue.spawn.error.exit",
                job_id = %job_id,
                code,
                stdout = %stdout,
                stderr = %stderr,
            );
            EvalFailure::ExitCode(code)
        }
        ProcessStatus::Signaled { signal, timed_out } => {
            let name = signal_name(signal);
            tracing::info!(
                target: "audit",
                event = "eval_queue.spawn.error.signal",
                job_id = %job_id,
                signal = %name,
                timed_out,
                stdout = %stdout,
                stderr = %stderr,
            );
            if timed_out {
                EvalFailure::Timeout
            } else {
                EvalFailure::Signal(name)
            }
        }
        ProcessStatus::SpawnFailed(message) => {
            tracing::info!(
                target: "audit",
                event = "eval_queue.spawn.error",
                job_id = %job_id,
                message = %message,
                stdout = %stdout,
                stderr = %stderr,
            );
            tracing::error!(job_id = %job_id, error = %message, "Evaluator failed to run");
            EvalFailure::Spawn(message)
        }
    };

    failure.into()
}

/// Parse evaluator stdout: the total weight on the first line, then one
/// selected charm index per line. A single bad line rejects the whole output.
pub fn parse_stdout(stdout: &str) -> Result<(BigInt, Vec<usize>), EvalFailure> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(EvalFailure::IllegalOutput);
    }

    let mut lines = trimmed.split('\n').map(str::trim);
    let first = lines.next().ok_or(EvalFailure::IllegalOutput)?;
    // BigInt's parser accepts `_` digit separators; the evaluator never emits them
    if first.contains('_') {
        return Err(EvalFailure::OutputParse);
    }
    let weight = first
        .parse::<BigInt>()
        .map_err(|_| EvalFailure::OutputParse)?;

    let selected = lines
        .map(|line| line.parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| EvalFailure::OutputParse)?;

    Ok((weight, selected))
}
