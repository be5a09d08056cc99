//! Evaluator execution for queued jobs.
//!
//! - [`EvaluatorExecutor`]: spawns the external evaluator with a timeout and
//!   captures its output
//! - [`outcome`]: classifies the raw process outcome and parses stdout
//!
//! The [`Executor`] trait is the seam between the runner and process
//! spawning; tests plug in canned outcomes there.

pub mod executor;
pub mod outcome;

pub use executor::{EvaluatorExecutor, ExecRequest, Executor, ProcessOutput, ProcessStatus};
