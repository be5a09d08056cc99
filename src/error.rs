use thiserror::Error;

/// Terminal failure of a single evaluation job.
///
/// The `Display` text is what the submitter sees; raw diagnostics
/// (stdout/stderr, exit status) only go to the audit log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalFailure {
    #[error("Exited with code {0}.")]
    ExitCode(i32),

    #[error("Task timed out (try fewer charms?).")]
    Timeout,

    #[error("Signal received: {0}, please report.")]
    Signal(String),

    #[error("Failed with error: {0}.")]
    Spawn(String),

    #[error("Internal error: illegal output from charm evaluator")]
    IllegalOutput,

    #[error("Internal error.")]
    OutputParse,

    #[error("Internal error.")]
    Internal(String),
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid weight argument {0:?}, expected name=value")]
    InvalidWeight(String),
}

pub type Result<T> = std::result::Result<T, QueueError>;
