pub mod job;
pub mod queue;

pub use job::{ConfigRef, EvalResult, Job, JobRequest, RunningJob};
pub use queue::BlockingQueue;
