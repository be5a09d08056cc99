use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use std::task::{Context, Poll};

use chrono::Utc;
use tempfile::NamedTempFile;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::config::EvaluatorConfig;
use crate::error::EvalFailure;
use crate::scheduler::{BlockingQueue, EvalResult, Job, JobRequest, RunningJob};
use crate::worker::outcome::interpret;
use crate::worker::{EvaluatorExecutor, ExecRequest, Executor};

/// A queued job together with the channel its result is delivered on.
#[derive(Debug)]
struct Submission {
    job: Job,
    reply: oneshot::Sender<EvalResult>,
}

/// Serializes evaluation jobs onto a single worker.
///
/// Exactly one background loop consumes the queue, so at most one evaluator
/// process runs at any time and jobs start in submission order. Cloning the
/// runner yields another handle to the same queue and loop.
#[derive(Debug, Clone)]
pub struct JobRunner {
    queue: Arc<BlockingQueue<Submission>>,
    running: Arc<RwLock<Option<RunningJob>>>,
}

impl JobRunner {
    /// Spawn the worker loop on the current tokio runtime.
    pub fn start(executor: Arc<dyn Executor>) -> Self {
        let runner = Self {
            queue: Arc::new(BlockingQueue::new()),
            running: Arc::new(RwLock::new(None)),
        };

        let queue = runner.queue.clone();
        let running = runner.running.clone();
        tokio::spawn(async move {
            Self::worker_loop(queue, running, executor).await;
        });

        runner
    }

    /// Start a runner backed by the real evaluator binary.
    pub fn with_evaluator(config: EvaluatorConfig) -> Self {
        Self::start(Arc::new(EvaluatorExecutor::new(config)))
    }

    /// Queue a job. The returned ticket resolves once with the job's result;
    /// the job is enqueued before this returns, whether or not the ticket is awaited.
    pub fn submit(&self, request: JobRequest) -> JobTicket {
        let job = Job::new(request);
        let id = job.id;
        let (reply, rx) = oneshot::channel();

        tracing::debug!(
            job_id = %id,
            creator = %job.creator,
            config = %job.config,
            charms = job.charms.len(),
            charm_power = job.charm_power,
            "Job queued"
        );
        self.queue.push(Submission { job, reply });

        JobTicket { id, rx }
    }

    /// The job currently being evaluated, if any. Introspection only; the
    /// answer can be stale as soon as it is returned.
    pub fn current_running(&self) -> Option<RunningJob> {
        self.running
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Jobs waiting to start, in submission order.
    pub fn pending_entries(&self) -> Vec<Job> {
        self.queue.snapshot_with(|submission| submission.job.clone())
    }

    fn set_running(running: &RwLock<Option<RunningJob>>, job: Option<RunningJob>) {
        *running.write().unwrap_or_else(PoisonError::into_inner) = job;
    }

    /// Worker loop, runs for the lifetime of the runtime.
    ///
    /// 1. **Waits** for the next submission
    /// 2. **Marks** it as the running job
    /// 3. **Executes** it in a separate task so a panic cannot stop the loop
    /// 4. **Delivers** the result and clears the running job
    async fn worker_loop(
        queue: Arc<BlockingQueue<Submission>>,
        running: Arc<RwLock<Option<RunningJob>>>,
        executor: Arc<dyn Executor>,
    ) {
        loop {
            let Submission { job, reply } = queue.poll().await;
            let job_id = job.id;

            let current = RunningJob::start(job.clone());
            let started_at = current.started_at;
            tracing::info!(
                job_id = %job_id,
                creator = %job.creator,
                config = %job.config,
                charms = job.charms.len(),
                queued_ms = (started_at - job.created_at).num_milliseconds(),
                "Starting job"
            );
            Self::set_running(&running, Some(current));

            let result = match tokio::spawn(run_job(executor.clone(), job)).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Job execution task failed");
                    EvalFailure::Internal(e.to_string()).into()
                }
            };

            Self::set_running(&running, None);
            tracing::info!(
                job_id = %job_id,
                success = result.is_success(),
                elapsed_ms = (Utc::now() - started_at).num_milliseconds(),
                "Job finished"
            );

            if reply.send(result).is_err() {
                tracing::debug!(job_id = %job_id, "Submitter stopped waiting for result");
            }
        }
    }
}

/// Write the input file, run the evaluator and interpret its output. The
/// input file is removed when it goes out of scope on every path.
async fn run_job(executor: Arc<dyn Executor>, job: Job) -> EvalResult {
    let input = match write_input_file(&job).await {
        Ok(input) => input,
        Err(e) => {
            tracing::error!(job_id = %job.id, error = %e, "Failed to write charm input file");
            return EvalFailure::Internal(e.to_string()).into();
        }
    };

    let output = executor
        .execute(ExecRequest {
            job_id: job.id,
            input_path: input.path(),
            charm_power: job.charm_power,
            weights: &job.weights,
        })
        .await;

    interpret(job.id, output)
}

async fn write_input_file(job: &Job) -> std::io::Result<NamedTempFile> {
    let file = tempfile::Builder::new()
        .prefix("mtce-charms-")
        .suffix(".txt")
        .tempfile()?;
    tokio::fs::write(file.path(), job.input_file_contents()).await?;
    Ok(file)
}

/// Pending result of a submitted job.
#[derive(Debug)]
pub struct JobTicket {
    id: Uuid,
    rx: oneshot::Receiver<EvalResult>,
}

impl JobTicket {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Future for JobTicket {
    type Output = EvalResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|result| {
            result.unwrap_or_else(|_| EvalFailure::Internal("job runner stopped".to_string()).into())
        })
    }
}
