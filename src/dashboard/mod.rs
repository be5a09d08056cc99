use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::error::Result;
use crate::runner::JobRunner;
use crate::scheduler::{ConfigRef, EvalResult, Job, JobRequest, RunningJob};

#[derive(Clone)]
pub struct DashboardState {
    pub runner: JobRunner,
}

#[derive(Serialize)]
struct JobView {
    id: String,
    creator: String,
    config_owner: String,
    config_name: String,
    charms: usize,
    charm_power: u32,
    created_at_ms: i64,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            creator: job.creator.clone(),
            config_owner: job.config.owner.clone(),
            config_name: job.config.name.clone(),
            charms: job.charms.len(),
            charm_power: job.charm_power,
            created_at_ms: job.created_at.timestamp_millis(),
        }
    }
}

#[derive(Serialize)]
struct RunningJobView {
    #[serde(flatten)]
    job: JobView,
    started_at_ms: i64,
}

impl From<&RunningJob> for RunningJobView {
    fn from(running: &RunningJob) -> Self {
        Self {
            job: JobView::from(&running.job),
            started_at_ms: running.started_at.timestamp_millis(),
        }
    }
}

#[derive(Serialize)]
struct QueueStatusResponse {
    current: Option<RunningJobView>,
    pending: Vec<JobView>,
}

#[derive(Deserialize)]
struct SubmitJobRequest {
    creator: String,
    config_owner: String,
    config_name: String,
    #[serde(default)]
    weights: BTreeMap<String, String>,
    charms: Vec<String>,
    charm_power: u32,
}

#[derive(Serialize)]
struct SubmitJobResponse {
    success: bool,
    /// Decimal string, the weight is arbitrary precision
    #[serde(skip_serializing_if = "Option::is_none")]
    weight: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    charms: Option<Vec<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<EvalResult> for SubmitJobResponse {
    fn from(result: EvalResult) -> Self {
        match result {
            EvalResult::Success { weight, selected } => Self {
                success: true,
                weight: Some(weight.to_string()),
                charms: Some(selected),
                error: None,
            },
            EvalResult::Failure { message } => Self {
                success: false,
                weight: None,
                charms: None,
                error: Some(message),
            },
        }
    }
}

pub fn router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/queue", get(queue_status_handler))
        .route("/api/jobs", post(submit_job_handler))
        .layer(cors)
        .with_state(state)
}

/// Serve the API until `shutdown` is cancelled.
pub async fn run_dashboard(
    addr: SocketAddr,
    state: DashboardState,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = router(state);

    tracing::info!(addr = %addr, "Starting dashboard server");

    let listener = tokio::net::TcpListener::bind(addr).await.inspect_err(|e| {
        tracing::error!(addr = %addr, error = %e, "Failed to bind dashboard server");
    })?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

async fn queue_status_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let current = state.runner.current_running();
    let pending = state.runner.pending_entries();

    Json(QueueStatusResponse {
        current: current.as_ref().map(RunningJobView::from),
        pending: pending.iter().map(JobView::from).collect(),
    })
}

async fn submit_job_handler(
    State(state): State<DashboardState>,
    Json(payload): Json<SubmitJobRequest>,
) -> impl IntoResponse {
    let ticket = state.runner.submit(JobRequest {
        creator: payload.creator,
        config: ConfigRef {
            owner: payload.config_owner,
            name: payload.config_name,
        },
        weights: payload.weights,
        charms: payload.charms,
        charm_power: payload.charm_power,
    });

    tracing::info!(job_id = %ticket.id(), "Job submitted via API");

    Json(SubmitJobResponse::from(ticket.await))
}
