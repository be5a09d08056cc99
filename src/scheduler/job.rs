use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EvalFailure;

/// Identifies a stored weight configuration: the owning user and its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRef {
    pub owner: String,
    pub name: String,
}

impl std::fmt::Display for ConfigRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.owner, self.name)
    }
}

/// Fields supplied by the caller when submitting an evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub creator: String,
    pub config: ConfigRef,
    /// Effect name to string-encoded (big) integer weight
    pub weights: BTreeMap<String, String>,
    /// Raw charm data, one charm per line
    pub charms: Vec<String>,
    pub charm_power: u32,
}

/// An evaluation request waiting in, or taken from, the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub creator: String,
    pub config: ConfigRef,
    pub weights: BTreeMap<String, String>,
    pub charms: Vec<String>,
    pub charm_power: u32,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(request: JobRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            creator: request.creator,
            config: request.config,
            weights: request.weights,
            charms: request.charms,
            charm_power: request.charm_power,
            created_at: Utc::now(),
        }
    }

    /// Contents of the evaluator input file.
    pub fn input_file_contents(&self) -> String {
        self.charms.join("\n")
    }
}

/// The job currently occupying the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningJob {
    pub job: Job,
    pub started_at: DateTime<Utc>,
}

impl RunningJob {
    pub fn start(job: Job) -> Self {
        Self {
            job,
            started_at: Utc::now(),
        }
    }
}

/// Terminal outcome of a job, delivered once to its submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalResult {
    Success {
        weight: BigInt,
        /// Indices into the submitted charm lines, in the evaluator's order
        selected: Vec<usize>,
    },
    Failure {
        message: String,
    },
}

impl EvalResult {
    pub fn is_success(&self) -> bool {
        matches!(self, EvalResult::Success { .. })
    }
}

impl From<EvalFailure> for EvalResult {
    fn from(failure: EvalFailure) -> Self {
        EvalResult::Failure {
            message: failure.to_string(),
        }
    }
}
