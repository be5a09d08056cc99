use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Wall-clock limit for one evaluator run.
pub const DEFAULT_EVAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Time a timed-out evaluator gets to exit after SIGTERM before it is killed.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// Configuration for spawning the external charm evaluator.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Path to the evaluator binary
    pub binary: PathBuf,
    /// Wall-clock timeout; on expiry the process receives SIGTERM
    pub timeout: Duration,
    /// Grace period between SIGTERM and SIGKILL
    pub kill_grace: Duration,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("./mtce"),
            timeout: DEFAULT_EVAL_TIMEOUT,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }
}

impl EvaluatorConfig {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_kill_grace(mut self, kill_grace: Duration) -> Self {
        self.kill_grace = kill_grace;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub dashboard_addr: SocketAddr,
    pub evaluator: EvaluatorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            dashboard_addr: "127.0.0.1:8080"
                .parse()
                .expect("default dashboard address is valid"),
            evaluator: EvaluatorConfig::default(),
        }
    }
}
