//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use mtce_queue::scheduler::{ConfigRef, JobRequest};

/// Build a job request with `count` dummy charm lines.
pub fn job_request(creator: &str, count: usize) -> JobRequest {
    JobRequest {
        creator: creator.to_string(),
        config: ConfigRef {
            owner: "owner".to_string(),
            name: format!("{}_config", creator),
        },
        weights: BTreeMap::from([("attack_speed".to_string(), "10".to_string())]),
        charms: (0..count)
            .map(|i| format!("Charm {};Name {};1;ATTACK_SPEED;2", i, i))
            .collect(),
        charm_power: 15,
    }
}

/// Poll `condition` until it returns true or `timeout_duration` elapses.
pub async fn wait_for<F, Fut>(condition: F, timeout_duration: Duration, poll: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout_duration;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(poll).await;
    }
}

/// Assert a condition eventually becomes true
pub async fn assert_eventually<F, Fut>(condition: F, timeout_duration: Duration, message: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = wait_for(condition, timeout_duration, Duration::from_millis(10)).await;
    assert!(result, "{}", message);
}
