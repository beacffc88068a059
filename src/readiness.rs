//! Workload readiness gating
//!
//! Instead of re-reading the deployment on a fixed cadence, the wait subscribes
//! to a watch on the object and wakes when a readiness event arrives. Every wait
//! is bounded by a deadline and aborts when the process-wide cancellation token
//! fires.

use k8s_openapi::api::apps::v1::Deployment;
use kube::api::Api;
use kube::runtime::wait::await_condition;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default budget for a workload to report a ready replica
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(180);

/// Why a workload was not observed ready
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadinessError {
    #[error("not ready after {0:?}")]
    Timeout(Duration),
    #[error("wait cancelled by shutdown")]
    Cancelled,
    #[error("watch failed: {0}")]
    Watch(String),
}

/// A deployment is ready once it reports at least one ready replica
pub fn has_ready_replica(deployment: Option<&Deployment>) -> bool {
    deployment
        .and_then(|d| d.status.as_ref())
        .and_then(|s| s.ready_replicas)
        .is_some_and(|ready| ready >= 1)
}

/// Drive `ready` to completion within `timeout`, unless `cancel` fires first.
pub async fn wait_for<F, T, E>(
    ready: F,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T, ReadinessError>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReadinessError::Cancelled),
        outcome = tokio::time::timeout(timeout, ready) => match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ReadinessError::Watch(e.to_string())),
            Err(_) => Err(ReadinessError::Timeout(timeout)),
        },
    }
}

/// Wait until the named deployment has a ready replica
pub async fn wait_for_deployment(
    deployments: &Api<Deployment>,
    name: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<(), ReadinessError> {
    debug!(deployment = %name, ?timeout, "Waiting for deployment readiness");
    let ready = await_condition(deployments.clone(), name, |d: Option<&Deployment>| {
        has_ready_replica(d)
    });
    wait_for(ready, timeout, cancel).await.map(|_| ())
}
