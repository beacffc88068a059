//! Provisioning orchestrator
//!
//! [`Provisioner::submit`] admits a tenant synchronously (validate, dedupe,
//! claim the namespace) and hands it to a bounded pool of background tasks.
//! Each task walks the stage sequence strictly in order, recording every
//! transition on the namespace and stopping for good at the first failure.
//! Resources created before a failure are left in place; deleting the tenant
//! namespace removes them.

mod stages;

use crate::bootstrap::AdminRegistrar;
use crate::cluster::TenantCluster;
use crate::error::{Error, Result};
use crate::readiness::DEFAULT_READINESS_TIMEOUT;
use crate::stage::Stage;
use crate::status::{stage_annotations, StatusAnnotator};
use crate::templates::MANAGED_BY;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

pub use stages::StageFailure;

/// Default number of tenants provisioned at the same time
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Tunables for the orchestrator
#[derive(Debug, Clone)]
pub struct ProvisionerSettings {
    /// Suffix appended to tenant hostnames, e.g. `.example.com`
    pub domain_suffix: String,
    /// Budget for each workload to become ready
    pub readiness_timeout: Duration,
    /// `ingressClassName` for tenant ingresses
    pub ingress_class: Option<String>,
    /// Tenants provisioned concurrently; further tenants queue
    pub max_concurrent: usize,
}

impl Default for ProvisionerSettings {
    fn default() -> Self {
        Self {
            domain_suffix: ".example.com".to_string(),
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            ingress_class: None,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

struct Inner {
    cluster: Arc<dyn TenantCluster>,
    registrar: Arc<dyn AdminRegistrar>,
    annotator: StatusAnnotator,
    settings: ProvisionerSettings,
    permits: Arc<Semaphore>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

/// Admits tenants and runs their provisioning in the background
#[derive(Clone)]
pub struct Provisioner {
    inner: Arc<Inner>,
}

impl Provisioner {
    pub fn new(
        cluster: Arc<dyn TenantCluster>,
        registrar: Arc<dyn AdminRegistrar>,
        settings: ProvisionerSettings,
        cancel: CancellationToken,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent.max(1)));
        Self {
            inner: Arc::new(Inner {
                annotator: StatusAnnotator::new(cluster.clone()),
                cluster,
                registrar,
                settings,
                permits,
                tasks: TaskTracker::new(),
                cancel,
            }),
        }
    }

    pub fn settings(&self) -> &ProvisionerSettings {
        &self.inner.settings
    }

    pub fn cluster(&self) -> &Arc<dyn TenantCluster> {
        &self.inner.cluster
    }

    /// Number of provisioning tasks that have not finished yet
    pub fn in_flight(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Claim `name` and start provisioning it in the background.
    ///
    /// Fails with [`Error::InvalidName`] for names the cluster would reject and
    /// [`Error::Conflict`] if the namespace already exists. On success the
    /// namespace exists with status `Created` and nothing else has been
    /// created yet.
    ///
    /// The namespace is created from inside the tracked task, so a caller
    /// that stops waiting (e.g. a request timeout) cannot leave a claimed
    /// tenant without a task behind it.
    pub async fn submit(&self, name: &str) -> Result<()> {
        let tenant = crate::tenant::validate_name(name)?;

        if self.inner.cluster.get_namespace(&tenant).await?.is_some() {
            return Err(Error::Conflict(tenant));
        }

        let (claimed_tx, claimed_rx) = oneshot::channel();
        let this = self.clone();
        self.inner.tasks.spawn(async move {
            // The create call is the authority if another request raced us here
            let claimed = this
                .inner
                .cluster
                .create_namespace(&tenant_namespace(&tenant))
                .await;
            let proceed = claimed.is_ok();
            // Ignore a caller that gave up; the claim still stands
            let _ = claimed_tx.send(claimed);
            if proceed {
                info!(tenant = %tenant, "Tenant namespace created, queueing provisioning");
                this.run_queued(&tenant).await;
            }
        });

        claimed_rx
            .await
            .map_err(|_| Error::internal("namespace claim task ended without a result"))?
    }

    /// Wait for a worker slot, then provision
    async fn run_queued(&self, tenant: &str) {
        let permit = tokio::select! {
            biased;
            _ = self.inner.cancel.cancelled() => None,
            permit = self.inner.permits.clone().acquire_owned() => permit.ok(),
        };
        let Some(_permit) = permit else {
            warn!(tenant = %tenant, "Provisioning cancelled before it started");
            self.inner
                .annotator
                .record_failure(tenant, Stage::DbDeployed, "provisioning cancelled by shutdown")
                .await;
            return;
        };

        self.provision(tenant).await;
    }

    /// Run the full stage sequence for an admitted tenant.
    ///
    /// The outcome is only observable through the namespace annotations.
    pub async fn provision(&self, tenant: &str) {
        info!(tenant = %tenant, "Provisioning tenant");
        match self.run_stages(tenant).await {
            Ok(()) => info!(tenant = %tenant, "Tenant provisioned"),
            Err(failure) => {
                error!(
                    tenant = %tenant,
                    stage = %failure.stage,
                    "Provisioning failed: {}",
                    failure.message
                );
                self.inner
                    .annotator
                    .record_failure(tenant, failure.stage, &failure.message)
                    .await;
            }
        }
    }

    /// Wait until every provisioning task started so far has finished
    pub async fn wait_idle(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
    }

    /// Cancel in-flight work and wait up to `grace` for tasks to record their
    /// outcome. Returns `false` if tasks were still running at the deadline.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.inner.tasks.close();
        self.inner.cancel.cancel();
        tokio::time::timeout(grace, self.inner.tasks.wait())
            .await
            .is_ok()
    }
}

/// Namespace object claiming `tenant`, already marked as `Created`
pub fn tenant_namespace(tenant: &str) -> Namespace {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        MANAGED_BY.to_string(),
    );

    Namespace {
        metadata: ObjectMeta {
            name: Some(tenant.to_string()),
            labels: Some(labels),
            annotations: Some(stage_annotations(Stage::Created)),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{FakeCluster, RecordingRegistrar};

    fn provisioner(cluster: Arc<FakeCluster>) -> Provisioner {
        let settings = ProvisionerSettings {
            readiness_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        Provisioner::new(
            cluster,
            Arc::new(RecordingRegistrar::new()),
            settings,
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_tenant_namespace() {
        let ns = tenant_namespace("acme");
        assert_eq!(ns.metadata.name.as_deref(), Some("acme"));
        let annotations = ns.metadata.annotations.unwrap();
        assert_eq!(annotations.get("manager").map(String::as_str), Some("saas"));
        assert_eq!(annotations.get("status").map(String::as_str), Some("Created"));
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_name() {
        let cluster = Arc::new(FakeCluster::new());
        let provisioner = provisioner(cluster.clone());

        let err = provisioner.submit("ACME!").await.unwrap_err();
        assert!(matches!(err, Error::InvalidName(_)));
        assert!(cluster.namespace_names().is_empty());
    }

    #[tokio::test]
    async fn test_submit_conflict_creates_nothing() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.seed_namespace("acme", &[("manager", "saas"), ("status", "Completed")]);
        let provisioner = provisioner(cluster.clone());

        let err = provisioner.submit("acme").await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(provisioner.in_flight(), 0);
        assert!(cluster.deployment_names("acme").is_empty());
    }

    #[tokio::test]
    async fn test_submit_claims_namespace_synchronously() {
        let cluster = Arc::new(FakeCluster::new());
        let provisioner = provisioner(cluster.clone());

        provisioner.submit("acme").await.unwrap();
        assert!(cluster.annotations("acme").is_some());

        // Second request while the first is in flight
        let err = provisioner.submit("acme").await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        provisioner.wait_idle().await;
        assert_eq!(
            cluster.status_history("acme").last().map(String::as_str),
            Some("Completed")
        );
    }

    #[tokio::test]
    async fn test_shutdown_cancels_readiness_wait() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.never_ready("postgresql");
        let settings = ProvisionerSettings {
            readiness_timeout: Duration::from_secs(3600),
            ..Default::default()
        };
        let provisioner = Provisioner::new(
            cluster.clone(),
            Arc::new(RecordingRegistrar::new()),
            settings,
            CancellationToken::new(),
        );

        provisioner.submit("acme").await.unwrap();
        assert!(provisioner.shutdown(Duration::from_secs(5)).await);

        let annotations = cluster.annotations("acme").unwrap();
        assert_eq!(annotations.get("status").map(String::as_str), Some("Failed"));
        let error = annotations.get("error").unwrap();
        assert!(error.starts_with("DBReady: postgresql deployment not ready"), "{}", error);
        assert!(error.contains("cancelled"));
    }

    #[tokio::test]
    async fn test_shutdown_fails_queued_tenants() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.never_ready("postgresql");
        let settings = ProvisionerSettings {
            readiness_timeout: Duration::from_secs(3600),
            max_concurrent: 1,
            ..Default::default()
        };
        let provisioner = Provisioner::new(
            cluster.clone(),
            Arc::new(RecordingRegistrar::new()),
            settings,
            CancellationToken::new(),
        );

        // alpha holds the only slot, waiting on its database; beta queues
        provisioner.submit("alpha").await.unwrap();
        provisioner.submit("beta").await.unwrap();
        assert_eq!(cluster.deployment_names("beta").len(), 0);

        assert!(provisioner.shutdown(Duration::from_secs(5)).await);

        let alpha = cluster.annotations("alpha").unwrap();
        assert!(alpha.get("error").unwrap().starts_with("DBReady:"));

        let beta = cluster.annotations("beta").unwrap();
        assert_eq!(beta.get("status").map(String::as_str), Some("Failed"));
        assert_eq!(
            beta.get("error").map(String::as_str),
            Some("DBDeployed: provisioning cancelled by shutdown")
        );
        assert_eq!(cluster.status_history("beta"), vec!["Created", "Failed"]);
        assert!(cluster.deployment_names("beta").is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_admin_registration() {
        let cluster = Arc::new(FakeCluster::new());
        let registrar = Arc::new(RecordingRegistrar::new());
        registrar.hang();
        let provisioner = Provisioner::new(
            cluster.clone(),
            registrar.clone(),
            ProvisionerSettings::default(),
            CancellationToken::new(),
        );

        provisioner.submit("acme").await.unwrap();
        while registrar.calls().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(provisioner.shutdown(Duration::from_secs(5)).await);

        let annotations = cluster.annotations("acme").unwrap();
        assert_eq!(annotations.get("status").map(String::as_str), Some("Failed"));
        assert_eq!(
            annotations.get("error").map(String::as_str),
            Some("AdminUserRegistered: admin registration cancelled by shutdown")
        );
        assert!(cluster.secret("acme", "backend-creds").is_none());
    }

    #[tokio::test]
    async fn test_abandoned_submit_still_provisions() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.slow_namespace_create(Duration::from_millis(200));
        let provisioner = provisioner(cluster.clone());

        // The caller gives up while the namespace create is still in flight
        let submitted =
            tokio::time::timeout(Duration::from_millis(20), provisioner.submit("acme")).await;
        assert!(submitted.is_err());

        provisioner.wait_idle().await;
        assert_eq!(
            cluster.status_history("acme").last().map(String::as_str),
            Some("Completed")
        );
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let cluster = Arc::new(FakeCluster::new());
        let settings = ProvisionerSettings {
            readiness_timeout: Duration::from_millis(50),
            max_concurrent: 1,
            ..Default::default()
        };
        let provisioner = Provisioner::new(
            cluster.clone(),
            Arc::new(RecordingRegistrar::new()),
            settings,
            CancellationToken::new(),
        );

        for name in ["alpha", "beta", "gamma"] {
            provisioner.submit(name).await.unwrap();
        }
        provisioner.wait_idle().await;

        assert_eq!(cluster.max_concurrent_waits(), 1);
        for name in ["alpha", "beta", "gamma"] {
            assert_eq!(
                cluster.annotations(name).unwrap().get("status").map(String::as_str),
                Some("Completed")
            );
        }
    }
}
