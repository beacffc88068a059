//! Cluster control-plane access
//!
//! Everything the provisioner does to the cluster goes through
//! [`TenantCluster`], scoped by tenant namespace. [`KubeCluster`] is the
//! kube-rs implementation; tests use the in-memory double in `testkit`.

use crate::error::{Error, Result};
use crate::readiness::{self, ReadinessError};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Operations the provisioner needs from the cluster
#[async_trait::async_trait]
pub trait TenantCluster: Send + Sync {
    /// Fetch a namespace, `None` if it does not exist
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>>;

    /// Create a namespace. An existing name yields [`Error::Conflict`].
    async fn create_namespace(&self, namespace: &Namespace) -> Result<()>;

    async fn list_namespaces(&self) -> Result<Vec<Namespace>>;

    /// Merge the given annotations into the namespace; other keys are kept
    async fn patch_namespace_annotations(
        &self,
        name: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<()>;

    async fn delete_namespace(&self, name: &str) -> Result<()>;

    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<()>;

    /// Block until the deployment reports a ready replica, the timeout
    /// elapses or `cancel` fires
    async fn wait_deployment_ready(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), ReadinessError>;

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<()>;

    async fn create_ingress(&self, namespace: &str, ingress: &Ingress) -> Result<()>;

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<()>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;
}

/// [`TenantCluster`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }
}

fn is_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == code)
}

/// Map a 404 on read to `None`
fn found<T>(result: std::result::Result<T, kube::Error>) -> Result<Option<T>> {
    match result {
        Ok(obj) => Ok(Some(obj)),
        Err(e) if is_status(&e, 404) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait::async_trait]
impl TenantCluster for KubeCluster {
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        found(self.namespaces().get(name).await)
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<()> {
        let name = namespace.metadata.name.clone().unwrap_or_default();
        match self
            .namespaces()
            .create(&PostParams::default(), namespace)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_status(&e, 409) => Err(Error::Conflict(name)),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let list = self.namespaces().list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn patch_namespace_annotations(
        &self,
        name: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<()> {
        let patch = serde_json::json!({
            "metadata": {
                "annotations": annotations
            }
        });
        self.namespaces()
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        match self.namespaces().delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) if is_status(&e, 404) => Err(Error::NotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<()> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        deployments.create(&PostParams::default(), deployment).await?;
        debug!(namespace = %namespace, deployment = ?deployment.metadata.name, "Created deployment");
        Ok(())
    }

    async fn wait_deployment_ready(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), ReadinessError> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        readiness::wait_for_deployment(&deployments, name, timeout, cancel).await
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<()> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        services.create(&PostParams::default(), service).await?;
        Ok(())
    }

    async fn create_ingress(&self, namespace: &str, ingress: &Ingress) -> Result<()> {
        let ingresses: Api<Ingress> = Api::namespaced(self.client.clone(), namespace);
        ingresses.create(&PostParams::default(), ingress).await?;
        Ok(())
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<()> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        secrets.create(&PostParams::default(), secret).await?;
        Ok(())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        found(secrets.get(name).await)
    }
}
