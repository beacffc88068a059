//! In-memory doubles for the cluster and the admin bootstrap endpoint
//!
//! Enabled with the `testkit` feature so integration tests can drive the
//! orchestrator and the HTTP surface without a cluster.

use crate::bootstrap::AdminRegistrar;
use crate::cluster::TenantCluster;
use crate::error::{Error, Result};
use crate::readiness::{self, ReadinessError};
use crate::status::ANNOTATION_STATUS;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::ErrorResponse;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type Key = (String, String);

#[derive(Default)]
struct State {
    namespaces: BTreeMap<String, Namespace>,
    deployments: BTreeMap<Key, Deployment>,
    services: BTreeMap<Key, Service>,
    ingresses: BTreeMap<Key, Ingress>,
    secrets: BTreeMap<Key, Secret>,
    status_history: BTreeMap<String, Vec<String>>,
    never_ready: BTreeSet<String>,
    failing_creates: BTreeSet<(String, String)>,
    fail_listing: bool,
    namespace_create_delay: Option<Duration>,
    active_waits: usize,
    max_active_waits: usize,
}

/// Kubernetes API error as the real client would surface it
pub fn api_error(code: u16, message: &str) -> Error {
    Error::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: String::new(),
        code,
    }))
}

fn key(namespace: &str, obj: &ObjectMeta) -> Key {
    (namespace.to_string(), obj.name.clone().unwrap_or_default())
}

/// [`TenantCluster`] keeping every object in memory
pub struct FakeCluster {
    state: Mutex<State>,
    ready_delay: Duration,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            ready_delay: Duration::from_millis(1),
        }
    }
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCluster {
    /// Insert a namespace directly, bypassing `create_namespace`
    pub fn seed_namespace(&self, name: &str, annotations: &[(&str, &str)]) {
        let annotations: BTreeMap<String, String> = annotations
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut state = self.state.lock();
        if let Some(status) = annotations.get(ANNOTATION_STATUS) {
            state
                .status_history
                .entry(name.to_string())
                .or_default()
                .push(status.clone());
        }
        state.namespaces.insert(
            name.to_string(),
            Namespace {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    annotations: Some(annotations),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
    }

    pub fn seed_secret(&self, namespace: &str, secret: Secret) {
        let k = key(namespace, &secret.metadata);
        self.state.lock().secrets.insert(k, secret);
    }

    /// Deployments with this name never report a ready replica
    pub fn never_ready(&self, deployment: &str) {
        self.state.lock().never_ready.insert(deployment.to_string());
    }

    /// Creating `kind` (`deployment`, `service`, `ingress`, `secret`) named
    /// `name` fails with a server error
    pub fn fail_create(&self, kind: &str, name: &str) {
        self.state
            .lock()
            .failing_creates
            .insert((kind.to_string(), name.to_string()));
    }

    /// `create_namespace` stores the namespace, then takes `delay` to return
    pub fn slow_namespace_create(&self, delay: Duration) {
        self.state.lock().namespace_create_delay = Some(delay);
    }

    pub fn fail_listing(&self) {
        self.state.lock().fail_listing = true;
    }

    pub fn namespace_names(&self) -> Vec<String> {
        self.state.lock().namespaces.keys().cloned().collect()
    }

    pub fn annotations(&self, namespace: &str) -> Option<BTreeMap<String, String>> {
        self.state
            .lock()
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.metadata.annotations.clone())
    }

    /// Every status value written to the namespace, in order
    pub fn status_history(&self, namespace: &str) -> Vec<String> {
        self.state
            .lock()
            .status_history
            .get(namespace)
            .cloned()
            .unwrap_or_default()
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.state
            .lock()
            .deployments
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn deployment_names(&self, namespace: &str) -> Vec<String> {
        names_in(&self.state.lock().deployments, namespace)
    }

    pub fn service_names(&self, namespace: &str) -> Vec<String> {
        names_in(&self.state.lock().services, namespace)
    }

    pub fn ingress_hosts(&self, namespace: &str) -> Vec<String> {
        let state = self.state.lock();
        let mut hosts: Vec<String> = state
            .ingresses
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .filter_map(|(_, ing)| ing.spec.as_ref()?.rules.as_ref()?.first()?.host.clone())
            .collect();
        hosts.sort();
        hosts
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.state
            .lock()
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Highest number of readiness waits observed in flight at once
    pub fn max_concurrent_waits(&self) -> usize {
        self.state.lock().max_active_waits
    }

    fn check_create(&self, kind: &str, namespace: &str, name: &str) -> Result<()> {
        let state = self.state.lock();
        if !state.namespaces.contains_key(namespace) {
            return Err(api_error(404, &format!("namespaces \"{}\" not found", namespace)));
        }
        if state
            .failing_creates
            .contains(&(kind.to_string(), name.to_string()))
        {
            return Err(api_error(500, &format!("injected failure creating {} {}", kind, name)));
        }
        Ok(())
    }
}

fn names_in<T>(objects: &BTreeMap<Key, T>, namespace: &str) -> Vec<String> {
    objects
        .keys()
        .filter(|(ns, _)| ns == namespace)
        .map(|(_, name)| name.clone())
        .collect()
}

fn insert_new<T>(objects: &mut BTreeMap<Key, T>, k: Key, obj: T) -> Result<()> {
    if objects.contains_key(&k) {
        return Err(api_error(409, &format!("\"{}\" already exists", k.1)));
    }
    objects.insert(k, obj);
    Ok(())
}

#[async_trait::async_trait]
impl TenantCluster for FakeCluster {
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        Ok(self.state.lock().namespaces.get(name).cloned())
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<()> {
        let name = namespace.metadata.name.clone().unwrap_or_default();
        let delay = {
            let mut state = self.state.lock();
            if state.namespaces.contains_key(&name) {
                return Err(Error::Conflict(name));
            }
            if let Some(status) = namespace
                .metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(ANNOTATION_STATUS))
            {
                state
                    .status_history
                    .entry(name.clone())
                    .or_default()
                    .push(status.clone());
            }
            state.namespaces.insert(name, namespace.clone());
            state.namespace_create_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let state = self.state.lock();
        if state.fail_listing {
            return Err(api_error(500, "injected listing failure"));
        }
        Ok(state.namespaces.values().cloned().collect())
    }

    async fn patch_namespace_annotations(
        &self,
        name: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let namespace = state
            .namespaces
            .get_mut(name)
            .ok_or_else(|| api_error(404, &format!("namespaces \"{}\" not found", name)))?;
        namespace
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(annotations.clone());
        if let Some(status) = annotations.get(ANNOTATION_STATUS) {
            state
                .status_history
                .entry(name.to_string())
                .or_default()
                .push(status.clone());
        }
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.namespaces.remove(name).is_none() {
            return Err(Error::NotFound(name.to_string()));
        }
        state.deployments.retain(|(ns, _), _| ns != name);
        state.services.retain(|(ns, _), _| ns != name);
        state.ingresses.retain(|(ns, _), _| ns != name);
        state.secrets.retain(|(ns, _), _| ns != name);
        Ok(())
    }

    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<()> {
        let k = key(namespace, &deployment.metadata);
        self.check_create("deployment", namespace, &k.1)?;
        insert_new(&mut self.state.lock().deployments, k, deployment.clone())
    }

    async fn wait_deployment_ready(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), ReadinessError> {
        let ready = {
            let mut state = self.state.lock();
            state.active_waits += 1;
            state.max_active_waits = state.max_active_waits.max(state.active_waits);
            !state.never_ready.contains(name)
                && state
                    .deployments
                    .contains_key(&(namespace.to_string(), name.to_string()))
        };

        let delay = self.ready_delay;
        let outcome = if ready {
            readiness::wait_for(
                async move {
                    tokio::time::sleep(delay).await;
                    Ok::<_, String>(())
                },
                timeout,
                cancel,
            )
            .await
        } else {
            readiness::wait_for(
                std::future::pending::<std::result::Result<(), String>>(),
                timeout,
                cancel,
            )
            .await
        };

        self.state.lock().active_waits -= 1;
        outcome
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<()> {
        let k = key(namespace, &service.metadata);
        self.check_create("service", namespace, &k.1)?;
        insert_new(&mut self.state.lock().services, k, service.clone())
    }

    async fn create_ingress(&self, namespace: &str, ingress: &Ingress) -> Result<()> {
        let k = key(namespace, &ingress.metadata);
        self.check_create("ingress", namespace, &k.1)?;
        insert_new(&mut self.state.lock().ingresses, k, ingress.clone())
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<()> {
        let k = key(namespace, &secret.metadata);
        self.check_create("secret", namespace, &k.1)?;
        insert_new(&mut self.state.lock().secrets, k, secret.clone())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        Ok(self.secret(namespace, name))
    }
}

/// One call seen by [`RecordingRegistrar`]
#[derive(Debug, Clone)]
pub struct Registration {
    pub url: String,
    pub username: String,
    pub password: String,
}

/// [`AdminRegistrar`] that records calls instead of making them
#[derive(Default)]
pub struct RecordingRegistrar {
    calls: Mutex<Vec<Registration>>,
    fail_status: Mutex<Option<u16>>,
    hang: Mutex<bool>,
}

impl RecordingRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every later registration with this HTTP status
    pub fn fail_with_status(&self, status: u16) {
        *self.fail_status.lock() = Some(status);
    }

    /// Never answer later registrations
    pub fn hang(&self) {
        *self.hang.lock() = true;
    }

    pub fn calls(&self) -> Vec<Registration> {
        self.calls.lock().clone()
    }
}

#[async_trait::async_trait]
impl AdminRegistrar for RecordingRegistrar {
    async fn register(&self, backend_url: &str, credentials: &crate::tenant::Credentials) -> Result<()> {
        self.calls.lock().push(Registration {
            url: backend_url.to_string(),
            username: credentials.username.clone(),
            password: credentials.password.expose().to_string(),
        });
        let hang = *self.hang.lock();
        if hang {
            std::future::pending::<()>().await;
        }
        let fail_status = *self.fail_status.lock();
        match fail_status {
            Some(status) => Err(Error::bootstrap(format!(
                "registration at {}/register returned {}",
                backend_url, status
            ))),
            None => Ok(()),
        }
    }
}
