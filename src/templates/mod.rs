//! Resource templates for a tenant stack
//!
//! Pure builders for the three managed workloads and their network exposure.
//! Each call returns a fresh object; per-tenant values are filled in with
//! [`set_container_env`] right before the object is created.

mod backend;
mod database;
mod frontend;
mod network;
mod secret;

pub use backend::{
    backend_deployment, BACKEND_CONTAINER, BACKEND_NAME, BACKEND_PASSWORD_ENV, BACKEND_PORT,
};
pub use database::{
    database_deployment, DATABASE_CONTAINER, DATABASE_NAME, DATABASE_PASSWORD_ENV, DATABASE_PORT,
};
pub use frontend::{
    frontend_deployment, FRONTEND_API_URL_ENV, FRONTEND_CONTAINER, FRONTEND_NAME, FRONTEND_PORT,
};
pub use network::{ingress, service};
pub use secret::credentials_secret;

use crate::error::{Error, Result};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PodSpec, PodTemplateSpec, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::BTreeMap;

/// Label key used by every workload selector
pub const APP_LABEL: &str = "app";

/// Value of `app.kubernetes.io/managed-by` on everything this service creates
pub const MANAGED_BY: &str = "saas-provisioner";

/// Host the backend ingress answers on
pub fn backend_host(tenant: &str, domain_suffix: &str) -> String {
    format!("{}-backend{}", tenant, domain_suffix)
}

/// Host every other tier answers on
pub fn tenant_host(tenant: &str, domain_suffix: &str) -> String {
    format!("{}{}", tenant, domain_suffix)
}

/// Externally routable URL of the tenant's backend
pub fn backend_url(tenant: &str, domain_suffix: &str) -> String {
    format!("http://{}", backend_host(tenant, domain_suffix))
}

/// Externally routable URL of the tenant's frontend
pub fn tenant_url(tenant: &str, domain_suffix: &str) -> String {
    format!("http://{}", tenant_host(tenant, domain_suffix))
}

/// Overwrite the value of an existing env slot in the named container.
///
/// Fails if either the container or the variable is absent from the template.
pub fn set_container_env(
    deployment: &mut Deployment,
    container: &str,
    variable: &str,
    value: &str,
) -> Result<()> {
    let slot = deployment
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
        .and_then(|pod| pod.containers.iter_mut().find(|c| c.name == container))
        .and_then(|c| c.env.as_mut())
        .and_then(|env| env.iter_mut().find(|e| e.name == variable))
        .ok_or_else(|| {
            Error::template(format!(
                "container {} has no {} env slot",
                container, variable
            ))
        })?;
    slot.value = Some(value.to_string());
    Ok(())
}

/// Look up the current value of an env var in the named container
pub fn container_env<'a>(
    deployment: &'a Deployment,
    container: &str,
    variable: &str,
) -> Option<&'a str> {
    deployment
        .spec
        .as_ref()?
        .template
        .spec
        .as_ref()?
        .containers
        .iter()
        .find(|c| c.name == container)?
        .env
        .as_ref()?
        .iter()
        .find(|e| e.name == variable)?
        .value
        .as_deref()
}

pub(crate) fn selector_labels(app: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(APP_LABEL.to_string(), app.to_string());
    labels
}

pub(crate) fn common_labels(app: &str) -> BTreeMap<String, String> {
    let mut labels = selector_labels(app);
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        MANAGED_BY.to_string(),
    );
    labels
}

pub(crate) fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

/// Requests and limits as (memory, cpu) pairs
pub(crate) fn resources(requests: (&str, &str), limits: (&str, &str)) -> ResourceRequirements {
    let quantities = |(memory, cpu): (&str, &str)| {
        let mut map = BTreeMap::new();
        map.insert("memory".to_string(), Quantity(memory.to_string()));
        map.insert("cpu".to_string(), Quantity(cpu.to_string()));
        map
    };
    ResourceRequirements {
        requests: Some(quantities(requests)),
        limits: Some(quantities(limits)),
        ..Default::default()
    }
}

/// Single-replica deployment running one container, selected by `app=<name>`
pub(crate) fn single_container_deployment(name: &str, container: Container) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(common_labels(name)),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            revision_history_limit: Some(2),
            selector: LabelSelector {
                match_labels: Some(selector_labels(name)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector_labels(name)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
