//! Frontend UI workload

use super::{env, resources, single_container_deployment};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, ContainerPort, HTTPGetAction, Probe};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

pub const FRONTEND_NAME: &str = "frontend";
pub const FRONTEND_CONTAINER: &str = "frontend";
pub const FRONTEND_PORT: i32 = 3000;
pub const FRONTEND_API_URL_ENV: &str = "REACT_APP_API_URL";

const IMAGE: &str = "bennerv/order-meow-ui:0.1.2";

/// Frontend deployment with an empty API URL slot. Ready once `GET /` answers.
pub fn frontend_deployment() -> Deployment {
    let container = Container {
        name: FRONTEND_CONTAINER.to_string(),
        image: Some(IMAGE.to_string()),
        ports: Some(vec![ContainerPort {
            name: Some("http".to_string()),
            container_port: FRONTEND_PORT,
            ..Default::default()
        }]),
        env: Some(vec![env(FRONTEND_API_URL_ENV, "")]),
        resources: Some(resources(("50Mi", "50m"), ("1Gi", "1000m"))),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some("/".to_string()),
                port: IntOrString::Int(FRONTEND_PORT),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    single_container_deployment(FRONTEND_NAME, container)
}
