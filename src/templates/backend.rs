//! Backend API workload

use super::database::{DATABASE_DB, DATABASE_NAME, DATABASE_PORT, DATABASE_USER};
use super::{env, resources, single_container_deployment};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, ContainerPort};

pub const BACKEND_NAME: &str = "backend";
pub const BACKEND_CONTAINER: &str = "backend";
pub const BACKEND_PORT: i32 = 8080;
pub const BACKEND_PASSWORD_ENV: &str = "SPRING_DATASOURCE_PASSWORD";

const IMAGE: &str = "bennerv/order-meow-api:0.1.0";

/// Backend deployment pointed at the in-namespace database service, with an
/// empty datasource password slot
pub fn backend_deployment() -> Deployment {
    let datasource_url = format!(
        "jdbc:postgresql://{}:{}/{}",
        DATABASE_NAME, DATABASE_PORT, DATABASE_DB
    );

    let container = Container {
        name: BACKEND_CONTAINER.to_string(),
        image: Some(IMAGE.to_string()),
        ports: Some(vec![ContainerPort {
            name: Some("http".to_string()),
            container_port: BACKEND_PORT,
            ..Default::default()
        }]),
        env: Some(vec![
            env("SPRING_DATASOURCE_URL", &datasource_url),
            env("SPRING_DATASOURCE_USERNAME", DATABASE_USER),
            env(BACKEND_PASSWORD_ENV, ""),
        ]),
        resources: Some(resources(("250Mi", "100m"), ("2Gi", "2000m"))),
        ..Default::default()
    };

    single_container_deployment(BACKEND_NAME, container)
}
