//! PostgreSQL workload

use super::{env, resources, single_container_deployment};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, ContainerPort};

pub const DATABASE_NAME: &str = "postgresql";
pub const DATABASE_CONTAINER: &str = "postgresql";
pub const DATABASE_PORT: i32 = 5432;
pub const DATABASE_PASSWORD_ENV: &str = "POSTGRES_PASSWORD";

const IMAGE: &str = "postgres:12.3-alpine";
pub(crate) const DATABASE_DB: &str = "postgresdb";
pub(crate) const DATABASE_USER: &str = "postgresuser";

/// Database deployment with an empty password slot
pub fn database_deployment() -> Deployment {
    let container = Container {
        name: DATABASE_CONTAINER.to_string(),
        image: Some(IMAGE.to_string()),
        ports: Some(vec![ContainerPort {
            name: Some("postgresql".to_string()),
            container_port: DATABASE_PORT,
            ..Default::default()
        }]),
        env: Some(vec![
            env("POSTGRES_DB", DATABASE_DB),
            env("POSTGRES_USER", DATABASE_USER),
            env(DATABASE_PASSWORD_ENV, ""),
        ]),
        resources: Some(resources(("50Mi", "50m"), ("250Mi", "1000m"))),
        ..Default::default()
    };

    single_container_deployment(DATABASE_NAME, container)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    #[test]
    fn test_database_deployment() {
        let deployment = database_deployment();
        assert_eq!(deployment.metadata.name.as_deref(), Some("postgresql"));

        let pod = deployment.spec.unwrap().template.spec.unwrap();
        let container = &pod.containers[0];
        assert_eq!(container.image.as_deref(), Some("postgres:12.3-alpine"));

        let limits = container.resources.as_ref().unwrap().limits.as_ref().unwrap();
        assert_eq!(limits.get("memory"), Some(&Quantity("250Mi".to_string())));
        assert_eq!(limits.get("cpu"), Some(&Quantity("1000m".to_string())));

        let password = container
            .env
            .as_ref()
            .unwrap()
            .iter()
            .find(|e| e.name == DATABASE_PASSWORD_ENV)
            .unwrap();
        assert_eq!(password.value.as_deref(), Some(""));
    }
}
