//! The stage sequence for one tenant

use super::Provisioner;
use crate::stage::Stage;
use crate::templates::{
    self, BACKEND_CONTAINER, BACKEND_NAME, BACKEND_PASSWORD_ENV, BACKEND_PORT, DATABASE_CONTAINER,
    DATABASE_NAME, DATABASE_PASSWORD_ENV, DATABASE_PORT, FRONTEND_API_URL_ENV,
    FRONTEND_CONTAINER, FRONTEND_NAME, FRONTEND_PORT,
};
use crate::tenant::{Credentials, Password};
use k8s_openapi::api::apps::v1::Deployment;
use std::fmt::Display;
use tracing::info;

/// The stage that was being attempted and why it failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
}

/// Attributes an error to the stage being attempted
trait AtStage<T> {
    fn at_stage(self, stage: Stage, what: &str) -> Result<T, StageFailure>;
}

impl<T, E: Display> AtStage<T> for Result<T, E> {
    fn at_stage(self, stage: Stage, what: &str) -> Result<T, StageFailure> {
        self.map_err(|e| StageFailure {
            stage,
            message: format!("{}: {}", what, e),
        })
    }
}

impl Provisioner {
    pub(super) async fn run_stages(&self, tenant: &str) -> Result<(), StageFailure> {
        let settings = &self.inner.settings;
        let cluster = &self.inner.cluster;
        let ingress_class = settings.ingress_class.as_deref();

        let mut reached = Stage::Created;

        // Shared by the database and the backend datasource
        let db_password = Password::generate();

        // Database
        let mut database = templates::database_deployment();
        templates::set_container_env(
            &mut database,
            DATABASE_CONTAINER,
            DATABASE_PASSWORD_ENV,
            db_password.expose(),
        )
        .at_stage(Stage::DbDeployed, "failed to prepare postgresql deployment")?;
        self.deploy(
            tenant,
            &mut reached,
            &database,
            Stage::DbDeployed,
            "failed to create postgresql deployment",
        )
        .await?;
        self.await_ready(tenant, &mut reached, DATABASE_NAME, Stage::DbReady).await?;

        cluster
            .create_service(
                tenant,
                &templates::service(DATABASE_NAME, DATABASE_NAME, DATABASE_PORT),
            )
            .await
            .at_stage(Stage::DbServiceCreated, "failed to create postgresql service")?;
        self.advance(tenant, &mut reached, Stage::DbServiceCreated).await?;

        // Backend
        let mut backend = templates::backend_deployment();
        templates::set_container_env(
            &mut backend,
            BACKEND_CONTAINER,
            BACKEND_PASSWORD_ENV,
            db_password.expose(),
        )
        .at_stage(Stage::BackendDeployed, "failed to prepare backend deployment")?;
        self.deploy(
            tenant,
            &mut reached,
            &backend,
            Stage::BackendDeployed,
            "failed to create backend deployment",
        )
        .await?;
        self.await_ready(tenant, &mut reached, BACKEND_NAME, Stage::BackendReady).await?;

        cluster
            .create_service(
                tenant,
                &templates::service(BACKEND_NAME, BACKEND_NAME, BACKEND_PORT),
            )
            .await
            .at_stage(Stage::BackendServiceCreated, "failed to create backend service")?;
        self.advance(tenant, &mut reached, Stage::BackendServiceCreated).await?;

        cluster
            .create_ingress(
                tenant,
                &templates::ingress(
                    BACKEND_NAME,
                    BACKEND_PORT,
                    tenant,
                    &settings.domain_suffix,
                    ingress_class,
                ),
            )
            .await
            .at_stage(Stage::BackendIngressCreated, "failed to create backend ingress")?;
        self.advance(tenant, &mut reached, Stage::BackendIngressCreated).await?;

        // Frontend
        let backend_url = templates::backend_url(tenant, &settings.domain_suffix);
        let mut frontend = templates::frontend_deployment();
        templates::set_container_env(
            &mut frontend,
            FRONTEND_CONTAINER,
            FRONTEND_API_URL_ENV,
            &backend_url,
        )
        .at_stage(Stage::FrontendDeployed, "failed to prepare frontend deployment")?;
        self.deploy(
            tenant,
            &mut reached,
            &frontend,
            Stage::FrontendDeployed,
            "failed to create frontend deployment",
        )
        .await?;
        self.await_ready(tenant, &mut reached, FRONTEND_NAME, Stage::FrontendReady).await?;

        cluster
            .create_service(
                tenant,
                &templates::service(FRONTEND_NAME, FRONTEND_NAME, FRONTEND_PORT),
            )
            .await
            .at_stage(Stage::FrontendServiceCreated, "failed to create frontend service")?;
        self.advance(tenant, &mut reached, Stage::FrontendServiceCreated).await?;

        cluster
            .create_ingress(
                tenant,
                &templates::ingress(
                    FRONTEND_NAME,
                    FRONTEND_PORT,
                    tenant,
                    &settings.domain_suffix,
                    ingress_class,
                ),
            )
            .await
            .at_stage(Stage::FrontendIngressCreated, "failed to create frontend ingress")?;
        self.advance(tenant, &mut reached, Stage::FrontendIngressCreated).await?;

        // Admin user, with its own password
        let credentials = Credentials::admin(Password::generate());
        let registered = tokio::select! {
            biased;
            _ = self.inner.cancel.cancelled() => Err(StageFailure {
                stage: Stage::AdminUserRegistered,
                message: "admin registration cancelled by shutdown".to_string(),
            }),
            outcome = self.inner.registrar.register(&backend_url, &credentials) => {
                outcome.at_stage(Stage::AdminUserRegistered, "failed to create backend admin user")
            }
        };
        registered?;
        self.advance(tenant, &mut reached, Stage::AdminUserRegistered).await?;

        cluster
            .create_secret(tenant, &templates::credentials_secret(&credentials))
            .await
            .at_stage(Stage::CredentialsStored, "failed to create backend secret")?;
        self.advance(tenant, &mut reached, Stage::CredentialsStored).await?;

        self.advance(tenant, &mut reached, Stage::Completed).await?;
        Ok(())
    }

    async fn deploy(
        &self,
        tenant: &str,
        reached: &mut Stage,
        deployment: &Deployment,
        stage: Stage,
        what: &'static str,
    ) -> Result<(), StageFailure> {
        self.inner
            .cluster
            .create_deployment(tenant, deployment)
            .await
            .at_stage(stage, what)?;
        self.advance(tenant, reached, stage).await
    }

    async fn await_ready(
        &self,
        tenant: &str,
        reached: &mut Stage,
        deployment: &str,
        stage: Stage,
    ) -> Result<(), StageFailure> {
        self.inner
            .cluster
            .wait_deployment_ready(
                tenant,
                deployment,
                self.inner.settings.readiness_timeout,
                &self.inner.cancel,
            )
            .await
            .map_err(|e| StageFailure {
                stage,
                message: format!("{} deployment not ready: {}", deployment, e),
            })?;
        self.advance(tenant, reached, stage).await
    }

    /// Record `stage` if it is the legal successor of `reached`
    async fn advance(
        &self,
        tenant: &str,
        reached: &mut Stage,
        stage: Stage,
    ) -> Result<(), StageFailure> {
        if !reached.can_transition_to(stage) {
            return Err(StageFailure {
                stage,
                message: format!("illegal transition from {} to {}", reached, stage),
            });
        }
        info!(tenant = %tenant, stage = %stage, "Stage reached");
        self.inner.annotator.record_stage(tenant, stage).await;
        *reached = stage;
        Ok(())
    }
}
