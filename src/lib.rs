//! SaaS tenant provisioner
//!
//! Turns a tenant name into an isolated application stack on Kubernetes: a
//! namespace holding a PostgreSQL database, a backend API and a web frontend,
//! each exposed through a service and (for the backend and frontend) an
//! ingress, plus an admin user registered on the backend.
//!
//! ## Flow
//!
//! `POST /v1/saas {"namespace": "acme"}` claims the `acme` namespace and
//! returns immediately. A background worker then walks the stage sequence,
//! recording progress as annotations on the namespace:
//!
//! ```text
//! Created -> DBDeployed -> DBReady -> DBServiceCreated -> BackendDeployed -> ...
//!         -> AdminUserRegistered -> CredentialsStored -> Completed
//! ```
//!
//! Any failure ends the sequence in `Failed` with an error naming the stage.
//! `GET /v1/saas` reports every tenant's status, and the admin credential once
//! complete.

pub mod api;
pub mod bootstrap;
pub mod cluster;
pub mod config;
pub mod error;
pub mod provisioner;
pub mod readiness;
pub mod stage;
pub mod status;
pub mod templates;
pub mod tenant;
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use bootstrap::{AdminRegistrar, HttpAdminRegistrar};
pub use cluster::{KubeCluster, TenantCluster};
pub use config::Config;
pub use error::{Error, Result};
pub use provisioner::{Provisioner, ProvisionerSettings};
pub use stage::Stage;
pub use tenant::{Credentials, Password, Tenant, TenantSummary};
