//! Admin bootstrap client
//!
//! Registers the first user on a freshly provisioned backend through its
//! public `/register` endpoint.

use crate::error::{Error, Result};
use crate::tenant::Credentials;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// Default deadline for the registration request
pub const DEFAULT_BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Creates the initial admin user on a tenant backend
#[async_trait::async_trait]
pub trait AdminRegistrar: Send + Sync {
    /// Register `credentials` on the backend reachable at `backend_url`.
    /// Transport errors and non-2xx answers are both failures.
    async fn register(&self, backend_url: &str, credentials: &Credentials) -> Result<()>;
}

/// [`AdminRegistrar`] speaking HTTP via reqwest
#[derive(Clone)]
pub struct HttpAdminRegistrar {
    http: reqwest::Client,
}

impl HttpAdminRegistrar {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait::async_trait]
impl AdminRegistrar for HttpAdminRegistrar {
    async fn register(&self, backend_url: &str, credentials: &Credentials) -> Result<()> {
        let url = format!("{}/register", backend_url.trim_end_matches('/'));
        let body = RegisterRequest {
            username: &credentials.username,
            password: credentials.password.expose(),
        };

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::bootstrap(format!(
                "registration at {} returned {}",
                url, status
            )));
        }

        info!(url = %url, username = %credentials.username, "Registered backend admin user");
        Ok(())
    }
}
