//! Tenant model, name validation and listing
//!
//! A tenant has no storage of its own: its state lives as annotations on the
//! namespace that carries its name, and its admin credential lives in the
//! `backend-creds` secret inside that namespace.

use crate::cluster::TenantCluster;
use crate::error::{Error, Result};
use crate::stage::Stage;
use crate::status::{ANNOTATION_ERROR, ANNOTATION_MANAGER, ANNOTATION_STATUS, MANAGER_VALUE};
use crate::templates;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Longest name Kubernetes accepts for a namespace
pub const MAX_NAME_LEN: usize = 63;

/// Secret holding the backend admin credential
pub const CREDENTIALS_SECRET: &str = "backend-creds";

/// Username registered on every tenant backend
pub const ADMIN_USERNAME: &str = "admin";

const PASSWORD_LEN: usize = 8;
const PASSWORD_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new("^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("namespace pattern is valid")
    })
}

/// Validate a tenant name against the namespace naming rules.
///
/// Returns the name unchanged on success.
pub fn validate_name(name: &str) -> Result<String> {
    if name.len() > MAX_NAME_LEN || !name_pattern().is_match(name) {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(name.to_string())
}

/// A generated credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    /// Generate an 8 character alphanumeric password
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let value: String = (0..PASSWORD_LEN)
            .map(|_| PASSWORD_CHARSET[rng.gen_range(0..PASSWORD_CHARSET.len())] as char)
            .collect();
        Self(value)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// Username/password pair stored once the tenant is complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Password,
}

impl Credentials {
    pub fn admin(password: Password) -> Self {
        Self {
            username: ADMIN_USERNAME.to_string(),
            password,
        }
    }
}

/// One provisioned customer environment as observed from its namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub name: String,
    /// Raw status annotation; parse with [`Tenant::stage`]
    pub status: String,
    pub error_message: Option<String>,
    pub credentials: Option<Credentials>,
}

impl Tenant {
    /// Build a tenant from a managed namespace. Returns `None` for namespaces
    /// that do not carry the manager marker.
    pub fn from_namespace(namespace: &Namespace) -> Option<Self> {
        let annotations = namespace.metadata.annotations.as_ref()?;
        if annotations.get(ANNOTATION_MANAGER).map(String::as_str) != Some(MANAGER_VALUE) {
            return None;
        }
        Some(Self {
            name: namespace.metadata.name.clone()?,
            status: annotations.get(ANNOTATION_STATUS).cloned().unwrap_or_default(),
            error_message: annotations.get(ANNOTATION_ERROR).cloned(),
            credentials: None,
        })
    }

    pub fn stage(&self) -> Option<Stage> {
        self.status.parse().ok()
    }

    pub fn is_completed(&self) -> bool {
        self.stage() == Some(Stage::Completed)
    }
}

/// Read the admin credential out of a `backend-creds` secret
pub fn credentials_from_secret(secret: &Secret) -> Option<Credentials> {
    let read = |key: &str| -> Option<String> {
        if let Some(value) = secret.data.as_ref().and_then(|d| d.get(key)) {
            return String::from_utf8(value.0.clone()).ok();
        }
        secret
            .string_data
            .as_ref()
            .and_then(|d| d.get(key))
            .cloned()
    };
    Some(Credentials {
        username: read("username")?,
        password: Password(read("password")?),
    })
}

/// Listing entry returned by `GET /v1/saas`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSummary {
    pub name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub url: String,
}

impl TenantSummary {
    pub fn new(tenant: Tenant, domain_suffix: &str) -> Self {
        let url = templates::tenant_url(&tenant.name, domain_suffix);
        let (username, password) = match tenant.credentials {
            Some(c) => (Some(c.username), Some(c.password.0)),
            None => (None, None),
        };
        Self {
            name: tenant.name,
            status: tenant.status,
            error: tenant.error_message,
            username,
            password,
            url,
        }
    }
}

/// List every managed tenant with its current status.
///
/// Completed tenants whose credential secret cannot be read are left out.
pub async fn list_tenants(
    cluster: &dyn TenantCluster,
    domain_suffix: &str,
) -> Result<Vec<TenantSummary>> {
    let namespaces = cluster.list_namespaces().await?;
    let mut summaries = Vec::new();

    for namespace in &namespaces {
        let Some(mut tenant) = Tenant::from_namespace(namespace) else {
            continue;
        };

        if tenant.is_completed() {
            let secret = match cluster.get_secret(&tenant.name, CREDENTIALS_SECRET).await {
                Ok(Some(secret)) => secret,
                Ok(None) => {
                    warn!(tenant = %tenant.name, "Completed tenant has no {} secret", CREDENTIALS_SECRET);
                    continue;
                }
                Err(e) => {
                    warn!(tenant = %tenant.name, "Failed to fetch {}: {}", CREDENTIALS_SECRET, e);
                    continue;
                }
            };
            tenant.credentials = credentials_from_secret(&secret);
        }

        summaries.push(TenantSummary::new(tenant, domain_suffix));
    }

    Ok(summaries)
}

/// Delete a tenant by removing its namespace and everything in it.
///
/// Does not check the manager marker and does not wait for in-flight
/// provisioning; that task's remaining steps fail against the missing
/// namespace.
pub async fn delete_tenant(cluster: &dyn TenantCluster, name: &str) -> Result<()> {
    // A name the cluster would reject cannot exist
    if validate_name(name).is_err() || cluster.get_namespace(name).await?.is_none() {
        return Err(Error::NotFound(name.to_string()));
    }
    cluster.delete_namespace(name).await?;
    info!(tenant = %name, "Tenant namespace deleted");
    Ok(())
}
