//! Process configuration
//!
//! Every option can be given as a flag or through the environment.

use crate::bootstrap::DEFAULT_BOOTSTRAP_TIMEOUT;
use crate::error::{Error, Result};
use crate::provisioner::{ProvisionerSettings, DEFAULT_MAX_CONCURRENT};
use crate::readiness::DEFAULT_READINESS_TIMEOUT;
use clap::Parser;
use std::time::Duration;

/// SaaS tenant provisioner
#[derive(Parser, Debug, Clone)]
#[command(name = "saas-provisioner")]
#[command(version, about = "Provisions per-tenant application stacks on Kubernetes")]
pub struct Config {
    /// Bind host for the HTTP API
    #[arg(long, env = "SAAS_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Bind port for the HTTP API
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Suffix appended to tenant hostnames
    #[arg(long, env = "DOMAIN_SUFFIX", default_value = ".example.com")]
    pub domain_suffix: String,

    /// Seconds each workload may take to report a ready replica
    #[arg(long, env = "READINESS_TIMEOUT_SECS", default_value_t = DEFAULT_READINESS_TIMEOUT.as_secs())]
    pub readiness_timeout_secs: u64,

    /// Deadline in seconds for the admin registration request
    #[arg(long, env = "BOOTSTRAP_TIMEOUT_SECS", default_value_t = DEFAULT_BOOTSTRAP_TIMEOUT.as_secs())]
    pub bootstrap_timeout_secs: u64,

    /// Tenants provisioned at the same time; further tenants queue
    #[arg(long, env = "MAX_CONCURRENT_PROVISIONS", default_value_t = DEFAULT_MAX_CONCURRENT)]
    pub max_concurrent_provisions: usize,

    /// HTTP request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 5)]
    pub request_timeout_secs: u64,

    /// Seconds to wait for in-flight provisioning on shutdown
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,

    /// Ingress class for tenant ingresses (cluster default if unset)
    #[arg(long, env = "INGRESS_CLASS")]
    pub ingress_class: Option<String>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !self.domain_suffix.starts_with('.') || self.domain_suffix.len() < 2 {
            return Err(Error::configuration(format!(
                "domain suffix must start with '.', got {:?}",
                self.domain_suffix
            )));
        }
        if self.max_concurrent_provisions == 0 {
            return Err(Error::configuration(
                "max concurrent provisions must be at least 1",
            ));
        }
        for (flag, value) in [
            ("readiness-timeout-secs", self.readiness_timeout_secs),
            ("bootstrap-timeout-secs", self.bootstrap_timeout_secs),
            ("request-timeout-secs", self.request_timeout_secs),
        ] {
            if value == 0 {
                return Err(Error::configuration(format!("{} must be positive", flag)));
            }
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_secs(self.bootstrap_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn provisioner_settings(&self) -> ProvisionerSettings {
        ProvisionerSettings {
            domain_suffix: self.domain_suffix.clone(),
            readiness_timeout: self.readiness_timeout(),
            ingress_class: self.ingress_class.clone(),
            max_concurrent: self.max_concurrent_provisions,
        }
    }
}
