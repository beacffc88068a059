//! SaaS tenant provisioner
//!
//! ## Usage
//!
//! ```bash
//! # Run against the current kubeconfig context
//! saas-provisioner --domain-suffix .tenants.example.com
//!
//! # Run with custom log level
//! RUST_LOG=debug saas-provisioner
//! ```

use clap::Parser;
use kube::Client;
use saas_provisioner::{api, Config, HttpAdminRegistrar, KubeCluster, Provisioner};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = Config::parse();
    config.validate()?;

    info!("Starting SaaS provisioner");
    info!(
        domain_suffix = %config.domain_suffix,
        max_concurrent = config.max_concurrent_provisions,
        "Provisioning settings"
    );

    // In-cluster service account first, then the local kubeconfig
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let cancel = CancellationToken::new();
    let provisioner = Provisioner::new(
        Arc::new(KubeCluster::new(client)),
        Arc::new(HttpAdminRegistrar::new(config.bootstrap_timeout())?),
        config.provisioner_settings(),
        cancel.clone(),
    );

    let app = api::router(provisioner.clone(), config.request_timeout());
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(in_flight = provisioner.in_flight(), "Stopping provisioning tasks");
    if !provisioner.shutdown(config.shutdown_timeout()).await {
        warn!("Provisioning tasks still running at shutdown deadline");
    }

    info!("SaaS provisioner shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Received shutdown signal");
}
