//! HTTP surface
//!
//! | Method | Path | Success |
//! |---|---|---|
//! | POST | `/v1/saas` | 201, provisioning continues in the background |
//! | GET | `/v1/saas` | 200, tenant listing |
//! | DELETE | `/v1/saas` | 202 |
//! | GET | `/health`, `/ready` | 200 |

mod error;

pub use error::ApiError;

use crate::error::Error;
use crate::provisioner::Provisioner;
use crate::tenant::{self, TenantSummary};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub provisioner: Provisioner,
}

/// Body of create and delete requests
#[derive(Debug, Serialize, Deserialize)]
pub struct NamespaceRequest {
    pub namespace: String,
}

#[derive(Debug, Serialize)]
struct Probe {
    status: &'static str,
}

pub fn router(provisioner: Provisioner, request_timeout: Duration) -> Router {
    Router::new()
        .route(
            "/v1/saas",
            get(list_tenants).post(create_tenant).delete(delete_tenant),
        )
        .route("/health", get(probe))
        .route("/ready", get(probe))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(AppState { provisioner })
}

fn parse_request(body: &[u8]) -> Result<NamespaceRequest, ApiError> {
    serde_json::from_slice(body).map_err(|e| Error::invalid_request(e.to_string()).into())
}

async fn create_tenant(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let request = parse_request(&body)?;
    state.provisioner.submit(&request.namespace).await?;
    info!(tenant = %request.namespace, "Tenant accepted");
    Ok(StatusCode::CREATED)
}

async fn list_tenants(State(state): State<AppState>) -> Result<Json<Vec<TenantSummary>>, ApiError> {
    let provisioner = &state.provisioner;
    let tenants = tenant::list_tenants(
        provisioner.cluster().as_ref(),
        &provisioner.settings().domain_suffix,
    )
    .await?;
    Ok(Json(tenants))
}

async fn delete_tenant(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let request = parse_request(&body)?;
    tenant::delete_tenant(state.provisioner.cluster().as_ref(), &request.namespace).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn probe() -> Json<Probe> {
    Json(Probe { status: "OK" })
}
