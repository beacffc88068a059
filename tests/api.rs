use axum::body::{Body, Bytes};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use saas_provisioner::testkit::{FakeCluster, RecordingRegistrar};
use saas_provisioner::{api, Provisioner, ProvisionerSettings};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    cluster: Arc<FakeCluster>,
    registrar: Arc<RecordingRegistrar>,
    provisioner: Provisioner,
}

fn app() -> TestApp {
    app_with_timeout(Duration::from_secs(5))
}

fn app_with_timeout(request_timeout: Duration) -> TestApp {
    let cluster = Arc::new(FakeCluster::new());
    let registrar = Arc::new(RecordingRegistrar::new());
    let settings = ProvisionerSettings {
        domain_suffix: ".example.com".to_string(),
        readiness_timeout: Duration::from_millis(100),
        ..Default::default()
    };
    let provisioner = Provisioner::new(
        cluster.clone(),
        registrar.clone(),
        settings,
        CancellationToken::new(),
    );
    TestApp {
        router: api::router(provisioner.clone(), request_timeout),
        cluster,
        registrar,
        provisioner,
    }
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<&str>,
) -> (StatusCode, Bytes) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes)
}

fn json_of(bytes: &Bytes) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

async fn listing(router: &Router) -> Vec<Value> {
    let (status, body) = send(router, Method::GET, "/v1/saas", None).await;
    assert_eq!(status, StatusCode::OK);
    json_of(&body).as_array().cloned().unwrap()
}

#[tokio::test]
async fn create_then_list_completed_tenant() {
    let app = app();

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/v1/saas",
        Some(r#"{"namespace":"acme"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body.is_empty());

    app.provisioner.wait_idle().await;

    let tenants = listing(&app.router).await;
    assert_eq!(tenants.len(), 1);
    let acme = &tenants[0];
    assert_eq!(acme["name"], "acme");
    assert_eq!(acme["status"], "Completed");
    assert_eq!(acme["username"], "admin");
    assert_eq!(acme["url"], "http://acme.example.com");
    assert!(acme.get("error").is_none());

    let password = acme["password"].as_str().unwrap();
    assert_eq!(password.len(), 8);
    assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    assert_eq!(app.registrar.calls()[0].password, password);
}

#[tokio::test]
async fn timed_out_create_still_completes() {
    let app = app_with_timeout(Duration::from_millis(50));
    app.cluster.slow_namespace_create(Duration::from_millis(300));
    let request = Some(r#"{"namespace":"acme"}"#);

    let (status, _) = send(&app.router, Method::POST, "/v1/saas", request).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);

    app.provisioner.wait_idle().await;
    assert_eq!(
        app.cluster.status_history("acme").last().map(String::as_str),
        Some("Completed")
    );

    let tenants = listing(&app.router).await;
    assert_eq!(tenants[0]["status"], "Completed");
    assert_eq!(tenants[0]["username"], "admin");
}

#[tokio::test]
async fn create_rejects_invalid_name() {
    let app = app();
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/v1/saas",
        Some(r#"{"namespace":"ACME!"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json_of(&body)["error"].as_str().unwrap().contains("ACME!"));
    assert!(app.cluster.namespace_names().is_empty());
}

#[tokio::test]
async fn create_rejects_malformed_body() {
    let app = app();
    for body in [r#"{"namespace":"#, r#"{"name":"acme"}"#, ""] {
        let (status, response) = send(&app.router, Method::POST, "/v1/saas", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{:?}", body);
        assert!(json_of(&response).get("error").is_some());
    }
}

#[tokio::test]
async fn duplicate_create_conflicts() {
    let app = app();
    let request = Some(r#"{"namespace":"acme"}"#);

    let (status, _) = send(&app.router, Method::POST, "/v1/saas", request).await;
    assert_eq!(status, StatusCode::CREATED);

    // Still in progress
    let (status, _) = send(&app.router, Method::POST, "/v1/saas", request).await;
    assert_eq!(status, StatusCode::CONFLICT);

    app.provisioner.wait_idle().await;

    // Completed
    let (status, _) = send(&app.router, Method::POST, "/v1/saas", request).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(app.registrar.calls().len(), 1);
}

#[tokio::test]
async fn failed_tenant_lists_error_without_credentials() {
    let app = app();
    app.cluster.never_ready("backend");

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/v1/saas",
        Some(r#"{"namespace":"acme"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    app.provisioner.wait_idle().await;

    let tenants = listing(&app.router).await;
    let acme = &tenants[0];
    assert_eq!(acme["status"], "Failed");
    assert!(acme["error"].as_str().unwrap().starts_with("BackendReady:"));
    assert!(acme.get("username").is_none());
    assert!(acme.get("password").is_none());
}

#[tokio::test]
async fn listing_skips_unmanaged_namespaces() {
    let app = app();
    app.cluster.seed_namespace("kube-system", &[]);
    app.cluster
        .seed_namespace("initech", &[("manager", "saas"), ("status", "DBReady")]);

    let tenants = listing(&app.router).await;
    assert_eq!(
        tenants,
        vec![json!({
            "name": "initech",
            "status": "DBReady",
            "url": "http://initech.example.com"
        })]
    );
}

#[tokio::test]
async fn empty_listing_is_an_array() {
    let app = app();
    let (status, body) = send(&app.router, Method::GET, "/v1/saas", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body), json!([]));
}

#[tokio::test]
async fn listing_failure_is_server_error() {
    let app = app();
    app.cluster.fail_listing();
    let (status, body) = send(&app.router, Method::GET, "/v1/saas", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json_of(&body).get("error").is_some());
}

#[tokio::test]
async fn delete_tenant() {
    let app = app();

    let (status, _) = send(
        &app.router,
        Method::DELETE,
        "/v1/saas",
        Some(r#"{"namespace":"doesnotexist"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/v1/saas",
        Some(r#"{"namespace":"acme"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    app.provisioner.wait_idle().await;

    let (status, _) = send(
        &app.router,
        Method::DELETE,
        "/v1/saas",
        Some(r#"{"namespace":"acme"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(listing(&app.router).await.is_empty());

    let (status, _) = send(&app.router, Method::DELETE, "/v1/saas", Some("not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn probes_report_ok() {
    let app = app();
    for path in ["/health", "/ready"] {
        let (status, body) = send(&app.router, Method::GET, path, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body), json!({"status": "OK"}));
    }
}
