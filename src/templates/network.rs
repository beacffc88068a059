//! Service and ingress templates

use super::{backend_host, common_labels, selector_labels, tenant_host, BACKEND_NAME};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// ClusterIP service exposing a single named port
pub fn service(name: &str, selector: &str, port: i32) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(common_labels(name)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(selector_labels(selector)),
            ports: Some(vec![ServicePort {
                name: Some(name.to_string()),
                port,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Ingress routing the tenant's host for `service` to its port.
///
/// The backend answers on `{tenant}-backend{suffix}`, everything else on
/// `{tenant}{suffix}`.
pub fn ingress(
    service: &str,
    port: i32,
    tenant: &str,
    domain_suffix: &str,
    ingress_class: Option<&str>,
) -> Ingress {
    let host = if service.eq_ignore_ascii_case(BACKEND_NAME) {
        backend_host(tenant, domain_suffix)
    } else {
        tenant_host(tenant, domain_suffix)
    };

    Ingress {
        metadata: ObjectMeta {
            name: Some(service.to_string()),
            labels: Some(common_labels(service)),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: ingress_class.map(str::to_string),
            rules: Some(vec![IngressRule {
                host: Some(host),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: service.to_string(),
                                port: Some(ServiceBackendPort {
                                    number: Some(port),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
