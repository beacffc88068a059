//! Credential secret template

use crate::tenant::{Credentials, CREDENTIALS_SECRET};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Opaque secret holding the backend admin username and password
pub fn credentials_secret(credentials: &Credentials) -> Secret {
    let mut string_data = BTreeMap::new();
    string_data.insert("username".to_string(), credentials.username.clone());
    string_data.insert(
        "password".to_string(),
        credentials.password.expose().to_string(),
    );

    Secret {
        metadata: ObjectMeta {
            name: Some(CREDENTIALS_SECRET.to_string()),
            labels: Some(super::common_labels("backend")),
            ..Default::default()
        },
        string_data: Some(string_data),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}
