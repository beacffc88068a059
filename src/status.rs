//! Tenant status annotations
//!
//! Provisioning progress is recorded on the tenant's own namespace as
//! annotations, so no separate datastore is needed. Writes are merge patches:
//! keys not mentioned in a patch are preserved.

use crate::cluster::TenantCluster;
use crate::stage::Stage;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

// Annotation keys
pub const ANNOTATION_MANAGER: &str = "manager";
pub const ANNOTATION_STATUS: &str = "status";
pub const ANNOTATION_ERROR: &str = "error";
pub const ANNOTATION_UPDATED_AT: &str = "status-updated-at";

/// Value of the manager annotation on every namespace this service owns
pub const MANAGER_VALUE: &str = "saas";

/// Annotations for a namespace that has reached `stage`
pub fn stage_annotations(stage: Stage) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    annotations.insert(ANNOTATION_MANAGER.to_string(), MANAGER_VALUE.to_string());
    annotations.insert(ANNOTATION_STATUS.to_string(), stage.to_string());
    annotations.insert(ANNOTATION_UPDATED_AT.to_string(), Utc::now().to_rfc3339());
    annotations
}

/// Annotations for a namespace whose provisioning failed while attempting `stage`
pub fn failure_annotations(stage: Stage, message: &str) -> BTreeMap<String, String> {
    let mut annotations = stage_annotations(Stage::Failed);
    annotations.insert(ANNOTATION_ERROR.to_string(), failure_message(stage, message));
    annotations
}

/// Human-readable error naming the stage that failed
pub fn failure_message(stage: Stage, message: &str) -> String {
    format!("{}: {}", stage, message)
}

/// Records stage progress on the tenant namespace.
///
/// Patch failures are logged and swallowed; the recorded status may then lag
/// behind the actual progress.
#[derive(Clone)]
pub struct StatusAnnotator {
    cluster: Arc<dyn TenantCluster>,
}

impl StatusAnnotator {
    pub fn new(cluster: Arc<dyn TenantCluster>) -> Self {
        Self { cluster }
    }

    pub async fn record_stage(&self, tenant: &str, stage: Stage) {
        debug!(tenant = %tenant, stage = %stage, "Recording stage");
        self.patch(tenant, stage_annotations(stage)).await;
    }

    pub async fn record_failure(&self, tenant: &str, stage: Stage, message: &str) {
        debug!(tenant = %tenant, stage = %stage, "Recording failure");
        self.patch(tenant, failure_annotations(stage, message)).await;
    }

    async fn patch(&self, tenant: &str, annotations: BTreeMap<String, String>) {
        if let Err(e) = self
            .cluster
            .patch_namespace_annotations(tenant, &annotations)
            .await
        {
            warn!(tenant = %tenant, "Failed to patch namespace status: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::FakeCluster;

    #[test]
    fn test_stage_annotations() {
        let annotations = stage_annotations(Stage::DbReady);
        assert_eq!(annotations.get(ANNOTATION_MANAGER).map(String::as_str), Some("saas"));
        assert_eq!(annotations.get(ANNOTATION_STATUS).map(String::as_str), Some("DBReady"));
        assert!(annotations.contains_key(ANNOTATION_UPDATED_AT));
        assert!(!annotations.contains_key(ANNOTATION_ERROR));
    }

    #[test]
    fn test_failure_annotations_name_the_stage() {
        let annotations = failure_annotations(Stage::DbReady, "postgresql deployment not ready");
        assert_eq!(annotations.get(ANNOTATION_STATUS).map(String::as_str), Some("Failed"));
        assert_eq!(
            annotations.get(ANNOTATION_ERROR).map(String::as_str),
            Some("DBReady: postgresql deployment not ready")
        );
    }

    #[tokio::test]
    async fn test_patches_merge_into_existing_annotations() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.seed_namespace("acme", &[("manager", "saas"), ("owner", "team-a")]);
        let annotator = StatusAnnotator::new(cluster.clone());

        annotator.record_stage("acme", Stage::DbDeployed).await;
        annotator
            .record_failure("acme", Stage::DbReady, "postgresql deployment not ready")
            .await;

        let annotations = cluster.annotations("acme").unwrap();
        assert_eq!(annotations.get("owner").map(String::as_str), Some("team-a"));
        assert_eq!(annotations.get("status").map(String::as_str), Some("Failed"));
        assert_eq!(
            annotations.get("error").map(String::as_str),
            Some("DBReady: postgresql deployment not ready")
        );
    }

    #[tokio::test]
    async fn test_patch_failure_is_swallowed() {
        let cluster = Arc::new(FakeCluster::new());
        let annotator = StatusAnnotator::new(cluster.clone());

        // Namespace does not exist: the patch fails but the call returns normally
        annotator.record_stage("ghost", Stage::DbDeployed).await;
        assert!(cluster.annotations("ghost").is_none());
    }
}
