//! VolumeClaim builder operations (§4.1).

use crate::builder::owner;
use crate::labels;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, PersistentVolumeClaimSpec, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

fn pvc(
    name: &str,
    labels: BTreeMap<String, String>,
    access_mode: &str,
    storage_class: Option<&str>,
    size: &str,
    owner: k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference,
) -> PersistentVolumeClaim {
    let mut requests = BTreeMap::new();
    requests.insert("storage".to_string(), Quantity(size.to_string()));

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec![access_mode.to_string()]),
            storage_class_name: storage_class.map(str::to_string),
            resources: Some(ResourceRequirements {
                requests: Some(requests),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// `buildStandaloneVolumeClaim`: single-writer, owned by the Run.
pub fn build_standalone_volume_claim(
    name: &str,
    run_name: &str,
    run_uid: &str,
    storage_class: Option<&str>,
    storage_size: &str,
) -> PersistentVolumeClaim {
    pvc(
        name,
        labels::standalone_volume_claim(run_name),
        "ReadWriteOnce",
        storage_class,
        storage_size,
        owner::run_owner(run_name, run_uid),
    )
}

/// `buildSharedWorkspaceVolumeClaim`: multi-writer, owned by the Workspace,
/// default 10Gi if unspecified.
pub fn build_shared_workspace_volume_claim(
    name: &str,
    workspace_name: &str,
    workspace_uid: &str,
    storage_class: Option<&str>,
    storage_size: Option<&str>,
) -> PersistentVolumeClaim {
    pvc(
        name,
        labels::workspace_volume_claim(workspace_name),
        "ReadWriteMany",
        storage_class,
        storage_size.unwrap_or("10Gi"),
        owner::workspace_owner(workspace_name, workspace_uid),
    )
}

/// `buildAuxiliaryVolumeClaim`: multi-writer, default 1Gi if unspecified.
pub fn build_auxiliary_volume_claim(
    name: &str,
    workspace_name: &str,
    workspace_uid: &str,
    storage_class: Option<&str>,
    storage_size: Option<&str>,
) -> PersistentVolumeClaim {
    pvc(
        name,
        labels::shared_volume_claim(workspace_name),
        "ReadWriteMany",
        storage_class,
        storage_size.unwrap_or("1Gi"),
        owner::workspace_owner(workspace_name, workspace_uid),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standalone_claim_is_single_writer_and_owned_by_run() {
        let claim = build_standalone_volume_claim("r1-workspace", "r1", "uid-1", None, "10Gi");
        assert_eq!(
            claim.spec.as_ref().unwrap().access_modes,
            Some(vec!["ReadWriteOnce".to_string()])
        );
        let owners = claim.metadata.owner_references.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "Run");
        assert_eq!(owners[0].name, "r1");
    }

    #[test]
    fn shared_workspace_claim_defaults_to_10gi() {
        let claim =
            build_shared_workspace_volume_claim("w1-ws", "w1", "uid-w1", None, None);
        let requests = claim
            .spec
            .unwrap()
            .resources
            .unwrap()
            .requests
            .unwrap();
        assert_eq!(requests.get("storage").unwrap().0, "10Gi");
    }

    #[test]
    fn auxiliary_claim_defaults_to_1gi() {
        let claim = build_auxiliary_volume_claim("w1-agent-cfg", "w1", "uid-w1", None, None);
        let requests = claim
            .spec
            .unwrap()
            .resources
            .unwrap()
            .requests
            .unwrap();
        assert_eq!(requests.get("storage").unwrap().0, "1Gi");
    }
}
