//! `Workspace` Custom Resource Definition — a shared, durable checkout.

use crate::crds::run::RepositorySpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SharedVolumeSpec {
    pub name: String,
    pub mount_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_size: Option<String>,
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "agents.platform.io",
    version = "v1alpha1",
    kind = "Workspace",
    namespaced
)]
#[kube(status = "WorkspaceStatus")]
#[kube(printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#)]
#[kube(printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSpec {
    pub repository: RepositorySpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_size: Option<String>,

    /// Names must be unique within the list (§3.1).
    #[serde(default)]
    pub shared_volumes: Vec<SharedVolumeSpec>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum WorkspacePhase {
    Pending,
    Initializing,
    Ready,
    Failed,
}

impl WorkspacePhase {
    /// Ready and Failed are absorbing (§4.4 step 1).
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkspacePhase::Ready | WorkspacePhase::Failed)
    }
}

impl std::fmt::Display for WorkspacePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkspacePhase::Pending => "Pending",
            WorkspacePhase::Initializing => "Initializing",
            WorkspacePhase::Ready => "Ready",
            WorkspacePhase::Failed => "Failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStatus {
    #[serde(default)]
    pub phase: Option<WorkspacePhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_volume_name: Option<String>,
    /// Shared-volume-name → created VolumeClaim name.
    #[serde(default)]
    pub shared_volume_names: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_job_name: Option<String>,
    #[serde(default)]
    pub conditions: Vec<WorkspaceCondition>,
}
