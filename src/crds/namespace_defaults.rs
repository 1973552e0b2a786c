//! `NamespaceDefaults` Custom Resource Definition — optional per-scope defaults.
//!
//! Treated as singleton-by-convention (§3.1): if multiple exist in a scope,
//! the first listed is used; if none exist, reconcilers fall back to the
//! hardcoded defaults in [`crate::config::ControllerConfig`]. There is no
//! dedicated state machine for this kind — no Phase field, just a thin
//! validation-condition reconciler (see [`crate::reconcile::namespace_defaults`]),
//! mirroring the teacher's own trivial config-kind reconciler.

use crate::crds::run::{AgentKind, EnvVarEntry};
use k8s_openapi::api::core::v1::ResourceRequirements;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "agents.platform.io",
    version = "v1alpha1",
    kind = "NamespaceDefaults",
    namespaced
)]
#[kube(status = "NamespaceDefaultsStatus")]
#[serde(rename_all = "camelCase")]
pub struct NamespaceDefaultsSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_agent_kind: Option<AgentKind>,

    #[serde(default)]
    pub default_providers_by_agent_kind: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_timeout_seconds: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_storage_class: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_storage_size: Option<String>,

    #[serde(default)]
    pub common_env: Vec<EnvVarEntry>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceDefaultsCondition {
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
pub struct NamespaceDefaultsStatus {
    #[serde(default)]
    pub conditions: Vec<NamespaceDefaultsCondition>,
}
