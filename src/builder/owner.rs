//! Owner-reference construction.
//!
//! Ownership encodes lifecycle containment for cascading GC (§9). The only
//! two owning relations in this system are Run→{VolumeClaim, Job} (standalone)
//! and Workspace→{VolumeClaim(s), Job}. The Run→Workspace relation (shared
//! mode) is a lookup reference only and must never become an owner reference
//! in either direction.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

pub const API_VERSION: &str = "agents.platform.io/v1alpha1";

pub fn run_owner(name: &str, uid: &str) -> OwnerReference {
    OwnerReference {
        api_version: API_VERSION.to_string(),
        kind: "Run".to_string(),
        name: name.to_string(),
        uid: uid.to_string(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

pub fn workspace_owner(name: &str, uid: &str) -> OwnerReference {
    OwnerReference {
        api_version: API_VERSION.to_string(),
        kind: "Workspace".to_string(),
        name: name.to_string(),
        uid: uid.to_string(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}
