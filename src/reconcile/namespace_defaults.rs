//! `NamespaceDefaults` has no state machine (§3.1 — treated as
//! singleton-by-convention, consulted by value, never driven through
//! phases). The reconciler here only validates the singleton convention and
//! records it as a condition, mirroring the teacher's own trivial
//! config-kind reconcilers that exist purely to surface misconfiguration
//! rather than to drive a lifecycle.

use crate::conditions;
use crate::context::Context;
use crate::crds::NamespaceDefaults;
use crate::error::Result;
use kube::api::{ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, Resource, ResourceExt};
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

#[instrument(skip(defaults, ctx), fields(name = %defaults.name_any(), namespace = %ctx.namespace))]
pub async fn reconcile(defaults: Arc<NamespaceDefaults>, ctx: Arc<Context>) -> Result<Action> {
    let api: Api<NamespaceDefaults> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let all = api.list(&ListParams::default()).await?;

    let is_singleton_winner = all
        .items
        .iter()
        .min_by_key(|d| d.meta().creation_timestamp.clone().map(|t| t.0))
        .map(kube::ResourceExt::name_any)
        == Some(defaults.name_any());

    let (reason, message) = if is_singleton_winner {
        ("Active", None)
    } else {
        (
            "Shadowed",
            Some(
                "another NamespaceDefaults in this namespace was created first and takes precedence"
                    .to_string(),
            ),
        )
    };

    let mut condition_list = defaults
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default();
    let unchanged = condition_list
        .last()
        .is_some_and(|c| c.reason.as_deref() == Some(reason) && c.message == message);
    if unchanged {
        return Ok(Action::await_change());
    }

    conditions::append(&mut condition_list, "Validated", reason, message);
    let patch = json!({ "status": { "conditions": condition_list } });
    api.patch_status(
        &defaults.name_any(),
        &PatchParams::default(),
        &Patch::Merge(&patch),
    )
    .await?;

    Ok(Action::await_change())
}

/// No retries — matching the teacher's `error_policy_{docs,code}`.
pub fn error_policy(
    defaults: Arc<NamespaceDefaults>,
    error: &crate::error::Error,
    _ctx: Arc<Context>,
) -> Action {
    tracing::error!(name = %defaults.name_any(), error = %error, "NamespaceDefaults reconcile failed, no retries");
    Action::await_change()
}
