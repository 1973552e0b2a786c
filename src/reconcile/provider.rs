//! `ProviderReconciler` (§4.3): validates a credential descriptor and sets
//! `status.ready` plus exactly one `Ready` condition. Never creates or
//! deletes objects — the only reconciler in the core that is pure
//! lookup-and-status.

use crate::context::Context;
use crate::crds::{Provider, ProviderCondition};
use crate::error::{is_not_found, Result};
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, ResourceExt};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, instrument};

#[instrument(skip(provider, ctx), fields(name = %provider.name_any(), namespace = %ctx.namespace))]
pub async fn reconcile(provider: Arc<Provider>, ctx: Arc<Context>) -> Result<Action> {
    let (ready, reason, message) = match &provider.spec.auth_token_secret_ref {
        None => (true, "NoSecretRequired", None),
        Some(secret_ref) => {
            let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
            match secrets.get(&secret_ref.name).await {
                Err(e) if is_not_found(&e) => (
                    false,
                    "SecretValidation",
                    Some(format!("secret '{}' not found", secret_ref.name)),
                ),
                Err(e) => return Err(e.into()),
                Ok(secret) => {
                    let has_key = secret
                        .data
                        .as_ref()
                        .is_some_and(|data| data.contains_key(&secret_ref.key));
                    if has_key {
                        (true, "SecretValidation", None)
                    } else {
                        (
                            false,
                            "SecretValidation",
                            Some(format!(
                                "secret '{}' has no key '{}'",
                                secret_ref.name, secret_ref.key
                            )),
                        )
                    }
                }
            }
        }
    };

    let already_ready = provider.status.as_ref().is_some_and(|s| s.ready) == ready;
    let condition = ProviderCondition {
        condition_type: "Ready".to_string(),
        status: if ready { "True" } else { "False" }.to_string(),
        last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
        reason: Some(reason.to_string()),
        message,
    };

    if already_ready
        && provider
            .status
            .as_ref()
            .and_then(|s| s.conditions.last())
            .is_some_and(|c| c.reason == condition.reason && c.message == condition.message)
    {
        debug!("provider readiness unchanged, skipping status write");
        return Ok(Action::await_change());
    }

    let providers: Api<Provider> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let patch = json!({
        "status": {
            "ready": ready,
            "conditions": [condition],
        }
    });
    providers
        .patch_status(
            &provider.name_any(),
            &PatchParams::default(),
            &Patch::Merge(&patch),
        )
        .await?;

    Ok(Action::await_change())
}

/// No retries — a failed reconcile is logged and left for the next watch
/// event (§4.6, Non-goal "retry semantics"), matching the teacher's
/// `error_policy_{docs,code}`.
pub fn error_policy(
    provider: Arc<Provider>,
    error: &crate::error::Error,
    _ctx: Arc<Context>,
) -> Action {
    tracing::error!(name = %provider.name_any(), error = %error, "Provider reconcile failed, no retries");
    Action::await_change()
}
