//! `WorkspaceReconciler` (§4.4): drives a Workspace from creation through
//! its shared volume claims and one-shot clone job to `Ready` or `Failed`.

use crate::builder::job::build_workspace_init_job;
use crate::builder::volume_claim::{build_auxiliary_volume_claim, build_shared_workspace_volume_claim};
use crate::conditions;
use crate::context::Context;
use crate::crds::{Workspace, WorkspacePhase};
use crate::error::{is_not_found, Error, Result};
use crate::resolver;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, ResourceExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

const REQUEUE_WAITING_FOR_DEPENDENT: Duration = Duration::from_secs(5);

#[instrument(skip(workspace, ctx), fields(name = %workspace.name_any(), namespace = %ctx.namespace))]
pub async fn reconcile(workspace: Arc<Workspace>, ctx: Arc<Context>) -> Result<Action> {
    let name = workspace.name_any();
    let uid = workspace.uid().unwrap_or_default();
    let phase = workspace.status.as_ref().and_then(|s| s.phase);

    // Step 1: terminal phases are absorbing.
    if phase.is_some_and(WorkspacePhase::is_terminal) {
        debug!("workspace in terminal phase {:?}, no action", phase);
        return Ok(Action::await_change());
    }

    let claims: Api<PersistentVolumeClaim> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let workspaces: Api<Workspace> = Api::namespaced(ctx.client.clone(), &ctx.namespace);

    // Step 2: create the workspace volume claim if not yet recorded.
    let workspace_volume_name = workspace
        .status
        .as_ref()
        .and_then(|s| s.workspace_volume_name.clone());
    if workspace_volume_name.is_none() {
        let claim_name = format!("{name}-ws");
        let defaults = resolver::resolve_namespace_defaults(&ctx.client, &ctx.namespace).await?;
        let storage_class = workspace
            .spec
            .storage_class
            .clone()
            .or_else(|| defaults.as_ref().and_then(|d| d.spec.default_storage_class.clone()))
            .or_else(|| ctx.config.storage.storage_class_name.clone());
        let storage_size = workspace
            .spec
            .storage_size
            .clone()
            .unwrap_or_else(|| ctx.config.storage.workspace_size.clone());

        let claim = build_shared_workspace_volume_claim(
            &claim_name,
            &name,
            &uid,
            storage_class.as_deref(),
            Some(&storage_size),
        );
        create_ignoring_already_exists(&claims, claim).await?;

        let patch = json!({ "status": { "workspaceVolumeName": claim_name } });
        workspaces
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        return Ok(Action::await_change());
    }

    // Step 3: create any shared volume claims not yet recorded. Gated to the
    // pre-init phases (unset / Pending) — once the init Job is launched
    // (Initializing onward), new entries in `spec.sharedVolumes` are not
    // picked up (invariant §3.3(5): the already-created init Job has no
    // mount for a volume added after the fact).
    let pre_init = phase.is_none() || phase == Some(WorkspacePhase::Pending);
    if pre_init {
        let existing_shared = workspace
            .status
            .as_ref()
            .map(|s| s.shared_volume_names.clone())
            .unwrap_or_default();
        for shared in &workspace.spec.shared_volumes {
            if existing_shared.contains_key(&shared.name) {
                continue;
            }
            let claim_name = format!("{name}-{}", shared.name);
            let claim = build_auxiliary_volume_claim(
                &claim_name,
                &name,
                &uid,
                workspace.spec.storage_class.as_deref(),
                shared.storage_size.as_deref(),
            );
            create_ignoring_already_exists(&claims, claim).await?;

            let mut patch = json!({ "status": { "sharedVolumeNames": {} } });
            patch["status"]["sharedVolumeNames"][shared.name.as_str()] = json!(claim_name);
            workspaces
                .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
            return Ok(Action::await_change());
        }
    }

    // Step 4: first-observed transition to Pending.
    if phase.is_none() {
        set_phase(&workspaces, &name, WorkspacePhase::Pending, "Pending", None).await?;
        return Ok(Action::await_change());
    }

    // Step 5: launch the init job once volumes exist.
    let init_job_name = workspace.status.as_ref().and_then(|s| s.init_job_name.clone());
    if init_job_name.is_none() {
        let jobs: Api<Job> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
        let job_name = format!("{name}-init");
        let defaults = resolver::resolve_namespace_defaults(&ctx.client, &ctx.namespace).await?;
        let image = resolver::resolve_workspace_image(defaults.as_ref(), &ctx.config);
        let claim_name = workspace_volume_name.clone().unwrap_or_else(|| format!("{name}-ws"));
        let job = build_workspace_init_job(&name, &uid, &workspace.spec.repository, &claim_name, &image);
        create_ignoring_already_exists(&jobs, job).await?;

        let patch = json!({ "status": { "initJobName": job_name } });
        workspaces
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        set_phase(
            &workspaces,
            &name,
            WorkspacePhase::Initializing,
            "Initializing",
            None,
        )
        .await?;
        return Ok(Action::await_change());
    }

    // Step 6/7: observe the init job.
    let jobs: Api<Job> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let job_name = init_job_name.unwrap();
    let job = match jobs.get(&job_name).await {
        Ok(job) => job,
        Err(e) if is_not_found(&e) => {
            return Ok(Action::requeue(REQUEUE_WAITING_FOR_DEPENDENT));
        }
        Err(e) => return Err(Error::Kube(e)),
    };

    let conditions = job
        .status
        .as_ref()
        .and_then(|s| s.conditions.clone())
        .unwrap_or_default();
    let complete = conditions.iter().any(|c| c.type_ == "Complete" && c.status == "True");
    let failed = conditions
        .iter()
        .find(|c| c.type_ == "Failed" && c.status == "True");

    if complete {
        set_phase(&workspaces, &name, WorkspacePhase::Ready, "Ready", None).await?;
        info!("workspace ready");
        return Ok(Action::await_change());
    }

    if let Some(failed_condition) = failed {
        set_phase(
            &workspaces,
            &name,
            WorkspacePhase::Failed,
            "Failed",
            failed_condition.message.clone(),
        )
        .await?;
        return Ok(Action::await_change());
    }

    Ok(Action::requeue(REQUEUE_WAITING_FOR_DEPENDENT))
}

use super::create_ignoring_already_exists;

async fn set_phase(
    workspaces: &Api<Workspace>,
    name: &str,
    phase: WorkspacePhase,
    reason: &str,
    message: Option<String>,
) -> Result<()> {
    let existing = workspaces.get(name).await?;
    let mut condition_list = existing.status.map(|s| s.conditions).unwrap_or_default();
    conditions::append(&mut condition_list, &phase.to_string(), reason, message);

    let patch = json!({
        "status": {
            "phase": phase,
            "conditions": condition_list,
        }
    });
    workspaces
        .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// No retries — errors are logged and left for the next watch event,
/// matching the teacher's `error_policy_{docs,code}`.
pub fn error_policy(workspace: Arc<Workspace>, error: &Error, _ctx: Arc<Context>) -> Action {
    tracing::error!(name = %workspace.name_any(), error = %error, "Workspace reconcile failed, no retries");
    Action::await_change()
}
