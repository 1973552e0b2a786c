//! `RunReconciler` (§4.5): drives a Run through standalone or
//! shared-workspace mode to completion (`Succeeded`/`Failed`/`TimedOut`).

use super::create_ignoring_already_exists;
use crate::builder::job::{build_run_job, build_shared_workspace_run_job};
use crate::builder::volume_claim::build_standalone_volume_claim;
use crate::conditions;
use crate::context::Context;
use crate::crds::{Run, RunPhase, RunSpec, WorkspacePhase};
use crate::error::{is_not_found, Error, Result};
use crate::resolver;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
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
const REQUEUE_POLLING_JOB: Duration = Duration::from_secs(10);

#[instrument(skip(run, ctx), fields(name = %run.name_any(), namespace = %ctx.namespace))]
pub async fn reconcile(run: Arc<Run>, ctx: Arc<Context>) -> Result<Action> {
    let name = run.name_any();
    let uid = run.uid().unwrap_or_default();
    let phase = run.status.as_ref().and_then(|s| s.phase);

    if phase.is_some_and(RunPhase::is_terminal) {
        debug!("run in terminal phase {:?}, no action", phase);
        return Ok(Action::await_change());
    }

    let runs: Api<Run> = Api::namespaced(ctx.client.clone(), &ctx.namespace);

    if let Some(detail) = validate_spec(&run.spec) {
        fail(&runs, &name, Error::SpecValidation(detail).to_string()).await?;
        return Ok(Action::await_change());
    }

    if phase.is_none() {
        set_phase(&runs, &name, RunPhase::Pending, "Pending", None).await?;
        return Ok(Action::await_change());
    }

    if run.spec.workspace_ref.is_some() {
        shared_workspace_path(&ctx, &runs, &run, &name, &uid).await
    } else {
        standalone_path(&ctx, &runs, &run, &name, &uid).await
    }
}

/// Defensive replica of the admission-webhook checks this crate carries no
/// webhook for (§9 Non-goal "admission webhooks"): `workspaceRef` requires
/// `worktree` and forbids `repository`; standalone mode requires `repository`.
fn validate_spec(spec: &RunSpec) -> Option<String> {
    if spec.workspace_ref.is_some() {
        if spec.repository.is_some() {
            return Some("repository must be absent when workspaceRef is set".to_string());
        }
        if spec.worktree.is_none() {
            return Some("worktree is required when workspaceRef is set".to_string());
        }
    } else if spec.repository.is_none() {
        return Some("repository is required in standalone mode".to_string());
    }
    None
}

async fn standalone_path(
    ctx: &Context,
    runs: &Api<Run>,
    run: &Run,
    name: &str,
    uid: &str,
) -> Result<Action> {
    let defaults = resolver::resolve_namespace_defaults(&ctx.client, &ctx.namespace).await?;

    let resolved_provider =
        match resolver::resolve_provider(&ctx.client, &ctx.namespace, &run.spec, defaults.as_ref()).await {
            Ok(p) => p,
            Err(e @ Error::ProviderResolutionFailed(_)) => {
                fail(runs, name, e.to_string()).await?;
                return Ok(Action::await_change());
            }
            Err(e) => return Err(e),
        };
    let resolved_defaults = resolver::resolve_run_defaults(&run.spec, defaults.as_ref(), &ctx.config);

    let workspace_volume_name = run.status.as_ref().and_then(|s| s.workspace_volume_name.clone());
    let workspace_volume_name = match workspace_volume_name {
        Some(name) => name,
        None => {
            let claim_name = format!("{name}-workspace");
            let claims: Api<PersistentVolumeClaim> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
            let claim = build_standalone_volume_claim(
                &claim_name,
                name,
                uid,
                resolved_defaults.storage_class.as_deref(),
                &resolved_defaults.storage_size,
            );
            create_ignoring_already_exists(&claims, claim).await?;

            let mut condition_list = run.status.as_ref().map(|s| s.conditions.clone()).unwrap_or_default();
            conditions::append(&mut condition_list, "Initializing", "Initializing", None);
            let patch = json!({
                "status": {
                    "phase": RunPhase::Initializing,
                    "workspaceVolumeName": claim_name,
                    "conditions": condition_list,
                }
            });
            runs.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
            return Ok(Action::await_change());
        }
    };

    let job_name = run.status.as_ref().and_then(|s| s.job_name.clone());
    if job_name.is_none() {
        let repository = run
            .spec
            .repository
            .as_ref()
            .ok_or_else(|| Error::SpecValidation("repository is required in standalone mode".to_string()))?;

        let job = build_run_job(
            name,
            uid,
            run.spec.agent_kind,
            repository,
            run.spec.worktree.as_ref(),
            run.spec.prompt.as_deref(),
            &resolved_provider.environment,
            &run.spec.env,
            &resolved_provider.cli_args,
            &workspace_volume_name,
            &resolved_defaults.image,
            resolved_defaults.timeout_seconds,
            run.spec.resources.clone(),
            run.spec.node_selector.as_ref(),
            &run.spec.tolerations,
        );
        let jobs: Api<Job> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
        create_ignoring_already_exists(&jobs, job).await?;

        let patch = json!({ "status": { "jobName": name } });
        runs.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
        return Ok(Action::await_change());
    }

    let jobs: Api<Job> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let job = match jobs.get(name).await {
        Ok(job) => job,
        Err(e) if is_not_found(&e) => return Ok(Action::requeue(REQUEUE_WAITING_FOR_DEPENDENT)),
        Err(e) => return Err(Error::Kube(e)),
    };

    observe_job(runs, run, name, &job).await
}

async fn shared_workspace_path(
    ctx: &Context,
    runs: &Api<Run>,
    run: &Run,
    name: &str,
    uid: &str,
) -> Result<Action> {
    let workspace_name = run
        .spec
        .workspace_ref
        .clone()
        .ok_or_else(|| Error::SpecValidation("workspaceRef missing".to_string()))?;

    let workspace = match resolver::resolve_workspace(&ctx.client, &ctx.namespace, &workspace_name).await {
        Ok(w) => w,
        Err(e @ Error::WorkspaceResolutionFailed(_)) => {
            fail(runs, name, e.to_string()).await?;
            return Ok(Action::await_change());
        }
        Err(e) => return Err(e),
    };

    let workspace_phase = workspace.status.as_ref().and_then(|s| s.phase);
    if workspace_phase != Some(WorkspacePhase::Ready) {
        return Ok(Action::requeue(REQUEUE_WAITING_FOR_DEPENDENT));
    }

    let shared_workspace_volume_name = workspace
        .status
        .as_ref()
        .and_then(|s| s.workspace_volume_name.clone())
        .ok_or_else(|| {
            Error::WorkspaceResolutionFailed(format!(
                "workspace '{workspace_name}' is Ready but has no workspaceVolumeName"
            ))
        })?;

    let workspace_volume_name = run.status.as_ref().and_then(|s| s.workspace_volume_name.clone());
    let workspace_volume_name = match workspace_volume_name {
        Some(name) => name,
        None => {
            let mut condition_list = run.status.as_ref().map(|s| s.conditions.clone()).unwrap_or_default();
            conditions::append(&mut condition_list, "Initializing", "Initializing", None);
            let patch = json!({
                "status": {
                    "phase": RunPhase::Initializing,
                    "workspaceVolumeName": shared_workspace_volume_name,
                    "conditions": condition_list,
                }
            });
            runs.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
            return Ok(Action::await_change());
        }
    };

    let defaults = resolver::resolve_namespace_defaults(&ctx.client, &ctx.namespace).await?;
    let resolved_provider =
        match resolver::resolve_provider(&ctx.client, &ctx.namespace, &run.spec, defaults.as_ref()).await {
            Ok(p) => p,
            Err(e @ Error::ProviderResolutionFailed(_)) => {
                fail(runs, name, e.to_string()).await?;
                return Ok(Action::await_change());
            }
            Err(e) => return Err(e),
        };
    let resolved_defaults = resolver::resolve_run_defaults(&run.spec, defaults.as_ref(), &ctx.config);

    let job_name = run.status.as_ref().and_then(|s| s.job_name.clone());
    if job_name.is_none() {
        let worktree = run
            .spec
            .worktree
            .as_ref()
            .ok_or_else(|| Error::SpecValidation("worktree is required when workspaceRef is set".to_string()))?;
        let auxiliary_claim_names = workspace
            .status
            .as_ref()
            .map(|s| s.shared_volume_names.clone())
            .unwrap_or_default();

        let job = build_shared_workspace_run_job(
            name,
            uid,
            run.spec.agent_kind,
            worktree,
            run.spec.prompt.as_deref(),
            &resolved_provider.environment,
            &run.spec.env,
            &resolved_provider.cli_args,
            &workspace_name,
            &workspace_volume_name,
            &workspace.spec.shared_volumes,
            &auxiliary_claim_names,
            &resolved_defaults.image,
            resolved_defaults.timeout_seconds,
            run.spec.resources.clone(),
            run.spec.node_selector.as_ref(),
            &run.spec.tolerations,
        );
        let jobs: Api<Job> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
        create_ignoring_already_exists(&jobs, job).await?;

        let patch = json!({ "status": { "jobName": name } });
        runs.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
        return Ok(Action::await_change());
    }

    let jobs: Api<Job> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let job = match jobs.get(name).await {
        Ok(job) => job,
        Err(e) if is_not_found(&e) => return Ok(Action::requeue(REQUEUE_WAITING_FOR_DEPENDENT)),
        Err(e) => return Err(Error::Kube(e)),
    };

    observe_job(runs, run, name, &job).await
}

/// `observeJob` (§4.5.3): map the dependent Job's condition/active state
/// onto the Run's phase. Completion and failure are absorbing; an active
/// Job transitions to `Running` (recording `startTime` on first
/// observation) and is checked against `spec.timeoutSeconds`, when set,
/// for a reconciler-side `TimedOut` verdict independent of the Job's own
/// `activeDeadlineSeconds`.
async fn observe_job(runs: &Api<Run>, run: &Run, name: &str, job: &Job) -> Result<Action> {
    let job_conditions = job
        .status
        .as_ref()
        .and_then(|s| s.conditions.clone())
        .unwrap_or_default();
    let active = job.status.as_ref().and_then(|s| s.active).unwrap_or(0);
    let complete = job_conditions
        .iter()
        .any(|c| c.type_ == "Complete" && c.status == "True");
    let failed = job_conditions.iter().find(|c| c.type_ == "Failed" && c.status == "True");

    let now = Utc::now();

    if complete {
        let mut condition_list = run.status.as_ref().map(|s| s.conditions.clone()).unwrap_or_default();
        conditions::append(&mut condition_list, "Succeeded", "Succeeded", None);
        let patch = json!({
            "status": {
                "phase": RunPhase::Succeeded,
                "completionTime": now.to_rfc3339(),
                "conditions": condition_list,
            }
        });
        runs.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
        info!("run succeeded");
        return Ok(Action::await_change());
    }

    if let Some(failed_condition) = failed {
        let mut condition_list = run.status.as_ref().map(|s| s.conditions.clone()).unwrap_or_default();
        conditions::append(&mut condition_list, "Failed", "Failed", failed_condition.message.clone());
        let patch = json!({
            "status": {
                "phase": RunPhase::Failed,
                "completionTime": now.to_rfc3339(),
                "conditions": condition_list,
            }
        });
        runs.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
        return Ok(Action::await_change());
    }

    if active > 0 {
        let current_phase = run.status.as_ref().and_then(|s| s.phase);
        let start_time: DateTime<Utc> = if current_phase == Some(RunPhase::Running) {
            run.status
                .as_ref()
                .and_then(|s| s.start_time.as_deref())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(now)
        } else {
            now
        };

        if let Some(timeout_seconds) = run.spec.timeout_seconds {
            if now.signed_duration_since(start_time) > ChronoDuration::seconds(timeout_seconds) {
                let mut condition_list = run.status.as_ref().map(|s| s.conditions.clone()).unwrap_or_default();
                conditions::append(
                    &mut condition_list,
                    "TimedOut",
                    "TimedOut",
                    Some("agent run exceeded timeout".to_string()),
                );
                let patch = json!({
                    "status": {
                        "phase": RunPhase::TimedOut,
                        "completionTime": now.to_rfc3339(),
                        "conditions": condition_list,
                    }
                });
                runs.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
                return Ok(Action::await_change());
            }
        }

        if current_phase != Some(RunPhase::Running) {
            let mut condition_list = run.status.as_ref().map(|s| s.conditions.clone()).unwrap_or_default();
            conditions::append(&mut condition_list, "Running", "Running", None);
            let patch = json!({
                "status": {
                    "phase": RunPhase::Running,
                    "startTime": start_time.to_rfc3339(),
                    "conditions": condition_list,
                }
            });
            runs.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
        }
    }

    Ok(Action::requeue(REQUEUE_POLLING_JOB))
}

async fn fail(runs: &Api<Run>, name: &str, message: String) -> Result<()> {
    set_phase(runs, name, RunPhase::Failed, "Failed", Some(message)).await
}

async fn set_phase(
    runs: &Api<Run>,
    name: &str,
    phase: RunPhase,
    reason: &str,
    message: Option<String>,
) -> Result<()> {
    let existing = runs.get(name).await?;
    let mut condition_list = existing.status.map(|s| s.conditions).unwrap_or_default();
    conditions::append(&mut condition_list, &phase.to_string(), reason, message);

    let patch = json!({
        "status": {
            "phase": phase,
            "conditions": condition_list,
        }
    });
    runs.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
    Ok(())
}

/// No retries — matching the teacher's `error_policy_{docs,code}`.
pub fn error_policy(run: Arc<Run>, error: &Error, _ctx: Arc<Context>) -> Action {
    tracing::error!(name = %run.name_any(), error = %error, "Run reconcile failed, no retries");
    Action::await_change()
}
