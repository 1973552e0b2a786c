//! Job builder operations (§4.1): `buildRunJob`, `buildSharedWorkspaceRunJob`,
//! `buildWorkspaceInitJob`.

use crate::builder::clone_script::{build_clone_script, build_workspace_clone_script};
use crate::builder::command::build_agent_command;
use crate::builder::env::build_env_vars;
use crate::builder::owner;
use crate::crds::run::{AgentKind, EnvVarEntry, RepositorySpec, WorktreeSpec};
use crate::crds::workspace::SharedVolumeSpec;
use crate::labels;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, ResourceRequirements,
    Toleration, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

const WORKSPACE_VOLUME: &str = "workspace";
const WORKSPACE_MOUNT: &str = "/workspace";
const WORKTREE_MOUNT: &str = "/workspace-wt";

fn workspace_volume(claim_name: &str) -> Volume {
    Volume {
        name: WORKSPACE_VOLUME.to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: claim_name.to_string(),
            read_only: Some(false),
        }),
        ..Default::default()
    }
}

fn git_clone_init_container(image: &str, script: &str, with_worktree_mount: bool) -> Container {
    Container {
        name: "git-clone".to_string(),
        image: Some(image.to_string()),
        command: Some(vec!["sh".to_string(), "-c".to_string(), script.to_string()]),
        volume_mounts: Some(main_volume_mounts(with_worktree_mount, &[])),
        ..Default::default()
    }
}

fn main_volume_mounts(with_worktree_mount: bool, aux: &[(String, String)]) -> Vec<VolumeMount> {
    let mut mounts = vec![VolumeMount {
        name: WORKSPACE_VOLUME.to_string(),
        mount_path: WORKSPACE_MOUNT.to_string(),
        ..Default::default()
    }];
    if with_worktree_mount {
        mounts.push(VolumeMount {
            name: WORKSPACE_VOLUME.to_string(),
            mount_path: WORKTREE_MOUNT.to_string(),
            ..Default::default()
        });
    }
    for (vol_name, mount_path) in aux {
        mounts.push(VolumeMount {
            name: vol_name.clone(),
            mount_path: mount_path.clone(),
            ..Default::default()
        });
    }
    mounts
}

#[allow(clippy::too_many_arguments)]
/// `buildRunJob` (§4.1): standalone Run Job. Init container `git-clone`; main
/// container runs the agent with its working directory at `/workspace`
/// (or `/workspace-wt` when a worktree is configured, §6).
pub fn build_run_job(
    run_name: &str,
    run_uid: &str,
    agent_kind: AgentKind,
    repository: &RepositorySpec,
    worktree: Option<&WorktreeSpec>,
    prompt: Option<&str>,
    resolved_env: &BTreeMap<String, String>,
    run_env: &[EnvVarEntry],
    provider_cli_args: &[String],
    volume_claim_name: &str,
    image: &str,
    timeout_seconds: i64,
    resources: Option<ResourceRequirements>,
    node_selector: Option<&BTreeMap<String, String>>,
    tolerations: &[Toleration],
) -> Job {
    let script = build_clone_script(repository, worktree);
    let with_wt = worktree.is_some();
    let working_dir = if with_wt { WORKTREE_MOUNT } else { WORKSPACE_MOUNT };
    let (command, args) = build_agent_command(agent_kind, prompt, provider_cli_args);
    let env = build_env_vars(resolved_env, run_env);

    let main_container = Container {
        name: "agent".to_string(),
        image: Some(image.to_string()),
        command: Some(command),
        args: Some(args),
        working_dir: Some(working_dir.to_string()),
        env: Some(env),
        resources,
        volume_mounts: Some(main_volume_mounts(with_wt, &[])),
        ..Default::default()
    };

    build_job(
        run_name,
        labels::standalone_run_job(run_name, agent_kind.label_value()),
        owner::run_owner(run_name, run_uid),
        vec![git_clone_init_container("alpine/git:latest", &script, with_wt)],
        main_container,
        vec![workspace_volume(volume_claim_name)],
        timeout_seconds,
        node_selector.cloned(),
        tolerations.to_vec(),
    )
}

#[allow(clippy::too_many_arguments)]
/// `buildSharedWorkspaceRunJob` (§4.1): init container `git-worktree` creates
/// a per-run worktree under the shared checkout; main container's working
/// directory is `/workspace-wt/{run.name}`.
pub fn build_shared_workspace_run_job(
    run_name: &str,
    run_uid: &str,
    agent_kind: AgentKind,
    worktree: &WorktreeSpec,
    prompt: Option<&str>,
    resolved_env: &BTreeMap<String, String>,
    run_env: &[EnvVarEntry],
    provider_cli_args: &[String],
    workspace_name: &str,
    workspace_volume_name: &str,
    auxiliary_volumes: &[SharedVolumeSpec],
    auxiliary_claim_names: &BTreeMap<String, String>,
    image: &str,
    timeout_seconds: i64,
    resources: Option<ResourceRequirements>,
    node_selector: Option<&BTreeMap<String, String>>,
    tolerations: &[Toleration],
) -> Job {
    let source = worktree.source_branch.as_deref().unwrap_or("HEAD");
    let worktree_path = format!("{WORKTREE_MOUNT}/{run_name}");
    let script = format!(
        "set -e\ncd {WORKSPACE_MOUNT}\ngit worktree add {worktree_path} -b {} {source}",
        worktree.branch
    );

    let aux_mounts: Vec<(String, String)> = auxiliary_volumes
        .iter()
        .filter_map(|vol| {
            auxiliary_claim_names
                .get(&vol.name)
                .map(|_claim| (vol.name.clone(), vol.mount_path.clone()))
        })
        .collect();

    let init = Container {
        name: "git-worktree".to_string(),
        image: Some("alpine/git:latest".to_string()),
        command: Some(vec!["sh".to_string(), "-c".to_string(), script]),
        volume_mounts: Some(main_volume_mounts(true, &[])),
        ..Default::default()
    };

    let (command, args) = build_agent_command(agent_kind, prompt, provider_cli_args);
    let env = build_env_vars(resolved_env, run_env);

    let main_container = Container {
        name: "agent".to_string(),
        image: Some(image.to_string()),
        command: Some(command),
        args: Some(args),
        working_dir: Some(worktree_path),
        env: Some(env),
        resources,
        volume_mounts: Some(main_volume_mounts(true, &aux_mounts)),
        ..Default::default()
    };

    let mut volumes = vec![workspace_volume(workspace_volume_name)];
    for vol in auxiliary_volumes {
        if let Some(claim) = auxiliary_claim_names.get(&vol.name) {
            volumes.push(Volume {
                name: vol.name.clone(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: claim.clone(),
                    read_only: Some(false),
                }),
                ..Default::default()
            });
        }
    }

    build_job(
        run_name,
        labels::shared_workspace_run_job(run_name, agent_kind.label_value(), workspace_name),
        owner::run_owner(run_name, run_uid),
        vec![init],
        main_container,
        volumes,
        timeout_seconds,
        node_selector.cloned(),
        tolerations.to_vec(),
    )
}

/// `buildWorkspaceInitJob` (§4.1): single container `git-clone` against
/// `/workspace`; fixed 10-minute deadline, never retried.
pub fn build_workspace_init_job(
    workspace_name: &str,
    workspace_uid: &str,
    repository: &RepositorySpec,
    volume_claim_name: &str,
    image: &str,
) -> Job {
    let script = build_workspace_clone_script(repository);
    let container = Container {
        name: "git-clone".to_string(),
        image: Some(image.to_string()),
        command: Some(vec!["sh".to_string(), "-c".to_string(), script]),
        volume_mounts: Some(vec![VolumeMount {
            name: WORKSPACE_VOLUME.to_string(),
            mount_path: WORKSPACE_MOUNT.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let job_name = format!("{workspace_name}-init");
    build_job(
        &job_name,
        labels::workspace_init_job(workspace_name),
        owner::workspace_owner(workspace_name, workspace_uid),
        vec![],
        container,
        vec![workspace_volume(volume_claim_name)],
        600,
        None,
        vec![],
    )
}

#[allow(clippy::too_many_arguments)]
fn build_job(
    name: &str,
    labels: BTreeMap<String, String>,
    owner_ref: OwnerReference,
    init_containers: Vec<Container>,
    main_container: Container,
    volumes: Vec<Volume>,
    active_deadline_seconds: i64,
    node_selector: Option<BTreeMap<String, String>>,
    tolerations: Vec<Toleration>,
) -> Job {
    let pod_spec = PodSpec {
        init_containers: if init_containers.is_empty() {
            None
        } else {
            Some(init_containers)
        },
        containers: vec![main_container],
        volumes: Some(volumes),
        restart_policy: Some("Never".to_string()),
        node_selector,
        tolerations: if tolerations.is_empty() {
            None
        } else {
            Some(tolerations)
        },
        ..Default::default()
    };

    Job {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_ref]),
            ..Default::default()
        },
        spec: Some(JobSpec {
            active_deadline_seconds: Some(active_deadline_seconds),
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(pod_spec),
            },
            ..Default::default()
        }),
        status: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn standalone_job_has_no_retries_and_backoff_zero() {
        let repo = RepositorySpec {
            url: "https://example.test/repo.git".to_string(),
            ..Default::default()
        };
        let job = build_run_job(
            "r1",
            "uid-1",
            AgentKind::ClaudeKind,
            &repo,
            None,
            None,
            &BTreeMap::new(),
            &[],
            &[],
            "r1-workspace",
            "node:trixie-slim",
            3600,
            None,
            None,
            &[],
        );
        assert_eq!(job.metadata.name.as_deref(), Some("r1"));
        let spec = job.spec.unwrap();
        assert_eq!(spec.backoff_limit, Some(0));
        assert_eq!(spec.active_deadline_seconds, Some(3600));
        let pod = spec.template.spec.unwrap();
        assert_eq!(pod.restart_policy.as_deref(), Some("Never"));
        assert_eq!(pod.containers[0].command.as_deref(), Some(&["claude".to_string()][..]));
    }

    #[test]
    fn shared_workspace_job_working_dir_is_per_run_worktree() {
        let worktree = WorktreeSpec {
            branch: "a1-work".to_string(),
            source_branch: None,
        };
        let job = build_shared_workspace_run_job(
            "a1",
            "uid-a1",
            AgentKind::ClaudeKind,
            &worktree,
            None,
            &BTreeMap::new(),
            &[],
            &[],
            "w1",
            "w1-ws",
            &[],
            &BTreeMap::new(),
            "node:trixie-slim",
            3600,
            None,
            None,
            &[],
        );
        let pod = job.spec.unwrap().template.spec.unwrap();
        assert_eq!(
            pod.containers[0].working_dir.as_deref(),
            Some("/workspace-wt/a1")
        );
        assert_eq!(pod.init_containers.unwrap()[0].name, "git-worktree");
    }

    #[test]
    fn init_job_has_ten_minute_deadline() {
        let repo = RepositorySpec {
            url: "https://example.test/repo.git".to_string(),
            ..Default::default()
        };
        let job = build_workspace_init_job("w1", "uid-w1", &repo, "w1-ws", "alpine/git:latest");
        assert_eq!(job.metadata.name.as_deref(), Some("w1-init"));
        assert_eq!(job.spec.unwrap().active_deadline_seconds, Some(600));
    }
}
