//! Standard label construction shared by every `ObjectBuilder` operation (§6).

use std::collections::BTreeMap;

const NAME: &str = "agent-operator";

fn base(instance: &str, component: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("name".to_string(), NAME.to_string());
    labels.insert("instance".to_string(), instance.to_string());
    labels.insert("component".to_string(), component.to_string());
    labels
}

/// VolumeClaim (standalone): `name`, `instance=<run-name>`, `component=workspace`.
pub fn standalone_volume_claim(run_name: &str) -> BTreeMap<String, String> {
    base(run_name, "workspace")
}

/// VolumeClaim (workspace, shared): `component` in {workspace, shared-volume}.
pub fn workspace_volume_claim(workspace_name: &str) -> BTreeMap<String, String> {
    base(workspace_name, "workspace")
}

pub fn shared_volume_claim(workspace_name: &str) -> BTreeMap<String, String> {
    base(workspace_name, "shared-volume")
}

/// Job (standalone run): `component=agent-run`, `agent-kind=<claude|opencode>`.
pub fn standalone_run_job(run_name: &str, agent_kind: &str) -> BTreeMap<String, String> {
    let mut labels = base(run_name, "agent-run");
    labels.insert("agent-kind".to_string(), agent_kind.to_string());
    labels
}

/// Job (shared-workspace run): as above plus `workspace=<workspace-name>`.
pub fn shared_workspace_run_job(
    run_name: &str,
    agent_kind: &str,
    workspace_name: &str,
) -> BTreeMap<String, String> {
    let mut labels = standalone_run_job(run_name, agent_kind);
    labels.insert("workspace".to_string(), workspace_name.to_string());
    labels
}

/// Job (workspace init): `component=workspace-init`, `instance=<workspace-name>`.
pub fn workspace_init_job(workspace_name: &str) -> BTreeMap<String, String> {
    base(workspace_name, "workspace-init")
}
