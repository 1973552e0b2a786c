//! `buildCloneScript` (§4.1) and its shared-workspace sibling (§6).

use crate::crds::run::{RepositorySpec, WorktreeSpec};

/// Standalone clone script: clone, optional pin to a commit, optional
/// worktree creation. Exact line order per §6's clone-script contract.
pub fn build_clone_script(repo: &RepositorySpec, worktree: Option<&WorktreeSpec>) -> String {
    let mut lines = vec!["set -e".to_string(), "cd /workspace".to_string()];
    lines.push(clone_line(repo));

    if let Some(commit) = repo.commit.as_deref() {
        lines.push(format!("git fetch origin {commit}"));
        lines.push(format!("git checkout {commit}"));
    }

    if let Some(wt) = worktree {
        let source = wt.source_branch.as_deref().unwrap_or("HEAD");
        lines.push(format!(
            "git worktree add /workspace-wt -b {} {source}",
            wt.branch
        ));
    }

    lines.join("\n")
}

/// Shared-workspace init-job clone script: identical to the standalone
/// script minus the worktree line (worktrees are created per-run instead,
/// in `build_shared_workspace_run_job`'s own init container).
pub fn build_workspace_clone_script(repo: &RepositorySpec) -> String {
    build_clone_script(repo, None)
}

fn clone_line(repo: &RepositorySpec) -> String {
    match repo.branch.as_deref() {
        Some(branch) => format!(
            "git clone --branch {branch} --single-branch --depth 1 {} .",
            repo.url
        ),
        None => format!("git clone --single-branch --depth 1 {} .", repo.url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_clone_script() {
        let repo = RepositorySpec {
            url: "https://example.test/repo.git".to_string(),
            ..Default::default()
        };
        let script = build_clone_script(&repo, None);
        assert_eq!(
            script,
            "set -e\ncd /workspace\ngit clone --single-branch --depth 1 https://example.test/repo.git ."
        );
    }

    #[test]
    fn clone_script_with_branch_commit_and_worktree() {
        let repo = RepositorySpec {
            url: "https://example.test/repo.git".to_string(),
            branch: Some("main".to_string()),
            commit: Some("abc123".to_string()),
            ..Default::default()
        };
        let worktree = WorktreeSpec {
            branch: "r1-work".to_string(),
            source_branch: Some("main".to_string()),
        };
        let script = build_clone_script(&repo, Some(&worktree));
        let expected = "set -e\n\
cd /workspace\n\
git clone --branch main --single-branch --depth 1 https://example.test/repo.git .\n\
git fetch origin abc123\n\
git checkout abc123\n\
git worktree add /workspace-wt -b r1-work main";
        assert_eq!(script, expected);
    }

    #[test]
    fn workspace_clone_script_never_contains_worktree() {
        let repo = RepositorySpec {
            url: "https://example.test/repo.git".to_string(),
            ..Default::default()
        };
        let script = build_workspace_clone_script(&repo);
        assert!(!script.contains("worktree"));
    }
}
