pub mod namespace_defaults;
pub mod provider;
pub mod run;
pub mod workspace;

pub use namespace_defaults::{NamespaceDefaults, NamespaceDefaultsSpec, NamespaceDefaultsStatus};
pub use provider::{Provider, ProviderCondition, ProviderSpec, ProviderStatus};
pub use run::{
    AgentKind, EnvVarEntry, InlineProviderSpec, RepositorySpec, Run, RunCondition, RunPhase,
    RunSpec, RunStatus, SecretKeyRef, WorktreeSpec,
};
pub use workspace::{
    SharedVolumeSpec, Workspace, WorkspaceCondition, WorkspacePhase, WorkspaceSpec,
    WorkspaceStatus,
};
