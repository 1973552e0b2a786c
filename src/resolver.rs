//! `ReferenceResolver` (§4.2): resolves cross-resource references — namespace
//! defaults, provider credentials, shared workspaces — into the
//! `ResolvedEnvironment` and the effective image/timeout/storage triple the
//! builder layer needs. Unlike `builder`, every operation here does I/O
//! against the API server and therefore returns `Result`.

use crate::crds::{
    InlineProviderSpec, NamespaceDefaults, Provider, RunSpec, SecretKeyRef, Workspace,
};
use crate::error::{is_not_found, Error, Result};
use k8s_openapi::api::core::v1::Secret;
use kube::api::ListParams;
use kube::{Api, Client, Resource};
use std::collections::BTreeMap;

/// Environment resolved from a Run's provider chain, already carrying the
/// conditionally-injected `ANTHROPIC_AUTH_TOKEN` (§4.1 env merging rule).
pub type ResolvedEnvironment = BTreeMap<String, String>;

/// A provider's environment plus the `cliArgs` OpencodeKind copies verbatim
/// (§4.1 "Agent command contract").
#[derive(Debug, Clone, Default)]
pub struct ResolvedProvider {
    pub environment: ResolvedEnvironment,
    pub cli_args: Vec<String>,
}

/// The effective image/timeout/storage-class/storage-size a Run or
/// Workspace should use, after applying the precedence
/// Run/Workspace-field > `NamespaceDefaults` field > hardcoded fallback.
#[derive(Debug, Clone)]
pub struct ResolvedDefaults {
    pub image: String,
    pub timeout_seconds: i64,
    pub storage_class: Option<String>,
    pub storage_size: String,
}

/// `resolveDefaults` (§4.2): list `NamespaceDefaults` in scope, return the
/// earliest-created one or `None`. Never fails on absence — only transport
/// failure propagates. Singleton-by-convention is broken by creation
/// timestamp (the same rule `reconcile::namespace_defaults` uses to decide
/// which object it marks `Active`), so this resolver and that validator
/// always agree on which `NamespaceDefaults` is in effect.
pub async fn resolve_namespace_defaults(
    client: &Client,
    namespace: &str,
) -> Result<Option<NamespaceDefaults>> {
    let api: Api<NamespaceDefaults> = Api::namespaced(client.clone(), namespace);
    let list = api.list(&ListParams::default()).await?;
    Ok(list
        .items
        .into_iter()
        .min_by_key(|d| d.meta().creation_timestamp.clone().map(|t| t.0)))
}

/// Fetch a secret key, distinguishing "secret missing" from "key missing"
/// so callers can build the right `{Provider}ResolutionFailed` detail.
async fn fetch_secret_value(
    client: &Client,
    namespace: &str,
    secret_ref: &SecretKeyRef,
) -> Result<String> {
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secret = api.get(&secret_ref.name).await.map_err(|e| {
        if is_not_found(&e) {
            Error::ProviderResolutionFailed(format!("secret '{}' not found", secret_ref.name))
        } else {
            Error::Kube(e)
        }
    })?;

    let data = secret.data.ok_or_else(|| {
        Error::ProviderResolutionFailed(format!(
            "secret '{}' has no key '{}'",
            secret_ref.name, secret_ref.key
        ))
    })?;

    let bytes = data.get(&secret_ref.key).ok_or_else(|| {
        Error::ProviderResolutionFailed(format!(
            "secret '{}' has no key '{}'",
            secret_ref.name, secret_ref.key
        ))
    })?;

    String::from_utf8(bytes.0.clone()).map_err(|_| {
        Error::ProviderResolutionFailed(format!(
            "secret '{}' key '{}' is not valid UTF-8",
            secret_ref.name, secret_ref.key
        ))
    })
}

/// The auth-token gate from §4.1/§9: inject under `ANTHROPIC_AUTH_TOKEN`
/// iff the environment already carries `ANTHROPIC_BASE_URL`.
fn apply_injection(env: &mut ResolvedEnvironment, token: &str) {
    crate::builder::env::apply_auth_token_gate(env, Some(token));
}

async fn resolve_inline_provider(
    client: &Client,
    namespace: &str,
    inline: &InlineProviderSpec,
) -> Result<ResolvedProvider> {
    let mut environment = inline.environment.clone();
    if let Some(secret_ref) = &inline.auth_secret_ref {
        let token = fetch_secret_value(client, namespace, secret_ref).await?;
        apply_injection(&mut environment, &token);
    }
    Ok(ResolvedProvider {
        environment,
        cli_args: inline.cli_args.clone(),
    })
}

async fn resolve_named_provider(
    client: &Client,
    namespace: &str,
    provider_name: &str,
) -> Result<ResolvedProvider> {
    let api: Api<Provider> = Api::namespaced(client.clone(), namespace);
    let provider = api.get(provider_name).await.map_err(|e| {
        if is_not_found(&e) {
            Error::ProviderResolutionFailed(format!("provider '{provider_name}' not found"))
        } else {
            Error::Kube(e)
        }
    })?;

    let mut environment = provider.spec.environment.clone();
    if let Some(secret_ref) = &provider.spec.auth_token_secret_ref {
        let token = fetch_secret_value(client, namespace, secret_ref).await?;
        apply_injection(&mut environment, &token);
    }
    Ok(ResolvedProvider {
        environment,
        cli_args: provider.spec.cli_args.clone(),
    })
}

/// `resolveProvider` (§4.2): precedence inline > `providerRef` > namespace
/// default for the Run's agent kind > empty map. Fails with
/// `ProviderResolutionFailed` per the conditions in §4.2/§7, including the
/// defensive check that `providerRef` and `inlineProvider` are not both set.
pub async fn resolve_provider(
    client: &Client,
    namespace: &str,
    run_spec: &RunSpec,
    defaults: Option<&NamespaceDefaults>,
) -> Result<ResolvedProvider> {
    if run_spec.provider_ref.is_some() && run_spec.inline_provider.is_some() {
        return Err(Error::ProviderResolutionFailed(
            "providerRef and inlineProvider are mutually exclusive".to_string(),
        ));
    }

    if let Some(inline) = &run_spec.inline_provider {
        return resolve_inline_provider(client, namespace, inline).await;
    }

    if let Some(provider_ref) = &run_spec.provider_ref {
        return resolve_named_provider(client, namespace, provider_ref).await;
    }

    if let Some(defaults) = defaults {
        let key = run_spec.agent_kind.to_string();
        if let Some(provider_name) = defaults.spec.default_providers_by_agent_kind.get(&key) {
            return resolve_named_provider(client, namespace, provider_name).await;
        }
    }

    Ok(ResolvedProvider::default())
}

/// `resolveWorkspace` (§4.2): fetch by name, fail with
/// `WorkspaceResolutionFailed` on absence.
pub async fn resolve_workspace(
    client: &Client,
    namespace: &str,
    name: &str,
) -> Result<Workspace> {
    let api: Api<Workspace> = Api::namespaced(client.clone(), namespace);
    api.get(name).await.map_err(|e| {
        if is_not_found(&e) {
            Error::WorkspaceResolutionFailed(format!("workspace '{name}' not found"))
        } else {
            Error::Kube(e)
        }
    })
}

/// Effective image/timeout/storage-class/storage-size for a Run, precedence
/// Run-field > `NamespaceDefaults` field > `ControllerConfig` hardcoded
/// fallback (§4.2).
pub fn resolve_run_defaults(
    run_spec: &RunSpec,
    defaults: Option<&NamespaceDefaults>,
    config: &crate::config::ControllerConfig,
) -> ResolvedDefaults {
    let image = run_spec
        .image
        .clone()
        .or_else(|| defaults.and_then(|d| d.spec.default_image.clone()))
        .unwrap_or_else(|| config.job.default_image.clone());

    let timeout_seconds = run_spec
        .timeout_seconds
        .or_else(|| defaults.and_then(|d| d.spec.default_timeout_seconds))
        .unwrap_or(config.job.default_timeout_seconds);

    let storage_class = defaults
        .and_then(|d| d.spec.default_storage_class.clone())
        .or_else(|| config.storage.storage_class_name.clone());

    let storage_size = defaults
        .and_then(|d| d.spec.default_storage_size.clone())
        .unwrap_or_else(|| config.storage.workspace_size.clone());

    ResolvedDefaults {
        image,
        timeout_seconds,
        storage_class,
        storage_size,
    }
}

/// Effective image for a Workspace init job: `NamespaceDefaults` >
/// `ControllerConfig` fallback (Workspaces carry no per-spec image field).
pub fn resolve_workspace_image(
    defaults: Option<&NamespaceDefaults>,
    config: &crate::config::ControllerConfig,
) -> String {
    defaults
        .and_then(|d| d.spec.default_image.clone())
        .unwrap_or_else(|| config.job.default_image.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::crds::{AgentKind, NamespaceDefaultsSpec, RunSpec};

    fn base_run_spec() -> RunSpec {
        RunSpec {
            agent_kind: AgentKind::ClaudeKind,
            provider_ref: None,
            inline_provider: None,
            repository: None,
            worktree: None,
            workspace_ref: None,
            prompt: None,
            image: None,
            timeout_seconds: None,
            env: vec![],
            resources: None,
            node_selector: None,
            tolerations: vec![],
        }
    }

    #[test]
    fn run_field_wins_over_defaults_and_config() {
        let mut run_spec = base_run_spec();
        run_spec.image = Some("custom:latest".to_string());
        run_spec.timeout_seconds = Some(42);
        let config = ControllerConfig::default();
        let resolved = resolve_run_defaults(&run_spec, None, &config);
        assert_eq!(resolved.image, "custom:latest");
        assert_eq!(resolved.timeout_seconds, 42);
    }

    #[test]
    fn namespace_defaults_win_over_config_fallback() {
        let run_spec = base_run_spec();
        let defaults = NamespaceDefaults::new(
            "defaults",
            NamespaceDefaultsSpec {
                default_image: Some("from-defaults:latest".to_string()),
                default_timeout_seconds: Some(99),
                ..Default::default()
            },
        );
        let config = ControllerConfig::default();
        let resolved = resolve_run_defaults(&run_spec, Some(&defaults), &config);
        assert_eq!(resolved.image, "from-defaults:latest");
        assert_eq!(resolved.timeout_seconds, 99);
    }

    #[test]
    fn config_fallback_used_when_nothing_else_set() {
        let run_spec = base_run_spec();
        let config = ControllerConfig::default();
        let resolved = resolve_run_defaults(&run_spec, None, &config);
        assert_eq!(resolved.image, config.job.default_image);
        assert_eq!(resolved.timeout_seconds, config.job.default_timeout_seconds);
    }
}
