//! Environment-variable merging (§4.1 "Environment merging rule").
//!
//! The resolved provider environment (produced with I/O by
//! [`crate::resolver`], already containing the conditionally-injected
//! `ANTHROPIC_AUTH_TOKEN`) is the base. The Run's own `env` list is merged on
//! top and wins on key collision — this half of the rule needs no I/O, so it
//! lives in the pure builder layer.

use crate::crds::run::EnvVarEntry;
use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource, SecretKeySelector};
use std::collections::BTreeMap;

/// The key that gates automatic `ANTHROPIC_AUTH_TOKEN` injection (§4.1, §9).
pub const ANTHROPIC_BASE_URL_KEY: &str = "ANTHROPIC_BASE_URL";
pub const ANTHROPIC_AUTH_TOKEN_KEY: &str = "ANTHROPIC_AUTH_TOKEN";

/// Inject the resolved auth token under `ANTHROPIC_AUTH_TOKEN` iff the
/// environment already carries `ANTHROPIC_BASE_URL`. Otherwise the token is
/// dropped silently — providers that don't declare an Anthropic-compatible
/// base URL receive no automatic injection (§9, deliberately not configurable).
pub fn apply_auth_token_gate(env: &mut BTreeMap<String, String>, auth_token: Option<&str>) {
    if let Some(token) = auth_token {
        if env.contains_key(ANTHROPIC_BASE_URL_KEY) {
            env.insert(ANTHROPIC_AUTH_TOKEN_KEY.to_string(), token.to_string());
        }
    }
}

/// Merge the resolved (provider-derived) environment with the Run's own
/// `env` list, Run entries overriding on name collision, and emit the final
/// `Vec<EnvVar>` sorted by name for deterministic pod-spec output.
pub fn build_env_vars(resolved: &BTreeMap<String, String>, run_env: &[EnvVarEntry]) -> Vec<EnvVar> {
    let mut merged: BTreeMap<String, EnvVar> = resolved
        .iter()
        .map(|(k, v)| {
            (
                k.clone(),
                EnvVar {
                    name: k.clone(),
                    value: Some(v.clone()),
                    value_from: None,
                },
            )
        })
        .collect();

    for entry in run_env {
        let env_var = if let Some(secret_ref) = &entry.value_from_secret_ref {
            EnvVar {
                name: entry.name.clone(),
                value: None,
                value_from: Some(EnvVarSource {
                    secret_key_ref: Some(SecretKeySelector {
                        name: secret_ref.name.clone(),
                        key: secret_ref.key.clone(),
                        optional: None,
                    }),
                    ..Default::default()
                }),
            }
        } else {
            EnvVar {
                name: entry.name.clone(),
                value: entry.value.clone(),
                value_from: None,
            }
        };
        merged.insert(entry.name.clone(), env_var);
    }

    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_token_injected_only_with_base_url() {
        let mut env = BTreeMap::new();
        env.insert(ANTHROPIC_BASE_URL_KEY.to_string(), "http://proxy:8080".to_string());
        apply_auth_token_gate(&mut env, Some("tkn-123"));
        assert_eq!(env.get(ANTHROPIC_AUTH_TOKEN_KEY), Some(&"tkn-123".to_string()));

        let mut env_no_base = BTreeMap::new();
        apply_auth_token_gate(&mut env_no_base, Some("tkn-123"));
        assert!(env_no_base.get(ANTHROPIC_AUTH_TOKEN_KEY).is_none());
    }

    #[test]
    fn run_env_overrides_resolved_env_on_collision() {
        let mut resolved = BTreeMap::new();
        resolved.insert("FOO".to_string(), "provider-value".to_string());
        let run_env = vec![EnvVarEntry {
            name: "FOO".to_string(),
            value: Some("run-value".to_string()),
            value_from_secret_ref: None,
        }];
        let vars = build_env_vars(&resolved, &run_env);
        let foo = vars.iter().find(|v| v.name == "FOO").unwrap();
        assert_eq!(foo.value.as_deref(), Some("run-value"));
    }
}
