//! Controller configuration, loaded once at startup from a mounted YAML file.
//!
//! Kept deliberately small: this crate's CRDs carry almost all of the
//! per-resource configuration (image, timeout, storage class/size come from
//! the Run/Workspace spec or `NamespaceDefaults` first). This structure only
//! supplies the hardcoded fallbacks §4.2 requires when neither is set, plus
//! ambient process configuration (telemetry).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    #[serde(default)]
    pub job: JobConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Fallback job defaults used when neither the Run nor `NamespaceDefaults`
/// specify a value.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobConfig {
    /// Default container image for the agent's main container.
    #[serde(rename = "defaultImage", default = "default_image")]
    pub default_image: String,

    /// Default `activeDeadlineSeconds`, used when `Run.spec.timeout` and
    /// `NamespaceDefaults.defaultTimeout` are both unset.
    #[serde(rename = "defaultTimeoutSeconds", default = "default_timeout_seconds")]
    pub default_timeout_seconds: i64,
}

fn default_image() -> String {
    "node:trixie-slim".to_string()
}

fn default_timeout_seconds() -> i64 {
    3600
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            default_image: default_image(),
            default_timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Fallback storage defaults for volume claims.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(rename = "storageClassName", default)]
    pub storage_class_name: Option<String>,

    #[serde(rename = "workspaceSize", default = "default_workspace_size")]
    pub workspace_size: String,

    #[serde(rename = "sharedVolumeSize", default = "default_shared_volume_size")]
    pub shared_volume_size: String,
}

fn default_workspace_size() -> String {
    "10Gi".to_string()
}

fn default_shared_volume_size() -> String {
    "1Gi".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_class_name: None,
            workspace_size: default_workspace_size(),
            shared_volume_size: default_shared_volume_size(),
        }
    }
}

/// Telemetry toggle. Only consulted by `main` when wiring the tracing
/// subscriber's OTLP layer; the reconcile hot path never references it.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(rename = "otlpEndpoint", default)]
    pub otlp_endpoint: String,

    #[serde(rename = "otlpProtocol", default = "default_otlp_protocol")]
    pub otlp_protocol: String,
}

fn default_otlp_protocol() -> String {
    "grpc".to_string()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            job: JobConfig::default(),
            storage: StorageConfig::default(),
            telemetry: TelemetryConfig {
                otlp_protocol: default_otlp_protocol(),
                ..Default::default()
            },
        }
    }
}

impl ControllerConfig {
    /// Load configuration from a mounted file, falling back to defaults
    /// (with a warning) when the file is absent or malformed.
    pub fn from_mounted_file(config_path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(config_path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {config_path}: {e}"))?;
        let config: ControllerConfig = serde_yaml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("failed to parse config YAML: {e}"))?;
        Ok(config)
    }

    /// Validate invariants that serde's field defaults cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.job.default_image.trim().is_empty() {
            return Err(anyhow::anyhow!("job.defaultImage must not be empty"));
        }
        if self.job.default_timeout_seconds <= 0 {
            return Err(anyhow::anyhow!(
                "job.defaultTimeoutSeconds must be positive"
            ));
        }
        if self.storage.workspace_size.trim().is_empty() {
            return Err(anyhow::anyhow!("storage.workspaceSize must not be empty"));
        }
        if self.telemetry.enabled && self.telemetry.otlp_endpoint.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "telemetry.otlpEndpoint must be set when telemetry.enabled is true"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = ControllerConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.job.default_timeout_seconds, 3600);
        assert_eq!(cfg.storage.workspace_size, "10Gi");
    }

    #[test]
    fn telemetry_enabled_requires_endpoint() {
        let mut cfg = ControllerConfig::default();
        cfg.telemetry.enabled = true;
        assert!(cfg.validate().is_err());
        cfg.telemetry.otlp_endpoint = "http://collector:4317".to_string();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parses_minimal_yaml() {
        let yaml = "job:\n  defaultImage: custom:latest\n";
        let cfg: ControllerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.job.default_image, "custom:latest");
        assert_eq!(cfg.job.default_timeout_seconds, 3600);
    }
}
