//! Shared error taxonomy for the reconcilers.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Controller configuration error: {0}")]
    Config(String),

    #[error("ProviderResolutionFailed: {0}")]
    ProviderResolutionFailed(String),

    #[error("WorkspaceResolutionFailed: {0}")]
    WorkspaceResolutionFailed(String),

    #[error("SpecValidationFailed: {0}")]
    SpecValidation(String),

    #[error("Missing object key (name or namespace)")]
    MissingObjectKey,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// True when a `kube::Error` wraps an HTTP 404 response.
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}
