//! Reconcile-loop implementations for the three core state machines (§4.3,
//! §4.4, §4.5) plus the trivial `NamespaceDefaults` validator.

pub mod namespace_defaults;
pub mod provider;
pub mod run;
pub mod workspace;

use crate::error::{Error, Result};
use kube::api::PostParams;
use kube::{Api, Error as KubeError};

/// `AlreadyExists` on create is silently treated as success (§7) — the
/// only shared idempotent-create helper, used by every reconciler that
/// creates a dependent object.
pub(crate) async fn create_ignoring_already_exists<T>(api: &Api<T>, object: T) -> Result<()>
where
    T: Clone + serde::de::DeserializeOwned + serde::Serialize + std::fmt::Debug,
{
    match api.create(&PostParams::default(), &object).await {
        Ok(_) => Ok(()),
        Err(KubeError::Api(resp)) if resp.code == 409 => Ok(()),
        Err(e) => Err(Error::Kube(e)),
    }
}
