use crate::config::ControllerConfig;
use kube::Client;
use std::sync::Arc;

/// Shared state handed to every reconciler invocation.
///
/// Cheap to clone: `Client` is an `Arc`-backed handle and `ControllerConfig`
/// is itself wrapped in an `Arc`. Carries no interior mutability — reconcilers
/// never cache state across invocations, they only ever read through this.
#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub namespace: String,
    pub config: Arc<ControllerConfig>,
}
