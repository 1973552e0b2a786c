//! Pure object-construction layer (§4.1): every function here takes already
//! resolved inputs and returns a fully-formed Kubernetes object, no I/O.
//! Reconcilers call these, then `create`/`patch_status` the result.

pub mod clone_script;
pub mod command;
pub mod env;
pub mod job;
pub mod owner;
pub mod volume_claim;
