use crate::RuntimeError;
use imgrelay_schema::{ImageRef, TransferCredential};

/// A local container engine able to move images between registries.
///
/// Implementations must be idempotent for `pull` and `tag`: repeating either
/// with the same arguments leaves the local store unchanged.
pub trait ContainerRuntime: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    /// Fetch `image` into the local store, authenticating with `credential`.
    fn pull(&self, image: &ImageRef, credential: &TransferCredential) -> Result<(), RuntimeError>;

    /// Add `target` as a local alias of `source`.
    fn tag(&self, source: &ImageRef, target: &ImageRef) -> Result<(), RuntimeError>;

    /// Upload the local `image` to the registry its reference names.
    fn push(&self, image: &ImageRef, credential: &TransferCredential) -> Result<(), RuntimeError>;

    /// Drop the local alias `image`. Other aliases of the same image stay.
    fn remove_local_tag(&self, image: &ImageRef) -> Result<(), RuntimeError>;
}

pub fn select_runtime(name: &str) -> Result<Box<dyn ContainerRuntime>, RuntimeError> {
    match name {
        "docker" => Ok(Box::new(crate::docker::DockerCli::new())),
        "mock" => Ok(Box::new(crate::mock::MockRuntime::new())),
        other => Err(RuntimeError::Unavailable(other.to_owned())),
    }
}
