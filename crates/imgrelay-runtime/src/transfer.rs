//! Pull and retag-push steps of a replication.

use crate::backend::ContainerRuntime;
use crate::RuntimeError;
use imgrelay_schema::{ImageRef, ImageTag, RepositoryDescriptor, TransferCredential};
use tracing::{info, warn};

/// An image present in the local store under its source-qualified reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImage {
    reference: ImageRef,
}

impl LocalImage {
    /// Handle for an image assumed to be local already, without pulling it.
    pub fn assume(source: &RepositoryDescriptor, tag: &ImageTag) -> Self {
        Self {
            reference: source.image(tag),
        }
    }

    pub fn reference(&self) -> &ImageRef {
        &self.reference
    }

    pub fn tag(&self) -> &ImageTag {
        &self.reference.tag
    }
}

/// Fetch `source:tag` into the local store.
pub fn pull(
    runtime: &dyn ContainerRuntime,
    source: &RepositoryDescriptor,
    tag: &ImageTag,
    credential: &TransferCredential,
) -> Result<LocalImage, RuntimeError> {
    let local = LocalImage::assume(source, tag);
    info!("pulling {}", local.reference);
    runtime.pull(&local.reference, credential)?;
    Ok(local)
}

/// A destination-qualified alias of a local image. The alias is removed when
/// the guard is dropped; a failed removal is logged and otherwise ignored.
pub struct LocalTag<'a> {
    runtime: &'a dyn ContainerRuntime,
    image: ImageRef,
}

impl<'a> LocalTag<'a> {
    pub fn create(
        runtime: &'a dyn ContainerRuntime,
        local: &LocalImage,
        target: ImageRef,
    ) -> Result<Self, RuntimeError> {
        runtime.tag(&local.reference, &target)?;
        Ok(Self {
            runtime,
            image: target,
        })
    }

    pub fn image(&self) -> &ImageRef {
        &self.image
    }
}

impl Drop for LocalTag<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.runtime.remove_local_tag(&self.image) {
            warn!("failed to remove local tag {}: {e}", self.image);
        }
    }
}

/// Tag `local` into `destination`, push it unless `skip_push`, and drop the
/// destination alias again whatever the outcome.
pub fn retag_and_push(
    runtime: &dyn ContainerRuntime,
    local: &LocalImage,
    destination: &RepositoryDescriptor,
    credential: &TransferCredential,
    skip_push: bool,
) -> Result<(), RuntimeError> {
    let alias = LocalTag::create(runtime, local, destination.image(local.tag()))?;
    if skip_push {
        info!("skipping push of {}", alias.image());
        return Ok(());
    }
    info!("pushing {}", alias.image());
    runtime.push(alias.image(), credential)
}
