use crate::{RegistryControl, RegistryError};
use imgrelay_schema::RepositoryDescriptor;

/// Outcome of [`ensure_repository`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub descriptor: RepositoryDescriptor,
    /// Whether the repository was created by this call.
    pub created: bool,
}

/// Return the repository `name` in the registry behind `control`, creating it
/// if it does not exist yet.
///
/// Only a definite "does not exist" leads to creation. Any other lookup
/// failure is returned unchanged.
pub fn ensure_repository(
    control: &dyn RegistryControl,
    name: &str,
) -> Result<Provisioned, RegistryError> {
    match control.describe_repository(name) {
        Ok(descriptor) => Ok(Provisioned {
            descriptor,
            created: false,
        }),
        Err(RegistryError::NotFound(_)) => {
            tracing::info!("creating repository {name} in {}", control.endpoint());
            let descriptor = control.create_repository(name)?;
            Ok(Provisioned {
                descriptor,
                created: true,
            })
        }
        Err(e) => Err(e),
    }
}
