//! In-memory registries for tests.
//!
//! A [`MockFleet`] holds one [`MockRegistry`] per region and implements
//! [`RegistryConnector`], so the replication engine can run against it
//! unchanged. Registries use ECR-shaped hosts under a fixed account id.

use crate::ecr::classify_error;
use crate::{
    AuthorizationData, ImageIdentifier, RegistryConnector, RegistryControl, RegistryError,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Duration, Utc};
use imgrelay_schema::{ImageRef, ImageTag, Region, RegistryEndpoint, RepositoryDescriptor};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const MOCK_ACCOUNT: &str = "123456789012";

/// Registry host of the mock registry in `region`.
pub fn mock_host(region: &str) -> String {
    format!("{MOCK_ACCOUNT}.dkr.ecr.{region}.amazonaws.com")
}

fn injected(code: &str) -> RegistryError {
    classify_error(
        400,
        &format!(r#"{{"__type":"{code}","message":"injected failure"}}"#),
    )
}

#[derive(Default)]
struct RegistryState {
    /// Insertion order is the listing order.
    repositories: Vec<RepositoryDescriptor>,
    images: BTreeMap<String, Vec<ImageIdentifier>>,
    next_digest: u64,
    create_calls: usize,
    token_calls: usize,
    token: Option<String>,
    reject_tokens: bool,
    fail_listing: Option<String>,
    fail_describe: Option<String>,
    fail_create: Option<String>,
    fail_list_images: Option<String>,
}

impl RegistryState {
    fn find(&self, name: &str) -> Option<&RepositoryDescriptor> {
        self.repositories.iter().find(|r| r.name == name)
    }

    fn digest(&mut self) -> String {
        self.next_digest += 1;
        format!("sha256:{:064x}", self.next_digest)
    }
}

/// Handle to one in-memory registry. Clones share state.
#[derive(Clone)]
pub struct MockRegistry {
    endpoint: RegistryEndpoint,
    state: Arc<Mutex<RegistryState>>,
}

impl MockRegistry {
    pub fn new(region: impl Into<Region>) -> Self {
        Self {
            endpoint: RegistryEndpoint::new(region),
            state: Arc::new(Mutex::new(RegistryState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn host(&self) -> String {
        mock_host(&self.endpoint.region)
    }

    /// Add an empty repository, or return the existing one.
    pub fn add_repository(&self, name: &str) -> RepositoryDescriptor {
        let mut state = self.state();
        if let Some(existing) = state.find(name) {
            return existing.clone();
        }
        let descriptor = RepositoryDescriptor::new(name, format!("{}/{name}", self.host()));
        state.repositories.push(descriptor.clone());
        state.images.entry(name.to_owned()).or_default();
        descriptor
    }

    /// Add an image to `repository` (created if missing). A tag already on
    /// another image moves to the new one.
    pub fn add_image(&self, repository: &str, tag: Option<&str>) {
        self.add_repository(repository);
        let mut state = self.state();
        let digest = state.digest();
        let images = state.images.entry(repository.to_owned()).or_default();
        if let Some(tag) = tag {
            for image in images.iter_mut() {
                if image.tag.as_deref() == Some(tag) {
                    image.tag = None;
                }
            }
        }
        images.push(ImageIdentifier {
            digest,
            tag: tag.map(ImageTag::from),
        });
    }

    /// Tags currently present in `repository`.
    pub fn tags(&self, repository: &str) -> BTreeSet<ImageTag> {
        self.state()
            .images
            .get(repository)
            .map(|images| images.iter().filter_map(|i| i.tag.clone()).collect())
            .unwrap_or_default()
    }

    pub fn repository_names(&self) -> Vec<String> {
        self.state()
            .repositories
            .iter()
            .map(|r| r.name.to_string())
            .collect()
    }

    pub fn has_repository(&self, name: &str) -> bool {
        self.state().find(name).is_some()
    }

    pub fn create_calls(&self) -> usize {
        self.state().create_calls
    }

    pub fn token_calls(&self) -> usize {
        self.state().token_calls
    }

    /// Replace the raw token handed out by `get_authorization_token`.
    pub fn set_token(&self, token: &str) {
        self.state().token = Some(token.to_owned());
    }

    pub fn reject_tokens(&self) {
        self.state().reject_tokens = true;
    }

    /// Make `describe_repositories` fail with the given error code.
    pub fn fail_listing(&self, code: &str) {
        self.state().fail_listing = Some(code.to_owned());
    }

    /// Make `describe_repository` fail with the given error code.
    pub fn fail_describe(&self, code: &str) {
        self.state().fail_describe = Some(code.to_owned());
    }

    pub fn fail_create(&self, code: &str) {
        self.state().fail_create = Some(code.to_owned());
    }

    pub fn fail_list_images(&self, code: &str) {
        self.state().fail_list_images = Some(code.to_owned());
    }

    /// Record a pushed image. The repository must exist.
    pub fn accept_push(&self, image: &ImageRef) -> Result<(), RegistryError> {
        let name = {
            let state = self.state();
            state
                .repositories
                .iter()
                .find(|r| r.uri == image.repository)
                .map(|r| r.name.to_string())
                .ok_or_else(|| {
                    RegistryError::NotFound(format!("repository '{}'", image.repository))
                })?
        };
        self.add_image(&name, Some(image.tag.as_str()));
        Ok(())
    }
}

impl RegistryControl for MockRegistry {
    fn endpoint(&self) -> &RegistryEndpoint {
        &self.endpoint
    }

    fn describe_repositories(&self) -> Result<Vec<RepositoryDescriptor>, RegistryError> {
        let state = self.state();
        if let Some(code) = &state.fail_listing {
            return Err(injected(code));
        }
        Ok(state.repositories.clone())
    }

    fn describe_repository(&self, name: &str) -> Result<RepositoryDescriptor, RegistryError> {
        let state = self.state();
        if let Some(code) = &state.fail_describe {
            return Err(injected(code));
        }
        state.find(name).cloned().ok_or_else(|| {
            RegistryError::NotFound(format!(
                "The repository with name '{name}' does not exist in {}",
                self.endpoint
            ))
        })
    }

    fn create_repository(&self, name: &str) -> Result<RepositoryDescriptor, RegistryError> {
        {
            let mut state = self.state();
            state.create_calls += 1;
            if let Some(code) = &state.fail_create {
                return Err(injected(code));
            }
            if state.find(name).is_some() {
                return Err(injected("RepositoryAlreadyExistsException"));
            }
        }
        Ok(self.add_repository(name))
    }

    fn list_images(&self, repository: &str) -> Result<Vec<ImageIdentifier>, RegistryError> {
        let state = self.state();
        if let Some(code) = &state.fail_list_images {
            return Err(injected(code));
        }
        state
            .images
            .get(repository)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("repository '{repository}'")))
    }

    fn get_authorization_token(&self) -> Result<AuthorizationData, RegistryError> {
        let mut state = self.state();
        state.token_calls += 1;
        if state.reject_tokens {
            return Err(injected("AccessDeniedException"));
        }
        let token = state.token.clone().unwrap_or_else(|| {
            STANDARD.encode(format!("AWS:mock-password-{}", self.endpoint.region))
        });
        Ok(AuthorizationData {
            token,
            proxy_endpoint: format!("https://{}", self.host()),
            expires_at: Some(Utc::now() + Duration::hours(12)),
        })
    }
}

/// A set of mock registries keyed by region.
#[derive(Clone, Default)]
pub struct MockFleet {
    registries: Arc<Mutex<BTreeMap<Region, MockRegistry>>>,
    unreachable: Arc<Mutex<BTreeSet<Region>>>,
}

impl MockFleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry for `region`, created empty on first use.
    pub fn registry(&self, region: &str) -> MockRegistry {
        self.registries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(Region::from(region))
            .or_insert_with(|| MockRegistry::new(region))
            .clone()
    }

    /// Make `connect` fail for `region`.
    pub fn set_unreachable(&self, region: &str) {
        self.unreachable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(Region::from(region));
    }

    /// Route a pushed image to the registry its host names.
    pub fn accept_push(&self, image: &ImageRef) -> Result<(), RegistryError> {
        let lookup = RepositoryDescriptor::new("", image.repository.clone());
        let region = lookup.region().ok_or_else(|| {
            RegistryError::NotFound(format!("no registry serves {}", image.registry_host()))
        })?;
        self.registry(region).accept_push(image)
    }

    /// Whether `image` resolves to a tagged image in some registry.
    pub fn has_image(&self, image: &ImageRef) -> bool {
        let lookup = RepositoryDescriptor::new("", image.repository.clone());
        let Some(region) = lookup.region() else {
            return false;
        };
        let Some((_, name)) = image.repository.split_once('/') else {
            return false;
        };
        self.registry(region).tags(name).contains(&image.tag)
    }
}

impl RegistryConnector for MockFleet {
    fn connect(
        &self,
        endpoint: &RegistryEndpoint,
    ) -> Result<Box<dyn RegistryControl>, RegistryError> {
        let unreachable = self
            .unreachable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&endpoint.region);
        if unreachable {
            return Err(RegistryError::Http(format!(
                "connection refused: {endpoint}"
            )));
        }
        Ok(Box::new(self.registry(&endpoint.region)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repositories_get_ecr_style_uris() {
        let registry = MockRegistry::new("eu-west-1");
        let repo = registry.add_repository("team/app");
        assert_eq!(
            repo.uri,
            "123456789012.dkr.ecr.eu-west-1.amazonaws.com/team/app"
        );
        assert_eq!(repo.region(), Some("eu-west-1"));
        assert_eq!(registry.add_repository("team/app"), repo);
        assert_eq!(registry.repository_names(), ["team/app"]);
    }

    #[test]
    fn retagging_moves_the_tag() {
        let registry = MockRegistry::new("us-east-1");
        registry.add_image("app", Some("latest"));
        registry.add_image("app", Some("latest"));
        let images = registry.list_images("app").unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images.iter().filter(|i| i.tag.is_some()).count(), 1);
        assert_ne!(images[0].digest, images[1].digest);
    }

    #[test]
    fn fleet_shares_state_between_handles() {
        let fleet = MockFleet::new();
        fleet.registry("us-west-1").add_repository("app");
        let control = fleet.connect(&RegistryEndpoint::new("us-west-1")).unwrap();
        assert_eq!(control.describe_repositories().unwrap().len(), 1);
    }

    #[test]
    fn accept_push_routes_by_host() {
        let fleet = MockFleet::new();
        let repo = fleet.registry("eu-west-1").add_repository("app");
        let image = repo.image(&ImageTag::from("v1"));

        assert!(!fleet.has_image(&image));
        fleet.accept_push(&image).unwrap();
        assert!(fleet.has_image(&image));
        assert!(fleet.registry("eu-west-1").tags("app").contains("v1"));
        assert!(fleet.registry("us-east-1").tags("app").is_empty());
    }

    #[test]
    fn accept_push_requires_repository() {
        let fleet = MockFleet::new();
        let image = ImageRef::new(format!("{}/ghost", mock_host("eu-west-1")), "v1");
        assert!(matches!(
            fleet.accept_push(&image),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn create_existing_repository_fails() {
        let registry = MockRegistry::new("us-east-1");
        registry.add_repository("app");
        let err = registry.create_repository("app").unwrap_err();
        assert!(
            matches!(err, RegistryError::Unknown { ref code, .. } if code == "RepositoryAlreadyExistsException")
        );
    }

    #[test]
    fn unreachable_region_fails_to_connect() {
        let fleet = MockFleet::new();
        fleet.set_unreachable("ap-south-1");
        assert!(matches!(
            fleet.connect(&RegistryEndpoint::new("ap-south-1")),
            Err(RegistryError::Http(_))
        ));
    }
}
