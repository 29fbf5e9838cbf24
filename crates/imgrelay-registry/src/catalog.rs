use crate::{RegistryControl, RegistryError};
use imgrelay_schema::{ImageTag, RepositoryDescriptor};
use regex::Regex;
use std::collections::BTreeSet;

/// Repositories in the registry behind `control`, optionally filtered by
/// `pattern`.
///
/// The pattern matches anywhere in the repository name; anchor it with `^`
/// and `$` for an exact match. Registry order is preserved.
pub fn list_repositories(
    control: &dyn RegistryControl,
    pattern: Option<&Regex>,
) -> Result<Vec<RepositoryDescriptor>, RegistryError> {
    let all = control.describe_repositories()?;
    let total = all.len();
    let matched: Vec<_> = match pattern {
        Some(re) => all.into_iter().filter(|r| re.is_match(&r.name)).collect(),
        None => all,
    };
    tracing::debug!(
        "{}: {} of {total} repositories selected",
        control.endpoint(),
        matched.len()
    );
    Ok(matched)
}

/// Tags present in `repository`. Untagged images are ignored.
pub fn list_tags(
    control: &dyn RegistryControl,
    repository: &RepositoryDescriptor,
) -> Result<BTreeSet<ImageTag>, RegistryError> {
    Ok(control
        .list_images(&repository.name)?
        .into_iter()
        .filter_map(|image| image.tag)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockFleet;
    use crate::RegistryConnector;
    use imgrelay_schema::RegistryEndpoint;

    fn names(repos: &[RepositoryDescriptor]) -> Vec<&str> {
        repos.iter().map(|r| r.name.as_str()).collect()
    }

    fn seeded() -> (MockFleet, Box<dyn RegistryControl>) {
        let fleet = MockFleet::new();
        let source = fleet.registry("us-east-1");
        source.add_repository("app");
        source.add_repository("app-worker");
        source.add_repository("db");
        let control = fleet.connect(&RegistryEndpoint::new("us-east-1")).unwrap();
        (fleet, control)
    }

    #[test]
    fn no_pattern_lists_everything() {
        let (_fleet, control) = seeded();
        let repos = list_repositories(control.as_ref(), None).unwrap();
        assert_eq!(names(&repos), ["app", "app-worker", "db"]);
    }

    #[test]
    fn pattern_matches_anywhere_in_name() {
        let (_fleet, control) = seeded();
        let re = Regex::new("app").unwrap();
        let repos = list_repositories(control.as_ref(), Some(&re)).unwrap();
        assert_eq!(names(&repos), ["app", "app-worker"]);

        let re = Regex::new("^app$").unwrap();
        let repos = list_repositories(control.as_ref(), Some(&re)).unwrap();
        assert_eq!(names(&repos), ["app"]);
    }

    #[test]
    fn pattern_without_match_yields_empty() {
        let (_fleet, control) = seeded();
        let re = Regex::new("^nothing").unwrap();
        assert!(list_repositories(control.as_ref(), Some(&re))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn list_tags_skips_untagged_images() {
        let (fleet, control) = seeded();
        let source = fleet.registry("us-east-1");
        source.add_image("app", Some("v1"));
        source.add_image("app", Some("v2"));
        source.add_image("app", None);
        let repo = control.describe_repository("app").unwrap();
        let tags = list_tags(control.as_ref(), &repo).unwrap();
        let tags: Vec<&str> = tags.iter().map(ImageTag::as_str).collect();
        assert_eq!(tags, ["v1", "v2"]);
    }

    #[test]
    fn list_errors_propagate() {
        let (fleet, control) = seeded();
        fleet.registry("us-east-1").fail_listing("ServiceUnavailable");
        assert!(matches!(
            list_repositories(control.as_ref(), None),
            Err(RegistryError::Unknown { .. })
        ));
    }
}
