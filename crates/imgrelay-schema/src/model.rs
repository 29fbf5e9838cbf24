use crate::types::{ImageTag, Region, RepositoryName};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Tags already present in one destination repository.
pub type DestinationTagIndex = BTreeSet<ImageTag>;

/// A registry instance, addressed by the region hosting it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistryEndpoint {
    pub region: Region,
}

impl RegistryEndpoint {
    pub fn new(region: impl Into<Region>) -> Self {
        Self {
            region: region.into(),
        }
    }
}

impl fmt::Display for RegistryEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.region)
    }
}

/// A repository in some registry.
///
/// `name` is the join key across regions; `uri` is the fully qualified
/// reference (`<registry host>/<name>`) that images are pulled from or
/// pushed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    pub name: RepositoryName,
    pub uri: String,
}

impl RepositoryDescriptor {
    pub fn new(name: impl Into<RepositoryName>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
        }
    }

    /// Host part of the repository URI.
    pub fn registry_host(&self) -> &str {
        self.uri
            .split_once('/')
            .map_or(self.uri.as_str(), |(host, _)| host)
    }

    /// Region encoded in an ECR-style host
    /// (`<account>.dkr.ecr.<region>.amazonaws.com`), if any.
    pub fn region(&self) -> Option<&str> {
        let mut parts = self.registry_host().split('.');
        let _account = parts.next()?;
        if parts.next()? != "dkr" || parts.next()? != "ecr" {
            return None;
        }
        parts.next()
    }

    /// Fully qualified reference of `tag` inside this repository.
    pub fn image(&self, tag: &ImageTag) -> ImageRef {
        ImageRef::new(self.uri.clone(), tag.clone())
    }
}

/// Fully qualified image reference: `<repository uri>:<tag>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub repository: String,
    pub tag: ImageTag,
}

impl ImageRef {
    pub fn new(repository: impl Into<String>, tag: impl Into<ImageTag>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// Registry host the reference points at.
    pub fn registry_host(&self) -> &str {
        self.repository
            .split_once('/')
            .map_or(self.repository.as_str(), |(host, _)| host)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// Source-side snapshot of one repository's tag inventory, taken once per
/// run during the pull phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationUnit {
    pub repository: RepositoryDescriptor,
    pub tags: BTreeSet<ImageTag>,
}

/// Short-lived credential for pulling from or pushing to one registry.
#[derive(Debug)]
pub struct TransferCredential {
    pub principal: String,
    pub secret: SecretString,
    /// Registry host the credential was issued for.
    pub registry: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TransferCredential {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}
