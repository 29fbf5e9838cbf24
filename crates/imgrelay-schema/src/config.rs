use crate::model::RegistryEndpoint;
use crate::types::Region;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_SOURCE_REGION: &str = "us-east-1";
pub const DEFAULT_DESTINATION_REGIONS: [&str; 2] = ["us-west-1", "eu-west-1"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("source_region must not be empty")]
    EmptySourceRegion,
    #[error("destination_regions must list at least one region")]
    NoDestinations,
    #[error("destination region '{0}' is listed more than once")]
    DuplicateDestination(String),
    #[error("invalid name_pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("retry.max_attempts must be at least 1")]
    ZeroAttempts,
}

/// How destination repositories are provisioned when several source
/// repositories match the pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisionPolicy {
    /// One destination repository per distinct source repository name.
    #[default]
    PerRepository,
    /// A single destination repository named after the first matched source
    /// repository receives every unit's tags.
    FirstMatch,
}

impl std::str::FromStr for ProvisionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per-repository" => Ok(Self::PerRepository),
            "first-match" => Ok(Self::FirstMatch),
            other => Err(format!(
                "unknown provision policy '{other}', expected 'per-repository' or 'first-match'"
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// Everything one reconciliation run needs to know.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReplicationConfig {
    #[serde(default = "default_source_region")]
    pub source_region: Region,
    #[serde(default = "default_destination_regions")]
    pub destination_regions: Vec<Region>,
    #[serde(default)]
    pub name_pattern: Option<String>,
    #[serde(default)]
    pub provision: ProvisionPolicy,
    /// Assume source images are already local instead of pulling them.
    #[serde(default)]
    pub skip_pull: bool,
    /// Tag and release destination images without uploading them.
    #[serde(default)]
    pub skip_push: bool,
    /// Named credentials profile for the registry control plane.
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub retry: RetrySection,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            source_region: default_source_region(),
            destination_regions: default_destination_regions(),
            name_pattern: None,
            provision: ProvisionPolicy::default(),
            skip_pull: false,
            skip_push: false,
            profile: None,
            retry: RetrySection::default(),
        }
    }
}

impl ReplicationConfig {
    pub fn source(&self) -> RegistryEndpoint {
        RegistryEndpoint::new(self.source_region.clone())
    }

    pub fn destinations(&self) -> impl Iterator<Item = RegistryEndpoint> + '_ {
        self.destination_regions
            .iter()
            .cloned()
            .map(RegistryEndpoint::new)
    }

    /// Compile `name_pattern`, if set.
    pub fn pattern(&self) -> Result<Option<Regex>, ConfigError> {
        self.name_pattern
            .as_deref()
            .map(|p| {
                Regex::new(p).map_err(|source| ConfigError::InvalidPattern {
                    pattern: p.to_owned(),
                    source,
                })
            })
            .transpose()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_region.trim().is_empty() {
            return Err(ConfigError::EmptySourceRegion);
        }
        if self.destination_regions.is_empty() {
            return Err(ConfigError::NoDestinations);
        }
        let mut seen = BTreeSet::new();
        for region in &self.destination_regions {
            if !seen.insert(region.as_str()) {
                return Err(ConfigError::DuplicateDestination(region.to_string()));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        self.pattern()?;
        Ok(())
    }
}

fn default_source_region() -> Region {
    Region::new(DEFAULT_SOURCE_REGION)
}

fn default_destination_regions() -> Vec<Region> {
    DEFAULT_DESTINATION_REGIONS
        .iter()
        .copied()
        .map(Region::from)
        .collect()
}

fn default_max_attempts() -> u32 {
    1
}

fn default_backoff_ms() -> u64 {
    500
}

pub fn parse_config_str(input: &str) -> Result<ReplicationConfig, ConfigError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<ReplicationConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}
