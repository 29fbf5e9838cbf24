//! Data model and configuration for imgrelay.
//!
//! This crate defines the schema layer shared by every other crate: string
//! newtypes for regions, repository names and tags (`types`), the typed
//! replication records (`RepositoryDescriptor`, `ReplicationUnit`,
//! `TransferCredential`, `ImageRef`) and the TOML run configuration
//! (`ReplicationConfig`) with its validation rules.

pub mod config;
pub mod model;
pub mod types;

pub use config::{
    parse_config_file, parse_config_str, ConfigError, ProvisionPolicy, ReplicationConfig,
    RetrySection,
};
pub use model::{
    DestinationTagIndex, ImageRef, RegistryEndpoint, ReplicationUnit, RepositoryDescriptor,
    TransferCredential,
};
pub use types::{ImageTag, Region, RepositoryName};
