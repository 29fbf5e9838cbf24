//! AWS identity for signing control-plane requests.
//!
//! Resolution goes through `aws-config`, so every source the AWS tooling
//! understands is honoured: environment variables, `~/.aws/credentials` and
//! `~/.aws/config` profiles (including `role_arn`/`source_profile`, SSO and
//! `credential_process`), web identity, and container or instance roles.

use crate::RegistryError;
use aws_config::profile::profile_file::ProfileFiles;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_config::provider_config::ProviderConfig;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::Credentials;

const PROVIDER_NAME: &str = "imgrelay";

/// Resolved identity used to sign control-plane requests. `Debug` redacts
/// the secret key and session token.
#[derive(Debug, Clone)]
pub struct AwsCredentials {
    inner: Credentials,
}

impl AwsCredentials {
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            inner: Credentials::new(access_key_id, secret_access_key, None, None, PROVIDER_NAME),
        }
    }

    #[must_use]
    pub fn with_session_token(self, token: &str) -> Self {
        Self {
            inner: Credentials::new(
                self.inner.access_key_id(),
                self.inner.secret_access_key(),
                Some(token.to_owned()),
                self.inner.expiry(),
                PROVIDER_NAME,
            ),
        }
    }

    pub fn access_key_id(&self) -> &str {
        self.inner.access_key_id()
    }

    pub fn session_token(&self) -> Option<&str> {
        self.inner.session_token()
    }

    pub(crate) fn inner(&self) -> &Credentials {
        &self.inner
    }

    /// Resolve credentials with the AWS default provider chain.
    ///
    /// A named `profile` is used exclusively, as the AWS CLI does with
    /// `--profile`; without one the chain starts with the environment and
    /// falls back to `AWS_PROFILE` or `default`. `region` is used for any
    /// STS call a role profile needs.
    pub fn load(profile: Option<&str>, region: &str) -> Result<Self, RegistryError> {
        Self::resolve(profile, region, None)
    }

    /// Like [`load`](Self::load), reading profiles from `files` instead of
    /// the default `~/.aws` locations.
    pub fn load_from_files(
        profile: Option<&str>,
        region: &str,
        files: ProfileFiles,
    ) -> Result<Self, RegistryError> {
        Self::resolve(profile, region, Some(files))
    }

    fn resolve(
        profile: Option<&str>,
        region: &str,
        files: Option<ProfileFiles>,
    ) -> Result<Self, RegistryError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let inner = runtime.block_on(resolve_credentials(profile, region, files))?;
        tracing::debug!(
            "resolved AWS credentials {} via {}",
            inner.access_key_id(),
            profile.unwrap_or("the default chain")
        );
        Ok(Self { inner })
    }
}

async fn resolve_credentials(
    profile: Option<&str>,
    region: &str,
    files: Option<ProfileFiles>,
) -> Result<Credentials, RegistryError> {
    let region = Region::new(region.to_owned());
    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region.clone());
    if let Some(files) = &files {
        loader = loader.profile_files(files.clone());
    }
    if let Some(name) = profile {
        let mut provider = ProfileFileCredentialsProvider::builder()
            .configure(&ProviderConfig::default().with_region(Some(region)))
            .profile_name(name);
        if let Some(files) = files {
            provider = provider.profile_files(files);
        }
        loader = loader
            .profile_name(name)
            .credentials_provider(provider.build());
    }

    let config = loader.load().await;
    let provider = config
        .credentials_provider()
        .ok_or_else(|| RegistryError::Config("no AWS credentials provider configured".to_owned()))?;
    provider.provide_credentials().await.map_err(|e| {
        let source = profile.map_or_else(|| "default chain".to_owned(), |p| format!("profile '{p}'"));
        RegistryError::Auth(format!("cannot resolve AWS credentials from {source}: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_config::profile::profile_file::ProfileFileKind;
    use std::path::Path;

    fn files(dir: &Path, config: &str, credentials: &str) -> ProfileFiles {
        let config_path = dir.join("config");
        let credentials_path = dir.join("credentials");
        std::fs::write(&config_path, config).unwrap();
        std::fs::write(&credentials_path, credentials).unwrap();
        ProfileFiles::builder()
            .with_file(ProfileFileKind::Config, config_path)
            .with_file(ProfileFileKind::Credentials, credentials_path)
            .build()
    }

    #[test]
    fn named_profile_from_credentials_file() {
        let dir = tempfile::tempdir().unwrap();
        let files = files(
            dir.path(),
            "",
            "[default]\naws_access_key_id = AKIADEFAULT\naws_secret_access_key = d\n\n\
             [production]\naws_access_key_id=AKIAPROD\naws_secret_access_key=prod/secret+key\n\
             aws_session_token = session-xyz\n",
        );
        let creds = AwsCredentials::load_from_files(Some("production"), "us-east-1", files).unwrap();
        assert_eq!(creds.access_key_id(), "AKIAPROD");
        assert_eq!(creds.session_token(), Some("session-xyz"));
    }

    #[test]
    fn named_profile_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let files = files(
            dir.path(),
            "[profile production_42]\naws_access_key_id = AKIACONFIG\naws_secret_access_key = c\n",
            "[default]\naws_access_key_id = AKIADEFAULT\naws_secret_access_key = d\n",
        );
        let creds =
            AwsCredentials::load_from_files(Some("production_42"), "eu-west-1", files).unwrap();
        assert_eq!(creds.access_key_id(), "AKIACONFIG");
        assert!(creds.session_token().is_none());
    }

    #[test]
    fn credential_process_profile() {
        let dir = tempfile::tempdir().unwrap();
        let files = files(
            dir.path(),
            "[profile tooling]\ncredential_process = echo '{\"Version\": 1, \"AccessKeyId\": \"AKIAPROC\", \"SecretAccessKey\": \"p\"}'\n",
            "",
        );
        let creds = AwsCredentials::load_from_files(Some("tooling"), "us-east-1", files).unwrap();
        assert_eq!(creds.access_key_id(), "AKIAPROC");
    }

    #[test]
    fn unknown_profile_is_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let files = files(
            dir.path(),
            "",
            "[default]\naws_access_key_id = AKIADEFAULT\naws_secret_access_key = d\n",
        );
        let err = AwsCredentials::load_from_files(Some("staging"), "us-east-1", files).unwrap_err();
        assert!(matches!(err, RegistryError::Auth(ref m) if m.contains("'staging'")), "{err}");
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let creds = AwsCredentials::new("AKIA", "very-secret").with_session_token("session-tok");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("AKIA"));
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("session-tok"));
    }
}
