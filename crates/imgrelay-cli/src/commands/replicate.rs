use super::{colorize_state, json_pretty, CONFIG_ERROR_PREFIX, EXIT_SUCCESS};
use imgrelay_core::{ReplicationReport, Replicator};
use imgrelay_registry::EcrConnector;
use imgrelay_runtime::DockerCli;
use imgrelay_schema::{parse_config_file, ProvisionPolicy, Region, ReplicationConfig};
use std::path::Path;
use tracing::error;

/// Command-line values that take precedence over the configuration file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub source_region: Option<String>,
    pub destination_regions: Vec<String>,
    pub pattern: Option<String>,
    pub provision: Option<ProvisionPolicy>,
    pub skip_pull: bool,
    pub skip_push: bool,
    pub profile: Option<String>,
    pub max_attempts: Option<u32>,
}

impl Overrides {
    fn apply(&self, config: &mut ReplicationConfig) {
        if let Some(region) = &self.source_region {
            config.source_region = Region::new(region.as_str());
        }
        if !self.destination_regions.is_empty() {
            config.destination_regions = self
                .destination_regions
                .iter()
                .map(|r| Region::new(r.as_str()))
                .collect();
        }
        if let Some(pattern) = &self.pattern {
            config.name_pattern = Some(pattern.clone());
        }
        if let Some(policy) = self.provision {
            config.provision = policy;
        }
        config.skip_pull |= self.skip_pull;
        config.skip_push |= self.skip_push;
        if let Some(profile) = &self.profile {
            config.profile = Some(profile.clone());
        }
        if let Some(attempts) = self.max_attempts {
            config.retry.max_attempts = attempts;
        }
    }
}

/// Read the configuration file (defaults when absent), apply the command-line
/// overrides, and validate the result.
pub fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<ReplicationConfig, String> {
    let mut config = match path {
        Some(path) => parse_config_file(path)
            .map_err(|e| format!("{CONFIG_ERROR_PREFIX} {}: {e}", path.display()))?,
        None => ReplicationConfig::default(),
    };
    overrides.apply(&mut config);
    config
        .validate()
        .map_err(|e| format!("{CONFIG_ERROR_PREFIX} {e}"))?;
    Ok(config)
}

pub fn run(config: ReplicationConfig, json: bool) -> Result<u8, String> {
    let connector = EcrConnector::from_env(config.profile.as_deref(), &config.source_region)
        .map_err(|e| {
            error!("{e}");
            format!("registry error: {e}")
        })?;
    let runtime = DockerCli::new();

    let report = Replicator::new(config, &connector, &runtime)
        .run()
        .map_err(|e| {
            error!("replication failed: {e}");
            e.to_string()
        })?;

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(EXIT_SUCCESS)
}

fn print_summary(report: &ReplicationReport) {
    if report.is_noop() {
        println!(
            "no repositories in {} matched; nothing to replicate",
            report.source_region
        );
        return;
    }
    println!(
        "replicated {} repositories from {}",
        report.repositories.len(),
        report.source_region
    );
    for region in &report.regions {
        if region.tagged() > 0 {
            println!(
                "  {}: {} pushed, {} skipped, {} tagged locally (push skipped)",
                region.region,
                region.pushed(),
                region.skipped(),
                region.tagged()
            );
        } else {
            println!(
                "  {}: {} pushed, {} skipped",
                region.region,
                region.pushed(),
                region.skipped()
            );
        }
        for name in &region.created {
            println!("    created {name}");
        }
        for outcome in &region.outcomes {
            println!(
                "    {}:{} {}",
                outcome.repository,
                outcome.tag,
                colorize_state(outcome.state)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file_or_overrides() {
        let config = load_config(None, &Overrides::default()).unwrap();
        assert_eq!(config, ReplicationConfig::default());
    }

    #[test]
    fn overrides_take_precedence_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("imgrelay.toml");
        std::fs::write(
            &path,
            r#"
source_region = "us-east-2"
destination_regions = ["eu-west-1"]
name_pattern = "mlflow"
skip_pull = true
"#,
        )
        .unwrap();

        let overrides = Overrides {
            destination_regions: vec!["ap-south-1".to_owned(), "eu-central-1".to_owned()],
            provision: Some(ProvisionPolicy::FirstMatch),
            max_attempts: Some(3),
            ..Overrides::default()
        };
        let config = load_config(Some(&path), &overrides).unwrap();
        assert_eq!(config.source_region, "us-east-2");
        assert_eq!(config.destination_regions, ["ap-south-1", "eu-central-1"]);
        assert_eq!(config.name_pattern.as_deref(), Some("mlflow"));
        assert_eq!(config.provision, ProvisionPolicy::FirstMatch);
        assert!(config.skip_pull);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn invalid_results_are_configuration_errors() {
        let overrides = Overrides {
            pattern: Some("(".to_owned()),
            ..Overrides::default()
        };
        let err = load_config(None, &overrides).unwrap_err();
        assert!(err.starts_with(CONFIG_ERROR_PREFIX), "{err}");

        let overrides = Overrides {
            destination_regions: vec!["eu-west-1".to_owned(), "eu-west-1".to_owned()],
            ..Overrides::default()
        };
        let err = load_config(None, &overrides).unwrap_err();
        assert!(err.contains("listed more than once"), "{err}");
    }

    #[test]
    fn destination_may_equal_source() {
        let overrides = Overrides {
            destination_regions: vec!["us-east-1".to_owned()],
            ..Overrides::default()
        };
        let config = load_config(None, &overrides).unwrap();
        assert_eq!(config.destination_regions, [config.source_region.clone()]);
    }

    #[test]
    fn unreadable_file_is_configuration_error() {
        let err = load_config(Some(Path::new("/nonexistent/imgrelay.toml")), &Overrides::default())
            .unwrap_err();
        assert!(err.starts_with(CONFIG_ERROR_PREFIX));
        assert!(err.contains("/nonexistent/imgrelay.toml"));
    }
}
