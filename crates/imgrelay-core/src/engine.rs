use crate::lifecycle::TagState;
use crate::report::{RegionReport, ReplicationReport, TagOutcome};
use crate::retry::RetryPolicy;
use crate::CoreError;
use imgrelay_registry::{
    ensure_repository, get_credential, list_repositories, list_tags, RegistryConnector,
    RegistryControl,
};
use imgrelay_runtime::{pull, retag_and_push, ContainerRuntime, LocalImage};
use imgrelay_schema::{
    DestinationTagIndex, ImageTag, ProvisionPolicy, RegistryEndpoint, ReplicationConfig,
    ReplicationUnit, RepositoryDescriptor, TransferCredential,
};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Reconciles the source registry's matching repositories into every
/// destination region.
///
/// A run is strictly sequential: pull every tag of every matching source
/// repository once, then for each destination region in configured order
/// provision the destination repositories, index their tags, and push only
/// the missing ones. Any failure other than a missing destination repository
/// aborts the run.
pub struct Replicator<'a> {
    config: ReplicationConfig,
    registries: &'a dyn RegistryConnector,
    runtime: &'a dyn ContainerRuntime,
    retry: RetryPolicy,
}

/// A source repository whose tags are available in the local store.
struct StagedUnit {
    unit: ReplicationUnit,
    local: BTreeMap<ImageTag, LocalImage>,
}

/// Where one staged unit goes in the current destination region.
struct Target {
    descriptor: RepositoryDescriptor,
    index: DestinationTagIndex,
}

impl<'a> Replicator<'a> {
    pub fn new(
        config: ReplicationConfig,
        registries: &'a dyn RegistryConnector,
        runtime: &'a dyn ContainerRuntime,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);
        Self {
            config,
            registries,
            runtime,
            retry,
        }
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    pub fn run(&self) -> Result<ReplicationReport, CoreError> {
        self.config.validate()?;
        let pattern = self.config.pattern()?;
        let source_endpoint = self.config.source();
        let mut report = ReplicationReport::new(source_endpoint.region.clone());

        let source = self.registries.connect(&source_endpoint)?;
        let credential = get_credential(source.as_ref())?;
        info!("acquired source credential for {}", credential.registry);

        let repositories = self.retry.run("listing source repositories", || {
            list_repositories(source.as_ref(), pattern.as_ref())
        })?;
        if repositories.is_empty() {
            info!(
                "no repositories in {source_endpoint} match {}; nothing to do",
                self.config.name_pattern.as_deref().unwrap_or("*")
            );
            report.finish();
            return Ok(report);
        }
        report.repositories = repositories.iter().map(|r| r.name.clone()).collect();

        let mut staged = Vec::with_capacity(repositories.len());
        for repository in repositories {
            staged.push(self.stage(source.as_ref(), repository, &credential)?);
        }

        for endpoint in self.config.destinations() {
            let region = self.replicate_region(&endpoint, &staged)?;
            info!(
                "{endpoint}: {} pushed, {} skipped, {} tagged, {} repositories created",
                region.pushed(),
                region.skipped(),
                region.tagged(),
                region.created.len()
            );
            report.regions.push(region);
        }

        report.finish();
        info!(
            "replication finished: {} pushed, {} skipped across {} regions",
            report.pushed(),
            report.skipped(),
            report.regions.len()
        );
        Ok(report)
    }

    /// List the tags of `repository` and bring each into the local store.
    fn stage(
        &self,
        source: &dyn RegistryControl,
        repository: RepositoryDescriptor,
        credential: &TransferCredential,
    ) -> Result<StagedUnit, CoreError> {
        let tags = self.retry.run("listing source tags", || {
            list_tags(source, &repository)
        })?;
        info!("{}: {} tags", repository.name, tags.len());

        let mut local = BTreeMap::new();
        for tag in &tags {
            let image = if self.config.skip_pull {
                info!("skipping pull of {}", repository.image(tag));
                LocalImage::assume(&repository, tag)
            } else {
                self.retry
                    .run("pull", || pull(self.runtime, &repository, tag, credential))
                    .inspect_err(|e| error!("pull of {} failed: {e}", repository.image(tag)))?
            };
            local.insert(tag.clone(), image);
        }

        Ok(StagedUnit {
            unit: ReplicationUnit { repository, tags },
            local,
        })
    }

    fn replicate_region(
        &self,
        endpoint: &RegistryEndpoint,
        staged: &[StagedUnit],
    ) -> Result<RegionReport, CoreError> {
        info!("replicating into {endpoint}");
        if endpoint.region == self.config.source_region {
            warn!("destination {endpoint} is the source region; every tag is already present");
        }
        let control = self.registries.connect(endpoint)?;
        let credential = get_credential(control.as_ref())?;
        let mut region = RegionReport::new(endpoint.region.clone());

        let (mut targets, assignment) = self.provision(control.as_ref(), staged, &mut region)?;

        for (staged_unit, &slot) in staged.iter().zip(&assignment) {
            let target = &mut targets[slot];
            for tag in &staged_unit.unit.tags {
                let state = self.replicate_tag(staged_unit, tag, target, &credential)?;
                region.outcomes.push(TagOutcome {
                    repository: staged_unit.unit.repository.name.clone(),
                    destination: target.descriptor.uri.clone(),
                    tag: tag.clone(),
                    state,
                });
            }
        }
        Ok(region)
    }

    /// Ensure the destination repositories exist and index their tags.
    ///
    /// Returns the distinct targets and, for each staged unit, the index of
    /// the target it is pushed into.
    fn provision(
        &self,
        control: &dyn RegistryControl,
        staged: &[StagedUnit],
        region: &mut RegionReport,
    ) -> Result<(Vec<Target>, Vec<usize>), CoreError> {
        let mut targets: Vec<Target> = Vec::new();
        let mut by_name: BTreeMap<&str, usize> = BTreeMap::new();
        let mut assignment = Vec::with_capacity(staged.len());

        for staged_unit in staged {
            let name = match self.config.provision {
                ProvisionPolicy::PerRepository => staged_unit.unit.repository.name.as_str(),
                ProvisionPolicy::FirstMatch => staged[0].unit.repository.name.as_str(),
            };
            if let Some(&slot) = by_name.get(name) {
                assignment.push(slot);
                continue;
            }

            let provisioned = ensure_repository(control, name)?;
            if provisioned.created {
                region.created.push(provisioned.descriptor.name.clone());
            }
            let index = self.retry.run("listing destination tags", || {
                list_tags(control, &provisioned.descriptor)
            })?;
            debug!(
                "{}: {} tags already present",
                provisioned.descriptor.uri,
                index.len()
            );

            by_name.insert(name, targets.len());
            assignment.push(targets.len());
            targets.push(Target {
                descriptor: provisioned.descriptor,
                index,
            });
        }
        Ok((targets, assignment))
    }

    fn replicate_tag(
        &self,
        staged_unit: &StagedUnit,
        tag: &ImageTag,
        target: &mut Target,
        credential: &TransferCredential,
    ) -> Result<TagState, CoreError> {
        let mut state = TagState::Pending;
        let destination = &target.descriptor;

        if target.index.contains(tag) {
            info!("{tag} already present in {}, skipping", destination.uri);
            state.advance(TagState::Skipped)?;
            return Ok(state);
        }

        let Some(local) = staged_unit.local.get(tag) else {
            return Err(imgrelay_runtime::RuntimeError::transfer(
                "push",
                destination.image(tag),
                "image was not staged locally",
            )
            .into());
        };

        state.advance(TagState::Transferring)?;
        let pushed = self.retry.run("push", || {
            retag_and_push(
                self.runtime,
                local,
                destination,
                credential,
                self.config.skip_push,
            )
        });
        match pushed {
            Ok(()) if self.config.skip_push => {
                state.advance(TagState::Tagged)?;
                info!("tagged {} (push skipped)", destination.image(tag));
                Ok(state)
            }
            Ok(()) => {
                state.advance(TagState::Pushed)?;
                target.index.insert(tag.clone());
                Ok(state)
            }
            Err(e) => {
                state.advance(TagState::Failed)?;
                error!("push of {} failed: {e}", destination.image(tag));
                Err(e.into())
            }
        }
    }
}
