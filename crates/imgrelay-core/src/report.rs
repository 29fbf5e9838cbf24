use crate::lifecycle::TagState;
use chrono::{DateTime, Utc};
use imgrelay_schema::{ImageTag, Region, RepositoryName};
use serde::{Deserialize, Serialize};

/// Final state of one tag in one destination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagOutcome {
    /// Source repository the tag came from.
    pub repository: RepositoryName,
    /// Destination repository URI the tag was checked against.
    pub destination: String,
    pub tag: ImageTag,
    pub state: TagState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegionReport {
    pub region: Region,
    /// Repositories created in this region during the run.
    pub created: Vec<RepositoryName>,
    pub outcomes: Vec<TagOutcome>,
}

impl RegionReport {
    pub fn new(region: Region) -> Self {
        Self {
            region,
            created: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    fn count(&self, state: TagState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    pub fn pushed(&self) -> usize {
        self.count(TagState::Pushed)
    }

    pub fn skipped(&self) -> usize {
        self.count(TagState::Skipped)
    }

    /// Tags prepared for this region but not pushed (`skip_push`).
    pub fn tagged(&self) -> usize {
        self.count(TagState::Tagged)
    }

    /// Tags pushed into `repository` (a source repository name).
    pub fn pushed_tags(&self, repository: &str) -> Vec<&ImageTag> {
        self.outcomes
            .iter()
            .filter(|o| o.state == TagState::Pushed && o.repository == *repository)
            .map(|o| &o.tag)
            .collect()
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicationReport {
    pub source_region: Region,
    /// Source repositories that matched the name pattern.
    pub repositories: Vec<RepositoryName>,
    pub regions: Vec<RegionReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ReplicationReport {
    pub fn new(source_region: Region) -> Self {
        let now = Utc::now();
        Self {
            source_region,
            repositories: Vec::new(),
            regions: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
    }

    /// Whether nothing matched the pattern.
    pub fn is_noop(&self) -> bool {
        self.repositories.is_empty()
    }

    pub fn pushed(&self) -> usize {
        self.regions.iter().map(RegionReport::pushed).sum()
    }

    pub fn skipped(&self) -> usize {
        self.regions.iter().map(RegionReport::skipped).sum()
    }

    pub fn tagged(&self) -> usize {
        self.regions.iter().map(RegionReport::tagged).sum()
    }

    pub fn created(&self) -> usize {
        self.regions.iter().map(|r| r.created.len()).sum()
    }

    pub fn region(&self, region: &str) -> Option<&RegionReport> {
        self.regions.iter().find(|r| r.region == *region)
    }
}
