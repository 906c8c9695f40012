use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, ensure};
use serde::{Deserialize, Serialize};

use crate::assign::{AssignmentRequest, Slicing};
use crate::hasher::HashKind;
use crate::settings::Settings;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Default group count for experiments that do not set their own.
    pub groups: Option<u32>,
    #[serde(default)]
    pub hash: HashKind,
    /// Where the CLI keeps the local identity.
    #[serde(default = "default_identity_file")]
    pub identity_file: PathBuf,
    #[serde(default)]
    pub experiments: Vec<ExperimentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slices: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice: Option<u32>,
    /// Overrides the process-wide hasher for this experiment only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<HashKind>,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_identity_file() -> PathBuf {
    PathBuf::from(".bucketeer_id")
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if let Some(groups) = self.groups {
            ensure!(groups > 0, "groups must be greater than 0");
        }
        let mut names = HashSet::new();
        for (i, experiment) in self.experiments.iter().enumerate() {
            ensure!(
                !experiment.name.is_empty(),
                "experiments[{}] name must not be empty",
                i
            );
            ensure!(
                names.insert(experiment.name.as_str()),
                "experiments[{}] name {:?} is defined more than once",
                i,
                experiment.name
            );
            let groups = experiment.groups.or(self.groups);
            ensure!(
                groups.is_some_and(|g| g > 0),
                "experiment {:?} has no group count and no default groups is set",
                experiment.name
            );
            if let Some(subset) = experiment.subset {
                ensure!(
                    subset <= 100,
                    "experiment {:?} subset must be within 0..=100",
                    experiment.name
                );
            }
            experiment
                .slicing()
                .with_context(|| format!("experiment {:?} has invalid slicing", experiment.name))?;
        }
        Ok(())
    }

    pub fn settings(&self) -> Settings {
        Settings::new(self.groups, self.hash.build())
    }

    pub fn experiment(&self, name: &str) -> Option<&ExperimentConfig> {
        self.experiments.iter().find(|e| e.name == name)
    }
}

impl ExperimentConfig {
    /// `slices` and `slice` must be given together.
    pub fn slicing(&self) -> anyhow::Result<Option<Slicing>> {
        match (self.slices, self.slice) {
            (None, None) => Ok(None),
            (Some(slices), Some(slice)) => Ok(Some(Slicing::new(slices, slice)?)),
            _ => anyhow::bail!("slices and slice must be set together"),
        }
    }

    /// Builds the request for one identity; `None` defers to the provider.
    pub fn request(&self, identity: Option<String>) -> anyhow::Result<AssignmentRequest> {
        let mut request = AssignmentRequest::new().test_name(self.name.clone());
        request.identity = identity;
        request.groups = self.groups;
        request.subset = self.subset;
        request.slicing = self.slicing()?;
        request.hasher = self.hash.map(HashKind::build);
        Ok(request)
    }
}

pub const SAMPLE_CONFIG: &str = r#"# bucketeer configuration

# Address the HTTP service listens on
listen = "0.0.0.0:8080"

# Default number of groups for experiments that do not set their own.
groups = 2

# File holding this machine's identity for `bucketeer assign`.
identity_file = ".bucketeer_id"

# Hash used to turn identity + experiment name into a number.
# "additive" is weak and only meant for playing around; prefer
# "murmur3" (with an optional seed) or "xxh3".
[hash]
kind = "murmur3"
seed = 73

# A 50/50 test over half the population; the other half is control.
[[experiments]]
name = "logo-test"
subset = 50

# Only the first of three disjoint slices of the population takes part.
# Other deployments of the same test can claim slices 1 and 2.
[[experiments]]
name = "checkout"
slices = 3
slice = 0

# [[experiments]]
# name = "pricing"
# groups = 4
# hash = { kind = "xxh3" }
"#;
