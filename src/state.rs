use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::{AppConfig, ExperimentConfig};
use crate::settings::{Settings, SettingsPatch};

pub type SharedState = Arc<ArcSwap<ServiceState>>;

/// Snapshot served to HTTP handlers. Replaced wholesale on every settings
/// change so a request never observes a half-applied update.
#[derive(Debug, Clone)]
pub struct ServiceState {
    pub settings: Settings,
    pub experiments: Vec<ExperimentConfig>,
}

impl ServiceState {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            settings: config.settings(),
            experiments: config.experiments.clone(),
        }
    }

    pub fn experiment(&self, name: &str) -> Option<&ExperimentConfig> {
        self.experiments.iter().find(|e| e.name == name)
    }
}

pub fn shared_state(state: ServiceState) -> SharedState {
    Arc::new(ArcSwap::from_pointee(state))
}

/// Merges `patch` into the shared settings and returns the new snapshot.
pub fn configure(state: &SharedState, patch: SettingsPatch) -> Arc<ServiceState> {
    state.rcu(|current| {
        let mut next = ServiceState::clone(current);
        next.settings.configure(patch.clone());
        next
    });
    state.load_full()
}
