use crate::args::{self, Arg};
use crate::assign::{self, Assignment, AssignmentRequest};
use crate::error::Result;
use crate::experiment::{self, Experiment};
use crate::identity::{IdentityProvider, MemoryIdentity};
use crate::key::KeyPart;
use crate::settings::{Settings, SettingsPatch};

/// Settings and an identity provider bundled behind the public operations.
///
/// Each `Lab` is independent; tests and services can hold as many as they
/// need without sharing configuration.
#[derive(Debug, Default)]
pub struct Lab<P = MemoryIdentity> {
    settings: Settings,
    identity: P,
}

impl<P: IdentityProvider> Lab<P> {
    pub fn new(settings: Settings, identity: P) -> Self {
        Self { settings, identity }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn identity_provider(&self) -> &P {
        &self.identity
    }

    pub fn configure(&mut self, patch: SettingsPatch) {
        self.settings.configure(patch);
    }

    pub fn resolve_identity(&self) -> Result<String> {
        self.identity.resolve()
    }

    pub fn reset_identity(&self) -> Result<()> {
        self.identity.reset()
    }

    pub fn assign(&self, request: &AssignmentRequest) -> Result<Assignment> {
        assign::assign(request, &self.settings, &self.identity)
    }

    pub fn in_group(&self, bucket: u32, request: &AssignmentRequest) -> Result<bool> {
        assign::in_group(bucket, request, &self.settings, &self.identity)
    }

    pub fn run_experiment<T>(&mut self, experiment: Experiment<'_, T>) -> Result<T> {
        experiment::run_experiment(&mut self.settings, &self.identity, experiment)
    }

    pub fn group(&self, parts: &[KeyPart]) -> Result<Assignment> {
        args::group(parts, &self.settings, &self.identity)
    }

    pub fn in_group_positional(&self, bucket: u32, parts: &[KeyPart]) -> Result<bool> {
        args::in_group(bucket, parts, &self.settings, &self.identity)
    }

    pub fn run<T>(&mut self, args: Vec<Arg<'_, T>>) -> Result<T> {
        args::run(args, &mut self.settings, &self.identity)
    }
}
