//! Positional call shape: a flat list mixing key material and handlers, as in
//! `run(["user-1", "Logo Test", handler_a, handler_b])`.
//!
//! Everything here normalizes into an [`AssignmentRequest`] and goes through
//! [`assign`] or [`run_experiment`]; no bucketing happens in this module.

use crate::assign::{Assignment, AssignmentRequest, assign};
use crate::error::Result;
use crate::experiment::{Experiment, Handler, run_experiment};
use crate::identity::IdentityProvider;
use crate::key::{KeyPart, build_key};
use crate::settings::Settings;

pub enum Arg<'a, T> {
    Key(KeyPart),
    Handler(Handler<'a, T>),
}

impl<'a, T> Arg<'a, T> {
    pub fn key(part: impl Into<KeyPart>) -> Self {
        Arg::Key(part.into())
    }

    pub fn handler(handler: impl FnOnce(&str, Assignment) -> T + 'a) -> Self {
        Arg::Handler(Box::new(handler))
    }
}

/// Separates key material from handlers, keeping the order of each.
pub fn split_args<'a, T>(args: Vec<Arg<'a, T>>) -> (Vec<KeyPart>, Vec<Handler<'a, T>>) {
    let mut parts = Vec::new();
    let mut handlers = Vec::new();
    for arg in args {
        match arg {
            Arg::Key(part) => parts.push(part),
            Arg::Handler(handler) => handlers.push(handler),
        }
    }
    (parts, handlers)
}

/// The concatenated key becomes the identity; an empty key defers to the
/// provider. No test name is appended since the parts already carry it.
fn positional_request(parts: &[KeyPart]) -> AssignmentRequest {
    let key = build_key(parts);
    let mut request = AssignmentRequest::new();
    if !key.is_empty() {
        request.identity = Some(key);
    }
    request
}

pub fn group(
    parts: &[KeyPart],
    settings: &Settings,
    provider: &dyn IdentityProvider,
) -> Result<Assignment> {
    assign(&positional_request(parts), settings, provider)
}

pub fn in_group(
    bucket: u32,
    parts: &[KeyPart],
    settings: &Settings,
    provider: &dyn IdentityProvider,
) -> Result<bool> {
    Ok(group(parts, settings, provider)? == Assignment::Bucket(bucket))
}

/// Handlers become one callback per bucket, in order; key parts form the key.
pub fn run<T>(
    args: Vec<Arg<'_, T>>,
    settings: &mut Settings,
    provider: &dyn IdentityProvider,
) -> Result<T> {
    let (parts, callbacks) = split_args(args);
    let experiment = Experiment {
        request: positional_request(&parts),
        callbacks,
        control: None,
    };
    run_experiment(settings, provider, experiment)
}
