//! Deterministic experiment bucketing.
//!
//! An identity and a test name are concatenated into a key, hashed, and the
//! hash decides the outcome: control when it falls outside the configured
//! subset or slice, otherwise `hash mod groups`. The same identity and
//! parameters always land in the same bucket, with no coordination between
//! the processes that compute it.
//!
//! ```
//! use bucketeer::{AssignmentRequest, Assignment, Lab, SettingsPatch};
//!
//! let mut lab: Lab = Lab::default();
//! lab.configure(SettingsPatch::default().groups(2));
//!
//! let request = AssignmentRequest::new()
//!     .identity("af4a8646-effa-422b-9152-adc07b0fb625")
//!     .test_name("large logo");
//! let first = lab.assign(&request).unwrap();
//! assert_eq!(lab.assign(&request).unwrap(), first);
//! assert!(matches!(first, Assignment::Bucket(0 | 1)));
//! ```

pub mod args;
pub mod assign;
pub mod config;
pub mod error;
pub mod experiment;
pub mod hasher;
pub mod identity;
pub mod key;
pub mod lab;
pub mod server;
pub mod settings;
pub mod simulate;
pub mod state;
#[cfg(test)]
mod tests;

pub use args::Arg;
pub use assign::{Assignment, AssignmentRequest, Slicing, assign, in_group};
pub use error::{Error, Result};
pub use experiment::{Experiment, Handler, run_experiment};
pub use hasher::{AdditiveHash, HashKind, KeyHasher, Murmur3Hash, Xxh3Hash};
pub use identity::{FileIdentity, IdentityProvider, MemoryIdentity};
pub use key::{KeyPart, build_key};
pub use lab::Lab;
pub use settings::{Settings, SettingsPatch};
