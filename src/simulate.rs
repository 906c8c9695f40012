use serde::Serialize;

use crate::assign::{Assignment, AssignmentRequest, assign};
use crate::error::Result;
use crate::identity::RequireExplicit;
use crate::settings::Settings;

/// Assignment counts over a population of identities.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Distribution {
    pub samples: u64,
    pub control: u64,
    /// Count per bucket, indexed by bucket number.
    pub buckets: Vec<u64>,
}

impl Distribution {
    pub fn record(&mut self, assignment: Assignment) {
        self.samples += 1;
        match assignment {
            Assignment::Control => self.control += 1,
            Assignment::Bucket(n) => {
                let n = n as usize;
                if self.buckets.len() <= n {
                    self.buckets.resize(n + 1, 0);
                }
                self.buckets[n] += 1;
            }
        }
    }

    /// Fraction of all samples that landed in `assignment`.
    pub fn share(&self, assignment: Assignment) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        let count = match assignment {
            Assignment::Control => self.control,
            Assignment::Bucket(n) => self.buckets.get(n as usize).copied().unwrap_or(0),
        };
        count as f64 / self.samples as f64
    }
}

/// Assigns every identity with the parameters of `template` and tallies the
/// results. The template's own identity, if any, is ignored.
pub fn simulate<I>(
    template: &AssignmentRequest,
    settings: &Settings,
    identities: I,
) -> Result<Distribution>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let mut distribution = Distribution::default();
    let mut request = template.clone();
    for identity in identities {
        request.identity = Some(identity.into());
        distribution.record(assign(&request, settings, &RequireExplicit)?);
    }
    Ok(distribution)
}
