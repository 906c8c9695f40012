use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::hasher::KeyHasher;
use crate::identity::IdentityProvider;
use crate::key::build_key;
use crate::settings::Settings;

/// Outcome of bucketing one identity for one experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Assignment {
    /// One of the experiment arms, in `[0, groups)`.
    Bucket(u32),
    /// Excluded by the subset or slice filter.
    Control,
}

impl Assignment {
    pub fn bucket(self) -> Option<u32> {
        match self {
            Assignment::Bucket(n) => Some(n),
            Assignment::Control => None,
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, Assignment::Control)
    }

    /// Numeric form used by external tooling: the bucket, or `-1` for control.
    pub fn as_i64(self) -> i64 {
        self.bucket().map_or(-1, i64::from)
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assignment::Bucket(n) => write!(f, "bucket {n}"),
            Assignment::Control => f.write_str("control"),
        }
    }
}

/// Partition of the population into `slices` disjoint cohorts, of which only
/// `slice` takes part in the experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slicing {
    slices: u32,
    slice: u32,
}

impl Slicing {
    pub fn new(slices: u32, slice: u32) -> Result<Self> {
        if slices == 0 {
            return Err(Error::configuration("slices must be at least 1"));
        }
        if slice >= slices {
            return Err(Error::configuration(format!(
                "slice {slice} is outside 0..{slices}"
            )));
        }
        Ok(Self { slices, slice })
    }

    pub fn slices(self) -> u32 {
        self.slices
    }

    pub fn slice(self) -> u32 {
        self.slice
    }

    pub fn admits(self, key_value: u64) -> bool {
        key_value % u64::from(self.slices) == u64::from(self.slice)
    }
}

/// Everything needed to bucket one identity. Built per call and consumed by
/// [`assign`]; fields left as `None` fall back to [`Settings`].
#[derive(Clone, Default)]
pub struct AssignmentRequest {
    pub identity: Option<String>,
    pub test_name: Option<String>,
    pub groups: Option<u32>,
    pub subset: Option<u8>,
    pub slicing: Option<Slicing>,
    pub hasher: Option<Arc<dyn KeyHasher>>,
}

impl AssignmentRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn test_name(mut self, name: impl Into<String>) -> Self {
        self.test_name = Some(name.into());
        self
    }

    pub fn groups(mut self, groups: u32) -> Self {
        self.groups = Some(groups);
        self
    }

    pub fn subset(mut self, percent: u8) -> Self {
        self.subset = Some(percent);
        self
    }

    pub fn slicing(mut self, slicing: Slicing) -> Self {
        self.slicing = Some(slicing);
        self
    }

    pub fn hasher(mut self, hasher: impl KeyHasher + 'static) -> Self {
        self.hasher = Some(Arc::new(hasher));
        self
    }

    pub fn shared_hasher(mut self, hasher: Arc<dyn KeyHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }
}

impl fmt::Debug for AssignmentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssignmentRequest")
            .field("identity", &self.identity)
            .field("test_name", &self.test_name)
            .field("groups", &self.groups)
            .field("subset", &self.subset)
            .field("slicing", &self.slicing)
            .field("hasher", &self.hasher.as_ref().map(|h| h.name()))
            .finish()
    }
}

/// Validated bucketing parameters.
#[derive(Debug, Clone, Copy)]
struct Plan {
    groups: u32,
    subset: Option<u8>,
    slicing: Option<Slicing>,
}

impl Plan {
    fn resolve(request: &AssignmentRequest, settings: &Settings) -> Result<Self> {
        let groups = request
            .groups
            .or(settings.groups)
            .ok_or_else(|| Error::configuration("group count is not configured"))?;
        if groups == 0 {
            return Err(Error::configuration("group count must be at least 1"));
        }
        if let Some(subset) = request.subset {
            if subset > 100 {
                return Err(Error::configuration(format!(
                    "subset {subset}% is outside 0..=100"
                )));
            }
        }
        Ok(Self {
            groups,
            subset: request.subset,
            slicing: request.slicing,
        })
    }

    /// Subset filter, then slice filter, then modulo distribution.
    fn place(&self, key_value: u64) -> Assignment {
        if let Some(subset) = self.subset {
            if key_value % 100 > u64::from(subset) {
                return Assignment::Control;
            }
        }
        if let Some(slicing) = self.slicing {
            if !slicing.admits(key_value) {
                return Assignment::Control;
            }
        }
        Assignment::Bucket((key_value % u64::from(self.groups)) as u32)
    }
}

/// Checks group count, subset and slicing without touching the identity.
pub(crate) fn validate(request: &AssignmentRequest, settings: &Settings) -> Result<()> {
    Plan::resolve(request, settings).map(|_| ())
}

/// Returns the explicit identity when non-empty, else asks the provider.
pub(crate) fn resolve_identity(
    explicit: Option<&str>,
    provider: &dyn IdentityProvider,
) -> Result<String> {
    if let Some(id) = explicit.filter(|id| !id.is_empty()) {
        return Ok(id.to_owned());
    }
    let id = provider.resolve()?;
    if id.is_empty() {
        return Err(Error::identity("provider returned an empty identity"));
    }
    Ok(id)
}

/// Buckets the request's identity.
///
/// Parameters are validated before the identity provider is consulted, so a
/// misconfigured request never causes an identity to be issued.
pub fn assign(
    request: &AssignmentRequest,
    settings: &Settings,
    provider: &dyn IdentityProvider,
) -> Result<Assignment> {
    let plan = Plan::resolve(request, settings)?;
    let identity = resolve_identity(request.identity.as_deref(), provider)?;
    let key = build_key(&[identity.into(), request.test_name.as_deref().into()]);

    let hasher = request.hasher.as_ref().unwrap_or(&settings.hasher);
    let value = hasher.hash(&key);
    let key_value =
        u64::try_from(value).map_err(|_| Error::HashFunction { key: key.clone(), value })?;

    let assignment = plan.place(key_value);
    debug!(
        key = %key,
        key_value,
        hasher = hasher.name(),
        groups = plan.groups,
        assignment = %assignment,
        "assigned"
    );
    Ok(assignment)
}

/// True when the request lands in `bucket`.
pub fn in_group(
    bucket: u32,
    request: &AssignmentRequest,
    settings: &Settings,
    provider: &dyn IdentityProvider,
) -> Result<bool> {
    Ok(assign(request, settings, provider)? == Assignment::Bucket(bucket))
}
