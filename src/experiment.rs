use tracing::debug;

use crate::assign::{Assignment, AssignmentRequest, assign, resolve_identity, validate};
use crate::error::{Error, Result};
use crate::identity::IdentityProvider;
use crate::settings::Settings;

/// Outcome handler, called with the resolved identity and its assignment.
pub type Handler<'a, T> = Box<dyn FnOnce(&str, Assignment) -> T + 'a>;

/// A request paired with one handler per bucket and an optional handler for
/// the control population.
pub struct Experiment<'a, T> {
    pub request: AssignmentRequest,
    pub callbacks: Vec<Handler<'a, T>>,
    pub control: Option<Handler<'a, T>>,
}

impl<'a, T> Experiment<'a, T> {
    pub fn new(request: AssignmentRequest) -> Self {
        Self {
            request,
            callbacks: Vec::new(),
            control: None,
        }
    }

    pub fn arm(mut self, handler: impl FnOnce(&str, Assignment) -> T + 'a) -> Self {
        self.callbacks.push(Box::new(handler));
        self
    }

    pub fn control(mut self, handler: impl FnOnce(&str, Assignment) -> T + 'a) -> Self {
        self.control = Some(Box::new(handler));
        self
    }
}

/// Assigns the request and invokes the matching handler.
///
/// The number of callbacks stands in for the default group count while the
/// assignment is computed, so the bucket space follows the handler list. A
/// `groups` value on the request still takes precedence; a bucket beyond the
/// handler list, or control without a control handler, is a
/// [`Error::MissingCallback`].
pub fn run_experiment<T>(
    settings: &mut Settings,
    provider: &dyn IdentityProvider,
    experiment: Experiment<'_, T>,
) -> Result<T> {
    let Experiment {
        mut request,
        callbacks,
        control,
    } = experiment;

    let groups = u32::try_from(callbacks.len())
        .map_err(|_| Error::configuration("too many callbacks"))?;
    let (identity, assignment) = {
        let scoped = settings.override_groups(groups);
        validate(&request, &scoped)?;
        let identity = resolve_identity(request.identity.as_deref(), provider)?;
        request.identity = Some(identity.clone());
        let assignment = assign(&request, &scoped, provider)?;
        (identity, assignment)
    };

    let handler = match assignment {
        Assignment::Control => control,
        Assignment::Bucket(n) => callbacks.into_iter().nth(n as usize),
    };
    let Some(handler) = handler else {
        return Err(Error::MissingCallback { assignment });
    };
    debug!(identity = %identity, assignment = %assignment, "running experiment handler");
    Ok(handler(&identity, assignment))
}
