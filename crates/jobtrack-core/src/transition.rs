use crate::error::TransitionError;
use crate::types::TaskStatus;

/// Validates a status transition.
///
/// Staying in the same status is always accepted. Terminal statuses have no
/// outgoing edges.
pub fn validate_transition(from: TaskStatus, to: TaskStatus) -> Result<(), TransitionError> {
    if from == to || allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

/// Statuses reachable in one step from `from`.
#[must_use]
pub fn allowed_transitions(from: TaskStatus) -> &'static [TaskStatus] {
    use TaskStatus::{Completed, Failed, Processing, Queued};
    match from {
        Queued => &[Processing, Completed, Failed],
        Processing => &[Completed, Failed],
        Completed | Failed => &[],
    }
}
