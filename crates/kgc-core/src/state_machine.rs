//! Clone lifecycle state machine
//!
//! ```text
//! Pending -> Active -> Committed
//!    |         |
//!    +---------+-----> Rejected
//! ```

use crate::error::CloneError;
use crate::model::CloneStatus;

/// Validates a clone status transition.
///
/// Terminal states (`Committed`, `Rejected`) accept nothing. A pending
/// clone may be dropped straight to `Rejected` if registration fails.
pub fn validate_transition(from: CloneStatus, to: CloneStatus) -> Result<(), CloneError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(CloneError::InvalidTransition { from, to })
    }
}

/// Statuses reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: CloneStatus) -> Vec<CloneStatus> {
    use CloneStatus::*;
    match from {
        Pending => vec![Active, Rejected],
        Active => vec![Committed, Rejected],
        Committed => vec![],
        Rejected => vec![],
    }
}

fn allowed(from: CloneStatus, to: CloneStatus) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}
