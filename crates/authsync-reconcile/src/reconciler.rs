//! The transition state machine: prior snapshot + probe result → one
//! event and one store instruction.

use authsync_protocol::{AuthSnapshot, ProbeResult, TransitionEvent, TransitionKind};

/// What the store should do after a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    /// Leave storage alone.
    Keep,
    /// Overwrite with this snapshot.
    Save(AuthSnapshot),
    /// Remove the snapshot (logged out).
    Clear,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The probe failed. No event, no write; the prior snapshot stands.
    Skip,
    /// Publish `event`, then apply `write`.
    Apply { event: TransitionEvent, write: StoreWrite },
}

impl Reconciliation {
    /// The event to publish, if any.
    pub fn event(&self) -> Option<&TransitionEvent> {
        match self {
            Self::Skip => None,
            Self::Apply { event, .. } => Some(event),
        }
    }
}

/// Classifies a probe result against the prior snapshot.
///
/// | prior | probe | kind | write |
/// |---|---|---|---|
/// | any | failed | (none) | (skip) |
/// | none | unauthenticated | `Unchanged` | keep |
/// | none | user U | `Login` | save U |
/// | U | unauthenticated | `Logout` | clear |
/// | U1 | user U2, different id | `UserSwitch` | save U2 |
/// | U | user U, same id | `Unchanged` | save (refresh) |
///
/// Identity is `user_id` alone. A same-user probe with a new display name
/// or avatar is still `Unchanged`, but the new fields are saved.
pub fn reconcile(previous: Option<&AuthSnapshot>, probe: &ProbeResult) -> Reconciliation {
    let (kind, write) = match (previous, probe) {
        (_, ProbeResult::Failed(_)) => return Reconciliation::Skip,
        (None, ProbeResult::Unauthenticated) => (TransitionKind::Unchanged, StoreWrite::Keep),
        (None, ProbeResult::Authenticated(next)) => {
            (TransitionKind::Login, StoreWrite::Save(next.clone()))
        }
        (Some(_), ProbeResult::Unauthenticated) => (TransitionKind::Logout, StoreWrite::Clear),
        (Some(prev), ProbeResult::Authenticated(next)) if prev.same_user(next) => {
            (TransitionKind::Unchanged, StoreWrite::Save(next.clone()))
        }
        (Some(_), ProbeResult::Authenticated(next)) => {
            (TransitionKind::UserSwitch, StoreWrite::Save(next.clone()))
        }
    };

    let current = match &write {
        StoreWrite::Save(snap) => Some(snap.clone()),
        StoreWrite::Clear => None,
        StoreWrite::Keep => previous.cloned(),
    };

    Reconciliation::Apply {
        event: TransitionEvent {
            kind,
            previous: previous.cloned(),
            current,
        },
        write,
    }
}
