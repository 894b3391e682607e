//! ActorProvider port - Read-only access to the current acting identity.
//!
//! The unit of work asks this port who is committing, and uses the answer
//! only for audit stamping. HTTP middleware, job runners, or tests decide
//! where the identity comes from.

use crate::domain::foundation::Actor;

/// Port for resolving the current actor.
///
/// Returns `None` when no authenticated caller is present; the unit of work
/// then records the system identity.
pub trait ActorProvider: Send + Sync {
    fn current_actor(&self) -> Option<Actor>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn ActorProvider) {}
}
