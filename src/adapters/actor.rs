//! Actor providers.
//!
//! - `SystemActor` - Never reports an actor; audit falls back to "System"
//! - `StaticActor` - Always reports the same actor (jobs, tests)
//! - `ScopedActorProvider` - Reads the actor set for the current task
//!
//! # Example
//!
//! ```ignore
//! let actors = Arc::new(ScopedActorProvider);
//! let uow_store = store.clone();
//!
//! with_actor(Actor::authenticated(user.name())?, async move {
//!     let mut uow = UnitOfWork::new(uow_store, actors);
//!     uow.register_modified(&mut order);
//!     uow.commit(&cancel).await
//! })
//! .await?;
//! ```

use std::future::Future;

use crate::domain::foundation::Actor;
use crate::ports::ActorProvider;

tokio::task_local! {
    static CURRENT_ACTOR: Actor;
}

/// Runs `future` with `actor` as the current actor of the task.
pub async fn with_actor<F: Future>(actor: Actor, future: F) -> F::Output {
    CURRENT_ACTOR.scope(actor, future).await
}

/// Provider for background work with no caller identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemActor;

impl ActorProvider for SystemActor {
    fn current_actor(&self) -> Option<Actor> {
        None
    }
}

/// Provider that always reports the same actor.
#[derive(Debug, Clone)]
pub struct StaticActor {
    actor: Actor,
}

impl StaticActor {
    pub fn new(actor: Actor) -> Self {
        Self { actor }
    }
}

impl ActorProvider for StaticActor {
    fn current_actor(&self) -> Option<Actor> {
        Some(self.actor.clone())
    }
}

/// Provider backed by a tokio task-local set with [`with_actor`].
///
/// Outside a `with_actor` scope it reports no actor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopedActorProvider;

impl ActorProvider for ScopedActorProvider {
    fn current_actor(&self) -> Option<Actor> {
        CURRENT_ACTOR.try_with(Actor::clone).ok()
    }
}
