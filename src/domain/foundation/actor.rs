//! Acting identity for audit stamping.
//!
//! An `Actor` is whoever caused the current unit of work: usually the
//! authenticated user of a request, otherwise the system itself (background
//! jobs, event handlers reacting to other events).

use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Name recorded when no authenticated actor is present.
pub const SYSTEM_ACTOR: &str = "System";

/// Identity of the caller, as reported by an `ActorProvider`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    name: String,
    authenticated: bool,
}

impl Actor {
    /// Creates an authenticated actor.
    ///
    /// # Errors
    ///
    /// Returns `EmptyField` if the name is blank.
    pub fn authenticated(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::empty_field("actor"));
        }
        Ok(Self {
            name,
            authenticated: true,
        })
    }

    /// Creates an anonymous caller (known name, not authenticated).
    pub fn anonymous(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            authenticated: false,
        }
    }

    /// Returns the raw actor name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the identity was established by authentication.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Name to write into audit fields for an optional actor.
    ///
    /// Anything other than an authenticated, non-blank identity is recorded
    /// as [`SYSTEM_ACTOR`].
    pub fn audit_name(actor: Option<&Actor>) -> &str {
        match actor {
            Some(a) if a.authenticated && !a.name.trim().is_empty() => &a.name,
            _ => SYSTEM_ACTOR,
        }
    }
}
