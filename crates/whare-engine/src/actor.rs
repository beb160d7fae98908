//! Actors and roles

use serde::{Deserialize, Serialize};
use std::fmt;
use whare_registry::Did;

/// Dashboard role of the acting user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Anonymous visitor
    Public,
    /// Applicant on the waitlist
    Waitlisted,
    /// Housed beneficiary
    Beneficiary,
    /// Community housing provider
    Chp,
}

impl Role {
    /// Check if the role manages properties and offers
    #[inline]
    #[must_use]
    pub fn is_provider(self) -> bool {
        matches!(self, Self::Chp)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Public => "public",
            Self::Waitlisted => "waitlisted",
            Self::Beneficiary => "beneficiary",
            Self::Chp => "chp",
        })
    }
}

/// Who is acting, passed with every command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    /// Acting identity
    pub actor: Did,
    /// Acting role
    pub role: Role,
}

impl ActorContext {
    /// Create context
    #[inline]
    #[must_use]
    pub fn new(actor: impl Into<Did>, role: Role) -> Self {
        Self {
            actor: actor.into(),
            role,
        }
    }

    /// Housing provider context
    #[inline]
    #[must_use]
    pub fn chp(actor: impl Into<Did>) -> Self {
        Self::new(actor, Role::Chp)
    }

    /// Waitlisted applicant context
    #[inline]
    #[must_use]
    pub fn applicant(actor: impl Into<Did>) -> Self {
        Self::new(actor, Role::Waitlisted)
    }
}
