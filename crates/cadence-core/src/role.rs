//! Execution context roles.

use serde::{Deserialize, Serialize};

/// Role an execution context plays. Closed set: every consumer matches it
/// exhaustively, so adding a role is a compile error until each one is
/// updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Near display-refresh cadence; owns the detached surface.
    Rendering,
    /// Coarse cadence; owns no surface.
    Simulation,
}

impl Role {
    /// All roles, in descriptor order.
    pub fn all() -> &'static [Role] {
        &[Role::Rendering, Role::Simulation]
    }

    /// Whether this role takes exclusive ownership of a surface.
    pub fn takes_surface(self) -> bool {
        match self {
            Self::Rendering => true,
            Self::Simulation => false,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rendering => write!(f, "Rendering"),
            Self::Simulation => write!(f, "Simulation"),
        }
    }
}
