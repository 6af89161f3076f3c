use serde::{Deserialize, Serialize};

/// Operator role, as reported by the external authentication collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Operator,
}

/// Authentication state consumed by the core. The core holds no auth logic
/// of its own; this is the boolean gate plus role flag the session
/// component hands over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub authenticated: bool,
    pub role: Role,
}

impl Session {
    pub fn admin() -> Self {
        Self {
            authenticated: true,
            role: Role::Admin,
        }
    }

    pub fn operator() -> Self {
        Self {
            authenticated: true,
            role: Role::Operator,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            authenticated: false,
            role: Role::Operator,
        }
    }
}
