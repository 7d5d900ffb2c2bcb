use super::role::Role;
use serde::{Deserialize, Serialize};
use std::fmt;

// --- Credential ---

/// A live login for one role. At most one exists per role at a time.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub role: Role,
    pub token: String,
    pub subject_id: String,
}

impl Credential {
    pub fn new(role: Role, token: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            role,
            token: token.into(),
            subject_id: subject_id.into(),
        }
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

// Tokens never end up in logs
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("role", &self.role)
            .field("token", &"<redacted>")
            .field("subject_id", &self.subject_id)
            .finish()
    }
}

/// What a role's slot in the session store looked like at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub role: Role,
    pub epoch: u64,
    pub credential: Option<Credential>,
}

impl SessionSnapshot {
    pub fn empty(role: Role, epoch: u64) -> Self {
        Self {
            role,
            epoch,
            credential: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.credential.is_some()
    }
}

// --- Events ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The server rejected the credential (401).
    Rejected,
    /// Explicit logout.
    Logout,
}

/// Signals raised by the gateway. `Ended` is the scoped "session ended" signal:
/// the UI shell drops the role's cached profile and returns to its login entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Started {
        role: Role,
        subject_id: String,
        epoch: u64,
    },
    Ended {
        role: Role,
        epoch: u64,
        reason: EndReason,
    },
}

impl SessionEvent {
    pub fn role(&self) -> Role {
        match self {
            SessionEvent::Started { role, .. } | SessionEvent::Ended { role, .. } => *role,
        }
    }
}
