//! Caller identity for API and scheduler entry points.

use serde::{Deserialize, Serialize};

/// Who is asking for work to be done.
///
/// Every pipeline entry point takes an [`Actor`] so stored leads are always
/// attributed to a user, whether the trigger was an interactive session or
/// the background scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    /// An interactive session acting on its own mailbox.
    Session { user_id: String },
    /// A trusted service (the scheduler) acting on a user's behalf.
    Service { user_id: String },
}

impl Actor {
    pub fn session(user_id: impl Into<String>) -> Self {
        Self::Session {
            user_id: user_id.into(),
        }
    }

    pub fn service(user_id: impl Into<String>) -> Self {
        Self::Service {
            user_id: user_id.into(),
        }
    }

    /// The user this actor operates for.
    pub fn user_id(&self) -> &str {
        match self {
            Self::Session { user_id } | Self::Service { user_id } => user_id,
        }
    }
}
