//! Request identity for container correlation.

use crate::utils::{generate_uuid, iso_timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one analysis request: one container per request, sharing a
/// session across follow-on requests in the same conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestIdentity {
    /// Unique per request.
    pub request_id: Uuid,
    /// Shared across follow-on requests in a conversation.
    pub session_id: Uuid,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
}

impl RequestIdentity {
    /// Creates a fresh identity with a new session.
    #[must_use]
    pub fn new() -> Self {
        let request_id = generate_uuid();
        Self {
            request_id,
            session_id: request_id,
            created_at: iso_timestamp(),
        }
    }

    /// Creates a fresh request identity within an existing session.
    #[must_use]
    pub fn in_session(session_id: Uuid) -> Self {
        Self {
            request_id: generate_uuid(),
            session_id,
            created_at: iso_timestamp(),
        }
    }
}

impl Default for RequestIdentity {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_identity_session_is_request() {
        let id = RequestIdentity::new();
        assert_eq!(id.request_id, id.session_id);
    }

    #[test]
    fn test_in_session_preserves_session() {
        let first = RequestIdentity::new();
        let followup = RequestIdentity::in_session(first.session_id);
        assert_eq!(followup.session_id, first.session_id);
        assert_ne!(followup.request_id, first.request_id);
    }
}
