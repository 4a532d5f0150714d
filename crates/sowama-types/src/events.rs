use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ClaimStatus, LedgerEntry, TokenValueRecord, WasteTypeRate};

/// Events published by the engine after a change has been committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EngineEvent {
    /// A ledger entry was appended
    EntryRecorded { entry: LedgerEntry, balance: i64 },

    /// A new token value version was appended
    TokenValueUpdated { record: TokenValueRecord },

    /// A waste type received a new rate version
    RateUpdated { rate: WasteTypeRate },

    /// A claim session moved to a new status
    ClaimStatusChanged {
        user_id: String,
        session_id: Uuid,
        status: ClaimStatus,
        message: Option<String>,
    },
}

impl EngineEvent {
    /// Returns the user this event is scoped to.
    /// Events that return `None` are global and go to every subscriber.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::EntryRecorded { entry, .. } => Some(&entry.user_id),
            Self::ClaimStatusChanged { user_id, .. } => Some(user_id),
            Self::TokenValueUpdated { .. } | Self::RateUpdated { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn global_events_have_no_user() {
        let event = EngineEvent::TokenValueUpdated {
            record: TokenValueRecord {
                value: 0.015,
                currency: "USD".into(),
                effective_at: Utc::now(),
                actor: "admin".into(),
            },
        };
        assert!(event.user_id().is_none());
    }

    #[test]
    fn claim_events_are_tagged() {
        let event = EngineEvent::ClaimStatusChanged {
            user_id: "u1".into(),
            session_id: Uuid::nil(),
            status: ClaimStatus::Detected,
            message: None,
        };
        assert_eq!(event.user_id(), Some("u1"));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ClaimStatusChanged");
        assert_eq!(json["data"]["status"], "detected");
    }
}
