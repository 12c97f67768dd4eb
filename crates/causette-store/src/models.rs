//! Document models persisted in the shared store.
//!
//! Every struct derives `Serialize` and `Deserialize` with camelCase field
//! names, matching the document-store representation.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use causette_shared::types::{ConversationId, IdentityId, MessageId};
use causette_shared::wire::SealedPayloadWire;

// ---------------------------------------------------------------------------
// Identity directory
// ---------------------------------------------------------------------------

/// Directory entry for a known identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub display_name: Option<String>,
    pub avatar_ref: Option<String>,
    /// Hex-encoded X25519 public key. Append-once: the directory rejects
    /// replacing a published key with a different value.
    pub public_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Denormalized participant metadata kept on the conversation document, so
/// departed members stay renderable after their live profile is out of reach.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSnapshot {
    pub display_name: Option<String>,
    pub avatar_ref: Option<String>,
}

/// The conversation aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDoc {
    pub id: ConversationId,
    pub participants: BTreeSet<IdentityId>,
    /// One base64 wrapped chat key per participant.
    pub wrapped_keys: BTreeMap<IdentityId, String>,
    #[serde(default)]
    pub participant_snapshots: BTreeMap<IdentityId, ParticipantSnapshot>,
    pub created_by: IdentityId,
    pub created_at: DateTime<Utc>,
    /// Sealed preview of the most recent message. Encrypted under the chat
    /// key like a message body; a cleartext preview would hand content to
    /// the store.
    pub last_message: Option<SealedPayloadWire>,
    pub last_activity_at: DateTime<Utc>,
}

impl ConversationDoc {
    /// Usable for messaging only when every participant has a wrapped key
    /// entry and no wrapped key references a departed participant.
    pub fn keys_consistent(&self) -> bool {
        self.participants.len() == self.wrapped_keys.len()
            && self
                .participants
                .iter()
                .all(|p| self.wrapped_keys.contains_key(p))
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single message. Append-only; never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageDoc {
    pub id: MessageId,
    pub sender_id: IdentityId,
    pub payload: SealedPayloadWire,
    pub sent_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Invite
// ---------------------------------------------------------------------------

/// A transient pending-join signal in a target user's queue. Consumed once
/// the target durably records membership, or rejected if the conversation
/// turns out not to include the target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InviteDoc {
    pub conversation_id: ConversationId,
    pub target: IdentityId,
    pub invited_by: IdentityId,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc(participants: &[&str], keys: &[&str]) -> ConversationDoc {
        ConversationDoc {
            id: ConversationId::new(),
            participants: participants.iter().map(|p| IdentityId::from(*p)).collect(),
            wrapped_keys: keys
                .iter()
                .map(|k| (IdentityId::from(*k), "d2s=".to_string()))
                .collect(),
            participant_snapshots: BTreeMap::new(),
            created_by: IdentityId::from(participants[0]),
            created_at: Utc::now(),
            last_message: None,
            last_activity_at: Utc::now(),
        }
    }

    #[test]
    fn test_keys_consistent() {
        assert!(doc(&["a", "b"], &["a", "b"]).keys_consistent());
        assert!(!doc(&["a", "b"], &["a"]).keys_consistent());
        assert!(!doc(&["a"], &["a", "b"]).keys_consistent());
    }

    #[test]
    fn test_conversation_document_form() {
        let d = doc(&["a", "b"], &["a", "b"]);
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.contains("\"wrappedKeys\""));
        assert!(json.contains("\"createdBy\""));
        assert!(json.contains("\"lastActivityAt\""));

        let parsed: ConversationDoc = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, d);
    }
}
