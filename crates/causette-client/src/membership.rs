//! Membership lifecycle: derived state, blocking, history clearing, leaving.
//!
//! State is never stored directly; it is recomputed from three independent
//! facts -- the conversation's participant set, the user's blocked set, and
//! the user's cleared marker. Blocking and clearing are reversible and
//! per-user; leaving is terminal, and the last leaver takes the
//! conversation and its messages with them.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use causette_shared::types::{ConversationId, IdentityId};
use causette_store::{ParticipantSnapshot, StoreError, WriteBatch, WriteOp};

use crate::error::ClientError;
use crate::session::Session;

/// Derived per-user, per-conversation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipState {
    /// Member, no block in either direction: messaging enabled.
    Active,
    /// A block holds between this user and another participant. The
    /// conversation is hidden, not deleted; unblock restores it.
    Blocked,
    /// This user left; the conversation lives on for the others.
    Left,
    /// The conversation no longer exists.
    Deleted,
}

impl Session {
    /// Recompute this user's state for a conversation.
    pub async fn membership_state(
        &self,
        id: &ConversationId,
    ) -> Result<MembershipState, ClientError> {
        let doc = match self.store.conversation(&self.user_id, id).await {
            Ok(doc) => doc,
            Err(StoreError::NotFound) => return Ok(MembershipState::Deleted),
            Err(StoreError::PermissionDenied) => return Ok(MembershipState::Left),
            Err(err) => return Err(err.into()),
        };

        for peer in doc.participants.iter().filter(|p| **p != self.user_id) {
            if self.store.is_blocked_either(&self.user_id, peer).await? {
                return Ok(MembershipState::Blocked);
            }
        }
        Ok(MembershipState::Active)
    }

    /// Block another user. Shared conversations disappear from this user's
    /// visible list; nothing is deleted.
    pub async fn block(&self, other: &IdentityId) -> Result<(), ClientError> {
        self.store.set_blocked(&self.user_id, other, true).await?;
        info!(blocked = %other, "user blocked");
        Ok(())
    }

    /// Reverse a block; hidden conversations become visible again,
    /// unchanged.
    pub async fn unblock(&self, other: &IdentityId) -> Result<(), ClientError> {
        self.store.set_blocked(&self.user_id, other, false).await?;
        info!(unblocked = %other, "user unblocked");
        Ok(())
    }

    /// Clear history for this user only: messages sent at or before the
    /// marker stop rendering here, and nowhere else. Returns the marker.
    pub async fn clear_history(
        &self,
        id: &ConversationId,
    ) -> Result<DateTime<Utc>, ClientError> {
        let marker = Utc::now();
        self.store
            .set_cleared_marker(&self.user_id, id, marker)
            .await?;
        info!(conversation = %id, marker = %marker, "history cleared");
        Ok(marker)
    }

    /// Leave a conversation.
    ///
    /// A non-final leave snapshots this user's profile into the document
    /// (first departure only) and removes the participant entry and
    /// wrapped key together, in one batch with the membership-index
    /// removal. The last leaver instead purges the conversation and all of
    /// its messages. A conversation already deleted by a concurrent leave
    /// is a no-op success: the desired end state holds.
    pub async fn leave(&self, id: &ConversationId) -> Result<(), ClientError> {
        let mut batch = WriteBatch::new();

        match self.store.conversation(&self.user_id, id).await {
            Ok(doc) => {
                if doc.participants.len() <= 1 {
                    batch.push(WriteOp::DeleteConversation {
                        conversation_id: *id,
                    });
                } else {
                    let snapshot = if doc.participant_snapshots.contains_key(&self.user_id) {
                        None
                    } else {
                        let profile = self.store.profile(&self.user_id).await.unwrap_or_default();
                        Some(ParticipantSnapshot {
                            display_name: profile.display_name,
                            avatar_ref: profile.avatar_ref,
                        })
                    };
                    batch.push(WriteOp::RemoveParticipant {
                        conversation_id: *id,
                        snapshot,
                    });
                }
                info!(conversation = %id, last_leaver = doc.participants.len() <= 1, "leaving conversation");
            }
            Err(StoreError::NotFound) | Err(StoreError::PermissionDenied) => {
                debug!(conversation = %id, "conversation already gone, cleaning up index");
            }
            Err(err) => return Err(err.into()),
        }

        batch.push(WriteOp::RemoveMembership {
            conversation_id: *id,
        });
        self.store.commit(&self.user_id, batch).await?;

        self.chat_keys.lock().await.remove(id);
        let mut active = self.active.lock().await;
        if active.as_ref().is_some_and(|a| a.id == *id) {
            if let Some(previous) = active.take() {
                previous.detach();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::messaging::MessageBody;
    use crate::vault::MemoryVault;
    use causette_store::{MemoryStore, SharedStore};

    fn id(s: &str) -> IdentityId {
        IdentityId::from(s)
    }

    async fn session(store: &Arc<MemoryStore>, name: &str) -> Session {
        Session::create_identity(
            store.clone(),
            Arc::new(MemoryVault::new()),
            id(name),
            Some(name.to_string()),
            None,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_clear_is_local_to_one_user() {
        let store = Arc::new(MemoryStore::new());
        let alice = session(&store, "alice").await;
        let bob = session(&store, "bob").await;

        let conversation = alice.create_conversation(&id("bob")).await.unwrap();
        alice.send_message(&conversation, "avant").await.unwrap();
        bob.send_message(&conversation, "avant aussi").await.unwrap();

        alice.clear_history(&conversation).await.unwrap();
        bob.send_message(&conversation, "après").await.unwrap();

        let alice_view = alice.messages(&conversation).await.unwrap();
        assert_eq!(alice_view.len(), 1);
        assert_eq!(alice_view[0].body, MessageBody::Text("après".into()));

        // Bob's view of the same conversation is untouched.
        let bob_view = bob.messages(&conversation).await.unwrap();
        assert_eq!(bob_view.len(), 3);
    }

    #[tokio::test]
    async fn test_block_hides_without_deleting() {
        let store = Arc::new(MemoryStore::new());
        let alice = session(&store, "alice").await;
        let _bob = session(&store, "bob").await;

        let conversation = alice.create_conversation(&id("bob")).await.unwrap();
        alice.send_message(&conversation, "bonjour").await.unwrap();

        alice.block(&id("bob")).await.unwrap();
        assert!(alice.conversations().await.unwrap().is_empty());
        assert_eq!(
            alice.membership_state(&conversation).await.unwrap(),
            MembershipState::Blocked
        );

        alice.unblock(&id("bob")).await.unwrap();
        let list = alice.conversations().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, conversation);

        // The data survived the round trip.
        assert_eq!(alice.messages(&conversation).await.unwrap().len(), 1);
        assert_eq!(
            alice.membership_state(&conversation).await.unwrap(),
            MembershipState::Active
        );
    }

    #[tokio::test]
    async fn test_partial_leave_keeps_conversation_for_the_other() {
        let store = Arc::new(MemoryStore::new());
        let alice = session(&store, "alice").await;
        let bob = session(&store, "bob").await;

        let conversation = alice.create_conversation(&id("bob")).await.unwrap();
        alice.send_message(&conversation, "au revoir").await.unwrap();
        alice.leave(&conversation).await.unwrap();

        assert!(store.memberships(&id("alice")).await.unwrap().is_empty());
        assert_eq!(
            alice.membership_state(&conversation).await.unwrap(),
            MembershipState::Left
        );

        let doc = store.conversation(&id("bob"), &conversation).await.unwrap();
        assert_eq!(doc.participants.len(), 1);
        assert!(doc.participants.contains(&id("bob")));
        assert!(!doc.wrapped_keys.contains_key(&id("alice")));
        assert!(doc.keys_consistent());
        // The departure snapshot keeps Alice renderable for Bob.
        assert_eq!(
            doc.participant_snapshots[&id("alice")].display_name.as_deref(),
            Some("alice")
        );

        // Bob still reads the history.
        assert_eq!(bob.messages(&conversation).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_last_leaver_purges_everything() {
        let store = Arc::new(MemoryStore::new());
        let alice = session(&store, "alice").await;
        let bob = session(&store, "bob").await;

        let conversation = alice.create_conversation(&id("bob")).await.unwrap();
        alice.send_message(&conversation, "éphémère").await.unwrap();

        alice.leave(&conversation).await.unwrap();
        bob.leave(&conversation).await.unwrap();

        assert!(matches!(
            store.conversation(&id("bob"), &conversation).await,
            Err(StoreError::NotFound)
        ));
        assert_eq!(
            bob.membership_state(&conversation).await.unwrap(),
            MembershipState::Deleted
        );
        assert!(store.memberships(&id("bob")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_leave_after_concurrent_deletion_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let alice = session(&store, "alice").await;
        let bob = session(&store, "bob").await;

        let conversation = alice.create_conversation(&id("bob")).await.unwrap();
        alice.leave(&conversation).await.unwrap();
        bob.leave(&conversation).await.unwrap();

        // Replayed leave against a purged conversation: the end state
        // already holds, so this succeeds without side effects.
        alice.leave(&conversation).await.unwrap();
        bob.leave(&conversation).await.unwrap();
    }

    #[tokio::test]
    async fn test_leave_detaches_active_conversation() {
        let store = Arc::new(MemoryStore::new());
        let alice = session(&store, "alice").await;
        let _bob = session(&store, "bob").await;

        let conversation = alice.create_conversation(&id("bob")).await.unwrap();
        alice.activate(conversation).await.unwrap();

        alice.leave(&conversation).await.unwrap();
        assert!(alice.active_id().await.is_none());
    }

    #[tokio::test]
    async fn test_leave_without_profile_records_empty_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let alice = session(&store, "alice").await;
        let _bob = session(&store, "bob").await;

        let conversation = alice.create_conversation(&id("bob")).await.unwrap();

        // No directory profile: created_identity wrote one, wipe it to
        // simulate an identity with nothing published but the key.
        store.upsert_profile(&id("alice"), None, None).await.unwrap();
        alice.leave(&conversation).await.unwrap();

        let doc = store.conversation(&id("bob"), &conversation).await.unwrap();
        let snapshot = &doc.participant_snapshots[&id("alice")];
        assert!(snapshot.display_name.is_none());
        assert!(snapshot.avatar_ref.is_none());
    }
}
