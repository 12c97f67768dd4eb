//! Invite resolution.
//!
//! Conversation creation and invite delivery are separate writes in the
//! store, so a user can observe "I've been invited" before, after, or
//! independently of "the conversation exists with me in it". Resolution is
//! the explicit reconciliation pass that turns that at-least-once, possibly
//! stale signal into an idempotent membership fact: confirm against the
//! authoritative participant set, record membership and consume the invite
//! in one batch -- or consume a stale invite without recording anything.

use tracing::{debug, info};

use causette_shared::types::ConversationId;
use causette_store::{InviteDoc, InviteSubscription, StoreError, WriteBatch, WriteOp};

use crate::error::ClientError;
use crate::session::Session;

/// Outcome of resolving one pending invite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteOutcome {
    /// Membership confirmed and durably recorded; the invite is consumed.
    Accepted,
    /// The conversation no longer names this user (or no longer exists);
    /// the stale invite is consumed without recording membership.
    Rejected,
    /// Membership was already recorded by an earlier observation of the
    /// same signal. Nothing changed.
    AlreadyResolved,
}

impl Session {
    /// The invites currently waiting in this user's queue.
    pub async fn pending_invites(&self) -> Result<Vec<InviteDoc>, ClientError> {
        Ok(self.store.invites(&self.user_id).await?)
    }

    /// Watch this user's invite queue. Caller-owned handle.
    pub async fn subscribe_invites(&self) -> Result<InviteSubscription, ClientError> {
        Ok(self.store.watch_invites(&self.user_id).await?)
    }

    /// Resolve one pending invite against authoritative membership.
    ///
    /// Safe to call any number of times and from concurrent observations of
    /// the same signal: re-resolving is a no-op, never an error.
    pub async fn resolve_invite(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<InviteOutcome, ClientError> {
        let memberships = self.store.memberships(&self.user_id).await?;
        if memberships.contains(conversation_id) {
            // A previous observation already landed the membership; at most
            // a leftover invite remains to be consumed.
            let mut batch = WriteBatch::new();
            batch.push(WriteOp::DeleteInvite {
                conversation_id: *conversation_id,
            });
            self.store.commit(&self.user_id, batch).await?;
            debug!(conversation = %conversation_id, "invite already resolved");
            return Ok(InviteOutcome::AlreadyResolved);
        }

        match self.store.conversation(&self.user_id, conversation_id).await {
            Ok(_) => {
                // The authoritative participant set includes this user:
                // record membership and consume the invite as one unit.
                let mut batch = WriteBatch::new();
                batch.push(WriteOp::AddMembership {
                    conversation_id: *conversation_id,
                });
                batch.push(WriteOp::DeleteInvite {
                    conversation_id: *conversation_id,
                });
                self.store.commit(&self.user_id, batch).await?;
                info!(conversation = %conversation_id, "invite accepted");
                Ok(InviteOutcome::Accepted)
            }
            Err(StoreError::NotFound) | Err(StoreError::PermissionDenied) => {
                // Revoked or re-scoped before this user observed it.
                let mut batch = WriteBatch::new();
                batch.push(WriteOp::DeleteInvite {
                    conversation_id: *conversation_id,
                });
                self.store.commit(&self.user_id, batch).await?;
                info!(conversation = %conversation_id, "stale invite rejected");
                Ok(InviteOutcome::Rejected)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Reconciliation sweep: resolve everything currently in the queue.
    /// Suitable for reconnects, where the store replays invite signals.
    pub async fn resolve_pending_invites(
        &self,
    ) -> Result<Vec<(ConversationId, InviteOutcome)>, ClientError> {
        let mut outcomes = Vec::new();
        for invite in self.pending_invites().await? {
            let outcome = self.resolve_invite(&invite.conversation_id).await?;
            outcomes.push((invite.conversation_id, outcome));
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::messaging::MessageBody;
    use crate::vault::MemoryVault;
    use causette_shared::types::IdentityId;
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
    async fn test_offline_invitee_catches_up_end_to_end() {
        let store = Arc::new(MemoryStore::new());
        let alice = session(&store, "alice").await;
        let bob = session(&store, "bob").await;

        // Alice creates the conversation and messages while Bob is offline.
        let conversation = alice.create_conversation(&id("bob")).await.unwrap();
        alice.send_message(&conversation, "tu es là?").await.unwrap();

        // Bob comes online, observes the invite, resolves it.
        let pending = bob.pending_invites().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].invited_by, id("alice"));

        let outcome = bob.resolve_invite(&conversation).await.unwrap();
        assert_eq!(outcome, InviteOutcome::Accepted);
        assert!(bob.pending_invites().await.unwrap().is_empty());
        assert_eq!(store.memberships(&id("bob")).await.unwrap(), vec![conversation]);

        // Bob unwraps the same chat key and reads Alice's earlier message;
        // Alice reads his reply.
        assert_eq!(
            bob.resolve_chat_key(&conversation).await.unwrap(),
            alice.resolve_chat_key(&conversation).await.unwrap()
        );
        let history = bob.messages(&conversation).await.unwrap();
        assert_eq!(history[0].body, MessageBody::Text("tu es là?".into()));

        bob.send_message(&conversation, "oui!").await.unwrap();
        let alice_view = alice.messages(&conversation).await.unwrap();
        assert_eq!(alice_view[1].body, MessageBody::Text("oui!".into()));
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let alice = session(&store, "alice").await;
        let bob = session(&store, "bob").await;

        let conversation = alice.create_conversation(&id("bob")).await.unwrap();

        assert_eq!(
            bob.resolve_invite(&conversation).await.unwrap(),
            InviteOutcome::Accepted
        );
        // A reconnect replays the same signal.
        assert_eq!(
            bob.resolve_invite(&conversation).await.unwrap(),
            InviteOutcome::AlreadyResolved
        );
        assert_eq!(
            bob.resolve_invite(&conversation).await.unwrap(),
            InviteOutcome::AlreadyResolved
        );

        // No duplicate side effects.
        assert_eq!(store.memberships(&id("bob")).await.unwrap(), vec![conversation]);
        assert!(bob.pending_invites().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_invite_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let alice = session(&store, "alice").await;
        let bob = session(&store, "bob").await;

        let conversation = alice.create_conversation(&id("bob")).await.unwrap();

        // The creator revokes the conversation before Bob observes the
        // invite; his queue still carries the signal.
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::DeleteConversation {
            conversation_id: conversation,
        });
        batch.push(WriteOp::RemoveMembership {
            conversation_id: conversation,
        });
        store.commit(&id("alice"), batch).await.unwrap();

        let outcome = bob.resolve_invite(&conversation).await.unwrap();
        assert_eq!(outcome, InviteOutcome::Rejected);
        assert!(bob.pending_invites().await.unwrap().is_empty());
        assert!(store.memberships(&id("bob")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_resolves_everything_pending() {
        let store = Arc::new(MemoryStore::new());
        let alice = session(&store, "alice").await;
        let carol = session(&store, "carol").await;
        let bob = session(&store, "bob").await;

        let from_alice = alice.create_conversation(&id("bob")).await.unwrap();
        let from_carol = carol.create_conversation(&id("bob")).await.unwrap();

        let outcomes = bob.resolve_pending_invites().await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|(_, o)| *o == InviteOutcome::Accepted));

        let mut memberships = store.memberships(&id("bob")).await.unwrap();
        memberships.sort();
        let mut expected = vec![from_alice, from_carol];
        expected.sort();
        assert_eq!(memberships, expected);
    }

    #[tokio::test]
    async fn test_invite_subscription_sees_new_invites() {
        let store = Arc::new(MemoryStore::new());
        let alice = session(&store, "alice").await;
        let bob = session(&store, "bob").await;

        let mut sub = bob.subscribe_invites().await.unwrap();
        assert!(sub.current().is_empty());

        let conversation = alice.create_conversation(&id("bob")).await.unwrap();
        assert!(sub.changed().await);
        assert_eq!(sub.current()[0].conversation_id, conversation);
        sub.unsubscribe();
    }
}
