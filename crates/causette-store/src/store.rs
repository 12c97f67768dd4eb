//! The [`SharedStore`] trait: everything this layer expects from the
//! shared, eventually-consistent store, expressed at the interface boundary.
//!
//! The store offers no cross-path transactions. Writers that mutate a
//! conversation's membership fields therefore ship every affected path in
//! one [`WriteBatch`], so no reader can observe a participant without their
//! wrapped key or vice versa. Change delivery is push-based: subscriptions
//! hand back snapshots over `tokio::sync::watch` channels and may coalesce
//! or reorder batches, never guaranteeing monotonic delivery.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use causette_shared::types::{ConversationId, IdentityId};
use causette_shared::wire::SealedPayloadWire;

use crate::error::Result;
use crate::models::{ConversationDoc, InviteDoc, MessageDoc, ParticipantSnapshot, UserProfile};

// ---------------------------------------------------------------------------
// Batched writes
// ---------------------------------------------------------------------------

/// A single path write inside a [`WriteBatch`].
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Create a conversation document. The acting user must be the creator
    /// and a member of the participant set, and the wrapped-key map must
    /// cover the participants exactly.
    CreateConversation(ConversationDoc),

    /// Add a conversation to the acting user's membership index.
    AddMembership { conversation_id: ConversationId },

    /// Remove a conversation from the acting user's membership index.
    RemoveMembership { conversation_id: ConversationId },

    /// Write a pending invite to the target's queue. Rejected while an
    /// unconsumed invite for the same conversation exists.
    PutInvite(InviteDoc),

    /// Consume (delete) an invite from the acting user's own queue.
    /// Removing an invite that is already gone is a no-op.
    DeleteInvite { conversation_id: ConversationId },

    /// Remove the acting user from a conversation's participant set and
    /// wrapped-key map in one step, recording a profile snapshot first if
    /// none exists. Skipped without error when the conversation has already
    /// been deleted by a concurrent leave.
    RemoveParticipant {
        conversation_id: ConversationId,
        snapshot: Option<ParticipantSnapshot>,
    },

    /// Delete a conversation document and purge all of its messages.
    /// Skipped without error when the conversation is already gone.
    DeleteConversation { conversation_id: ConversationId },

    /// Append a message and refresh the conversation's sealed preview and
    /// activity timestamp.
    AppendMessage {
        conversation_id: ConversationId,
        message: MessageDoc,
        preview: Option<SealedPayloadWire>,
    },
}

/// A multi-path write applied as a single unit.
///
/// Validation runs before any op is applied: either the whole batch lands
/// or none of it does.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

/// Live view of a user's membership index.
///
/// Owned by the caller; detach with [`unsubscribe`](Self::unsubscribe) or by
/// dropping the handle. No ambient registry keeps it alive.
pub struct MembershipSubscription {
    pub(crate) rx: watch::Receiver<Vec<ConversationId>>,
}

impl MembershipSubscription {
    /// Wait for the next change. Returns `false` once the store is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    pub fn current(&self) -> Vec<ConversationId> {
        self.rx.borrow().clone()
    }

    pub fn unsubscribe(self) {}
}

/// Live view of a user's pending invite queue.
pub struct InviteSubscription {
    pub(crate) rx: watch::Receiver<Vec<InviteDoc>>,
}

impl InviteSubscription {
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    pub fn current(&self) -> Vec<InviteDoc> {
        self.rx.borrow().clone()
    }

    pub fn unsubscribe(self) {}
}

/// Live view of a conversation's messages.
///
/// Batches may arrive unordered or coalesced; consumers re-sort by `sentAt`
/// after every delivery.
pub struct MessageSubscription {
    pub(crate) rx: watch::Receiver<Vec<MessageDoc>>,
}

impl MessageSubscription {
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    pub fn current(&self) -> Vec<MessageDoc> {
        self.rx.borrow().clone()
    }

    pub fn unsubscribe(self) {}
}

// ---------------------------------------------------------------------------
// The store boundary
// ---------------------------------------------------------------------------

/// The shared store, as seen by one acting user at a time.
///
/// Access control lives at this boundary: participant-gated conversation and
/// message access, owner-only membership indexes and preference documents,
/// target-only invite consumption, append-once public keys.
#[async_trait]
pub trait SharedStore: Send + Sync {
    // -- identity directory --

    async fn profile(&self, id: &IdentityId) -> Result<UserProfile>;

    async fn upsert_profile(
        &self,
        id: &IdentityId,
        display_name: Option<String>,
        avatar_ref: Option<String>,
    ) -> Result<()>;

    /// First write wins. Re-publishing the identical value is a no-op;
    /// publishing a different value fails with
    /// [`StoreError::KeyAlreadyPublished`](crate::StoreError::KeyAlreadyPublished).
    async fn publish_public_key(&self, id: &IdentityId, public_key_hex: &str) -> Result<()>;

    async fn published_public_key(&self, id: &IdentityId) -> Result<Option<String>>;

    // -- conversations --

    /// Readable only by current participants.
    async fn conversation(
        &self,
        acting: &IdentityId,
        id: &ConversationId,
    ) -> Result<ConversationDoc>;

    // -- messages --

    /// Readable only by current participants of the owning conversation.
    async fn messages(&self, acting: &IdentityId, id: &ConversationId) -> Result<Vec<MessageDoc>>;

    // -- membership index --

    async fn memberships(&self, user: &IdentityId) -> Result<Vec<ConversationId>>;

    // -- invite queue --

    async fn invites(&self, target: &IdentityId) -> Result<Vec<InviteDoc>>;

    // -- blocked set / cleared markers (private to the owning user) --

    async fn blocked_set(&self, user: &IdentityId) -> Result<BTreeSet<IdentityId>>;

    async fn set_blocked(&self, user: &IdentityId, other: &IdentityId, blocked: bool)
        -> Result<()>;

    /// Narrow either-direction relation check, the only view of another
    /// user's blocked set the authorization layer exposes. Used to gate
    /// conversation creation.
    async fn is_blocked_either(&self, a: &IdentityId, b: &IdentityId) -> Result<bool>;

    async fn cleared_marker(
        &self,
        user: &IdentityId,
        id: &ConversationId,
    ) -> Result<Option<DateTime<Utc>>>;

    async fn set_cleared_marker(
        &self,
        user: &IdentityId,
        id: &ConversationId,
        at: DateTime<Utc>,
    ) -> Result<()>;

    // -- batched writes --

    /// Apply a multi-path batch as one unit on behalf of `acting`.
    async fn commit(&self, acting: &IdentityId, batch: WriteBatch) -> Result<()>;

    // -- subscriptions --

    async fn watch_memberships(&self, user: &IdentityId) -> Result<MembershipSubscription>;

    async fn watch_invites(&self, target: &IdentityId) -> Result<InviteSubscription>;

    async fn watch_messages(
        &self,
        acting: &IdentityId,
        id: &ConversationId,
    ) -> Result<MessageSubscription>;
}
