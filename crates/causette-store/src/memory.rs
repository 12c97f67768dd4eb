//! In-process store backend.
//!
//! [`MemoryStore`] implements [`SharedStore`] over plain maps guarded by one
//! `tokio::sync::RwLock`. It enforces the same access rules a production
//! deployment delegates to the store's security layer, so tests exercise the
//! real contract: participant-gated reads, owner-only indexes, append-once
//! public keys, target-only invite consumption, sender-id matching.
//!
//! Batches are validated in full before anything is applied; a reader can
//! never observe a half-applied membership mutation. Removal ops whose
//! target is already gone are skipped rather than failed: the writer's
//! desired end state already holds.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::{watch, RwLock};
use tracing::debug;

use async_trait::async_trait;

use causette_shared::types::{ConversationId, IdentityId};

use crate::error::{Result, StoreError};
use crate::models::{ConversationDoc, InviteDoc, MessageDoc, UserProfile};
use crate::store::{
    InviteSubscription, MembershipSubscription, MessageSubscription, SharedStore, WriteBatch,
    WriteOp,
};

#[derive(Default)]
struct Inner {
    profiles: HashMap<IdentityId, UserProfile>,
    conversations: HashMap<ConversationId, ConversationDoc>,
    messages: HashMap<ConversationId, Vec<MessageDoc>>,
    memberships: HashMap<IdentityId, BTreeSet<ConversationId>>,
    invites: HashMap<IdentityId, BTreeMap<ConversationId, InviteDoc>>,
    blocked: HashMap<IdentityId, BTreeSet<IdentityId>>,
    cleared: HashMap<IdentityId, HashMap<ConversationId, DateTime<Utc>>>,

    membership_watch: HashMap<IdentityId, watch::Sender<Vec<ConversationId>>>,
    invite_watch: HashMap<IdentityId, watch::Sender<Vec<InviteDoc>>>,
    message_watch: HashMap<ConversationId, watch::Sender<Vec<MessageDoc>>>,
}

impl Inner {
    fn membership_snapshot(&self, user: &IdentityId) -> Vec<ConversationId> {
        self.memberships
            .get(user)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    fn invite_snapshot(&self, user: &IdentityId) -> Vec<InviteDoc> {
        self.invites
            .get(user)
            .map(|q| q.values().cloned().collect())
            .unwrap_or_default()
    }

    fn message_snapshot(&self, id: &ConversationId) -> Vec<MessageDoc> {
        self.messages.get(id).cloned().unwrap_or_default()
    }

    fn require_participant(&self, acting: &IdentityId, id: &ConversationId) -> Result<&ConversationDoc> {
        let doc = self.conversations.get(id).ok_or(StoreError::NotFound)?;
        if !doc.participants.contains(acting) {
            return Err(StoreError::PermissionDenied);
        }
        Ok(doc)
    }

    fn validate(&self, acting: &IdentityId, op: &WriteOp) -> Result<()> {
        match op {
            WriteOp::CreateConversation(doc) => {
                if doc.created_by != *acting {
                    return Err(StoreError::PermissionDenied);
                }
                if !doc.participants.contains(acting) {
                    return Err(StoreError::PreconditionFailed(
                        "creator not in participant set",
                    ));
                }
                if self.conversations.contains_key(&doc.id) {
                    return Err(StoreError::PreconditionFailed("conversation already exists"));
                }
                if !doc.keys_consistent() {
                    return Err(StoreError::PreconditionFailed(
                        "wrapped keys do not cover participants",
                    ));
                }
                Ok(())
            }
            WriteOp::PutInvite(invite) => {
                if invite.invited_by != *acting || invite.target == *acting {
                    return Err(StoreError::PermissionDenied);
                }
                let pending = self
                    .invites
                    .get(&invite.target)
                    .is_some_and(|q| q.contains_key(&invite.conversation_id));
                if pending {
                    return Err(StoreError::InvitePending);
                }
                Ok(())
            }
            WriteOp::AppendMessage {
                conversation_id,
                message,
                ..
            } => {
                self.require_participant(acting, conversation_id)?;
                if message.sender_id != *acting {
                    return Err(StoreError::SenderMismatch);
                }
                Ok(())
            }
            WriteOp::DeleteConversation { conversation_id } => {
                match self.conversations.get(conversation_id) {
                    Some(doc) if !doc.participants.contains(acting) => {
                        Err(StoreError::PermissionDenied)
                    }
                    // Already gone: a concurrent leave got there first.
                    _ => Ok(()),
                }
            }
            // Own-index and own-queue ops are idempotent by construction;
            // participant removal tolerates concurrent deletion.
            WriteOp::AddMembership { .. }
            | WriteOp::RemoveMembership { .. }
            | WriteOp::DeleteInvite { .. }
            | WriteOp::RemoveParticipant { .. } => Ok(()),
        }
    }

    fn apply(&mut self, acting: &IdentityId, op: WriteOp, touched: &mut Touched) {
        match op {
            WriteOp::CreateConversation(doc) => {
                self.messages.entry(doc.id).or_default();
                self.conversations.insert(doc.id, doc);
            }
            WriteOp::AddMembership { conversation_id } => {
                self.memberships
                    .entry(acting.clone())
                    .or_default()
                    .insert(conversation_id);
                touched.memberships.insert(acting.clone());
            }
            WriteOp::RemoveMembership { conversation_id } => {
                if let Some(set) = self.memberships.get_mut(acting) {
                    set.remove(&conversation_id);
                }
                touched.memberships.insert(acting.clone());
            }
            WriteOp::PutInvite(invite) => {
                let target = invite.target.clone();
                self.invites
                    .entry(target.clone())
                    .or_default()
                    .insert(invite.conversation_id, invite);
                touched.invites.insert(target);
            }
            WriteOp::DeleteInvite { conversation_id } => {
                if let Some(queue) = self.invites.get_mut(acting) {
                    queue.remove(&conversation_id);
                }
                touched.invites.insert(acting.clone());
            }
            WriteOp::RemoveParticipant {
                conversation_id,
                snapshot,
            } => match self.conversations.get_mut(&conversation_id) {
                Some(doc) if doc.participants.contains(acting) => {
                    if let Some(snapshot) = snapshot {
                        doc.participant_snapshots
                            .entry(acting.clone())
                            .or_insert(snapshot);
                    }
                    doc.participants.remove(acting);
                    doc.wrapped_keys.remove(acting);
                }
                _ => {
                    debug!(conversation = %conversation_id, user = %acting,
                        "participant already absent, skipping removal");
                }
            },
            WriteOp::DeleteConversation { conversation_id } => {
                if self.conversations.remove(&conversation_id).is_some() {
                    self.messages.remove(&conversation_id);
                    // Dropping the sender closes remaining message
                    // subscriptions for the purged conversation.
                    self.message_watch.remove(&conversation_id);
                } else {
                    debug!(conversation = %conversation_id,
                        "conversation already deleted, skipping");
                }
            }
            WriteOp::AppendMessage {
                conversation_id,
                message,
                preview,
            } => {
                if let Some(doc) = self.conversations.get_mut(&conversation_id) {
                    doc.last_activity_at = message.sent_at;
                    if preview.is_some() {
                        doc.last_message = preview;
                    }
                }
                self.messages
                    .entry(conversation_id)
                    .or_default()
                    .push(message);
                touched.messages.insert(conversation_id);
            }
        }
    }

    fn notify(&self, touched: &Touched) {
        for user in &touched.memberships {
            if let Some(tx) = self.membership_watch.get(user) {
                tx.send_replace(self.membership_snapshot(user));
            }
        }
        for user in &touched.invites {
            if let Some(tx) = self.invite_watch.get(user) {
                tx.send_replace(self.invite_snapshot(user));
            }
        }
        for id in &touched.messages {
            if let Some(tx) = self.message_watch.get(id) {
                tx.send_replace(self.message_snapshot(id));
            }
        }
    }
}

#[derive(Default)]
struct Touched {
    memberships: HashSet<IdentityId>,
    invites: HashSet<IdentityId>,
    messages: HashSet<ConversationId>,
}

/// In-process [`SharedStore`] backend.
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn profile(&self, id: &IdentityId) -> Result<UserProfile> {
        let inner = self.inner.read().await;
        inner.profiles.get(id).cloned().ok_or(StoreError::NotFound)
    }

    async fn upsert_profile(
        &self,
        id: &IdentityId,
        display_name: Option<String>,
        avatar_ref: Option<String>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let profile = inner.profiles.entry(id.clone()).or_default();
        profile.display_name = display_name;
        profile.avatar_ref = avatar_ref;
        Ok(())
    }

    async fn publish_public_key(&self, id: &IdentityId, public_key_hex: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let profile = inner.profiles.entry(id.clone()).or_default();
        match profile.public_key.as_deref() {
            None => {
                profile.public_key = Some(public_key_hex.to_string());
                debug!(identity = %id, "public key published");
                Ok(())
            }
            Some(existing) if existing == public_key_hex => Ok(()),
            Some(_) => Err(StoreError::KeyAlreadyPublished),
        }
    }

    async fn published_public_key(&self, id: &IdentityId) -> Result<Option<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .profiles
            .get(id)
            .and_then(|p| p.public_key.clone()))
    }

    async fn conversation(
        &self,
        acting: &IdentityId,
        id: &ConversationId,
    ) -> Result<ConversationDoc> {
        let inner = self.inner.read().await;
        inner.require_participant(acting, id).cloned()
    }

    async fn messages(&self, acting: &IdentityId, id: &ConversationId) -> Result<Vec<MessageDoc>> {
        let inner = self.inner.read().await;
        inner.require_participant(acting, id)?;
        Ok(inner.message_snapshot(id))
    }

    async fn memberships(&self, user: &IdentityId) -> Result<Vec<ConversationId>> {
        let inner = self.inner.read().await;
        Ok(inner.membership_snapshot(user))
    }

    async fn invites(&self, target: &IdentityId) -> Result<Vec<InviteDoc>> {
        let inner = self.inner.read().await;
        Ok(inner.invite_snapshot(target))
    }

    async fn blocked_set(&self, user: &IdentityId) -> Result<BTreeSet<IdentityId>> {
        let inner = self.inner.read().await;
        Ok(inner.blocked.get(user).cloned().unwrap_or_default())
    }

    async fn set_blocked(
        &self,
        user: &IdentityId,
        other: &IdentityId,
        blocked: bool,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let set = inner.blocked.entry(user.clone()).or_default();
        if blocked {
            set.insert(other.clone());
        } else {
            set.remove(other);
        }
        Ok(())
    }

    async fn is_blocked_either(&self, a: &IdentityId, b: &IdentityId) -> Result<bool> {
        let inner = self.inner.read().await;
        let a_blocks_b = inner.blocked.get(a).is_some_and(|s| s.contains(b));
        let b_blocks_a = inner.blocked.get(b).is_some_and(|s| s.contains(a));
        Ok(a_blocks_b || b_blocks_a)
    }

    async fn cleared_marker(
        &self,
        user: &IdentityId,
        id: &ConversationId,
    ) -> Result<Option<DateTime<Utc>>> {
        let inner = self.inner.read().await;
        Ok(inner
            .cleared
            .get(user)
            .and_then(|m| m.get(id).copied()))
    }

    async fn set_cleared_marker(
        &self,
        user: &IdentityId,
        id: &ConversationId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .cleared
            .entry(user.clone())
            .or_default()
            .insert(*id, at);
        Ok(())
    }

    async fn commit(&self, acting: &IdentityId, batch: WriteBatch) -> Result<()> {
        let mut inner = self.inner.write().await;

        // Validate everything first: the whole batch lands or none of it.
        for op in batch.ops() {
            inner.validate(acting, op)?;
        }

        let mut touched = Touched::default();
        for op in batch.ops().iter().cloned() {
            inner.apply(acting, op, &mut touched);
        }
        inner.notify(&touched);
        Ok(())
    }

    async fn watch_memberships(&self, user: &IdentityId) -> Result<MembershipSubscription> {
        let mut inner = self.inner.write().await;
        let snapshot = inner.membership_snapshot(user);
        let tx = inner
            .membership_watch
            .entry(user.clone())
            .or_insert_with(|| watch::channel(snapshot).0);
        Ok(MembershipSubscription { rx: tx.subscribe() })
    }

    async fn watch_invites(&self, target: &IdentityId) -> Result<InviteSubscription> {
        let mut inner = self.inner.write().await;
        let snapshot = inner.invite_snapshot(target);
        let tx = inner
            .invite_watch
            .entry(target.clone())
            .or_insert_with(|| watch::channel(snapshot).0);
        Ok(InviteSubscription { rx: tx.subscribe() })
    }

    async fn watch_messages(
        &self,
        acting: &IdentityId,
        id: &ConversationId,
    ) -> Result<MessageSubscription> {
        let mut inner = self.inner.write().await;
        inner.require_participant(acting, id)?;
        let snapshot = inner.message_snapshot(id);
        let tx = inner
            .message_watch
            .entry(*id)
            .or_insert_with(|| watch::channel(snapshot).0);
        Ok(MessageSubscription { rx: tx.subscribe() })
    }
}
