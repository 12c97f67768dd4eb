//! Conversation directory: creation, listing, key resolution, activation.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use causette_shared::crypto::{decrypt_message, generate_chat_key, ChatKey};
use causette_shared::identity::decode_public_key;
use causette_shared::keywrap::{unwrap_chat_key, wrap_chat_key, WrappedKey};
use causette_shared::types::{ConversationId, IdentityId};
use causette_store::{
    ConversationDoc, InviteDoc, MembershipSubscription, MessageSubscription, WriteBatch, WriteOp,
};

use crate::error::ClientError;
use crate::messaging::MessageBody;
use crate::session::Session;

/// The conversation currently open for reading.
///
/// Holds the resolved chat key and the message subscription; replaced
/// wholesale when the user switches conversations, so a detached
/// subscription can never deliver stale content into the new view.
pub(crate) struct ActiveConversation {
    pub(crate) id: ConversationId,
    pub(crate) key: ChatKey,
    pub(crate) subscription: MessageSubscription,
}

impl ActiveConversation {
    pub(crate) fn detach(self) {
        self.subscription.unsubscribe();
    }
}

/// One row of the visible conversation list.
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub peers: Vec<PeerSummary>,
    pub last_activity_at: DateTime<Utc>,
    /// Decrypted preview, when the chat key is already cached.
    pub preview: Option<MessageBody>,
}

#[derive(Debug, Clone)]
pub struct PeerSummary {
    pub id: IdentityId,
    pub display_name: Option<String>,
}

impl Session {
    /// Create a two-party conversation with `peer`.
    ///
    /// Generates a fresh chat key, wraps it for both participants, and
    /// lands the conversation document, the creator's membership entry and
    /// the peer's invite in one batch. The peer may be offline; the invite
    /// waits in their queue until they resolve it.
    pub async fn create_conversation(
        &self,
        peer: &IdentityId,
    ) -> Result<ConversationId, ClientError> {
        if self.store.is_blocked_either(&self.user_id, peer).await? {
            return Err(ClientError::CannotCreate);
        }

        let peer_key_hex = self
            .store
            .published_public_key(peer)
            .await?
            .ok_or(ClientError::PeerKeyUnavailable)?;
        let peer_public = decode_public_key(&peer_key_hex)?;
        let own_keypair = self.private_key().await?;

        let chat_key = generate_chat_key();
        let own_wrap = wrap_chat_key(&chat_key, &own_keypair.public_key())?;
        let peer_wrap = wrap_chat_key(&chat_key, &peer_public)?;

        let now = Utc::now();
        let doc = ConversationDoc {
            id: ConversationId::new(),
            participants: [self.user_id.clone(), peer.clone()].into_iter().collect(),
            wrapped_keys: [
                (self.user_id.clone(), own_wrap.to_base64()),
                (peer.clone(), peer_wrap.to_base64()),
            ]
            .into_iter()
            .collect(),
            participant_snapshots: Default::default(),
            created_by: self.user_id.clone(),
            created_at: now,
            last_message: None,
            last_activity_at: now,
        };
        let conversation_id = doc.id;

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::CreateConversation(doc));
        batch.push(WriteOp::AddMembership { conversation_id });
        batch.push(WriteOp::PutInvite(InviteDoc {
            conversation_id,
            target: peer.clone(),
            invited_by: self.user_id.clone(),
            created_at: now,
        }));
        self.store.commit(&self.user_id, batch).await?;

        self.chat_keys
            .lock()
            .await
            .insert(conversation_id, chat_key);

        info!(conversation = %conversation_id, peer = %peer, "conversation created");
        Ok(conversation_id)
    }

    /// Resolve the chat key for a conversation: cache, then vault private
    /// key, then unwrap of this identity's wrapped entry.
    ///
    /// Every failure here is recoverable and disables messaging for this
    /// conversation only; decryption is never attempted without a key.
    pub async fn resolve_chat_key(&self, id: &ConversationId) -> Result<ChatKey, ClientError> {
        if let Some(key) = self.chat_keys.lock().await.get(id) {
            return Ok(*key);
        }

        let doc = self.store.conversation(&self.user_id, id).await?;
        let wrapped_b64 = doc
            .wrapped_keys
            .get(&self.user_id)
            .ok_or(ClientError::NoWrappedKey)?;
        let wrapped = WrappedKey::from_base64(wrapped_b64)?;

        let keypair = self.private_key().await?;
        let key = unwrap_chat_key(&wrapped, keypair.secret())?;

        self.chat_keys.lock().await.insert(*id, key);
        debug!(conversation = %id, "chat key resolved");
        Ok(key)
    }

    /// The conversations visible to this user: the membership index, minus
    /// anything shared with someone in the user's own blocked set. Hidden
    /// conversations are not deleted; unblocking restores them unchanged.
    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>, ClientError> {
        let blocked = self.store.blocked_set(&self.user_id).await?;
        let ids = self.store.memberships(&self.user_id).await?;

        let mut summaries = Vec::new();
        for id in ids {
            let doc = match self.store.conversation(&self.user_id, &id).await {
                Ok(doc) => doc,
                // Deleted or re-scoped since the index was written; the
                // index will catch up, skip the row for now.
                Err(_) => continue,
            };

            if doc.participants.iter().any(|p| blocked.contains(p)) {
                continue;
            }

            let mut peers = Vec::new();
            for peer_id in doc.participants.iter().filter(|p| **p != self.user_id) {
                let display_name = match self.store.profile(peer_id).await {
                    Ok(profile) => profile.display_name,
                    Err(_) => doc
                        .participant_snapshots
                        .get(peer_id)
                        .and_then(|s| s.display_name.clone()),
                };
                peers.push(PeerSummary {
                    id: peer_id.clone(),
                    display_name,
                });
            }

            let preview = match (&doc.last_message, self.chat_keys.lock().await.get(&id)) {
                (Some(wire), Some(key)) => Some(
                    wire.to_payload()
                        .ok()
                        .and_then(|payload| decrypt_message(key, &payload).ok())
                        .and_then(|bytes| String::from_utf8(bytes).ok())
                        .map_or(MessageBody::Unreadable, MessageBody::Text),
                ),
                _ => None,
            };

            summaries.push(ConversationSummary {
                id,
                peers,
                last_activity_at: doc.last_activity_at,
                preview,
            });
        }

        summaries.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(summaries)
    }

    /// Subscribe to this user's conversation set. The handle is owned by
    /// the caller and detached with `unsubscribe` (or by dropping it).
    pub async fn subscribe_conversations(&self) -> Result<MembershipSubscription, ClientError> {
        Ok(self.store.watch_memberships(&self.user_id).await?)
    }

    /// Open a conversation for reading.
    ///
    /// Key resolution completes before the message subscription is created;
    /// on a key error the conversation stays closed and no decrypt is ever
    /// attempted. Any previously active conversation is detached first, so
    /// its in-flight batches are discarded rather than delivered here.
    pub async fn activate(&self, id: ConversationId) -> Result<(), ClientError> {
        let key = self.resolve_chat_key(&id).await?;
        let subscription = self.store.watch_messages(&self.user_id, &id).await?;

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            debug!(conversation = %previous.id, "detaching previous conversation");
            previous.detach();
        }
        *active = Some(ActiveConversation {
            id,
            key,
            subscription,
        });
        Ok(())
    }

    /// Close the active conversation, if any.
    pub async fn deactivate(&self) {
        if let Some(previous) = self.active.lock().await.take() {
            previous.detach();
        }
    }

    pub async fn active_id(&self) -> Option<ConversationId> {
        self.active.lock().await.as_ref().map(|a| a.id)
    }
}
