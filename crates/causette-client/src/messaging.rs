//! Sending and rendering messages.
//!
//! Decryption is per-message and failure-isolated: a message that does not
//! authenticate renders as [`MessageBody::Unreadable`] while the rest of
//! the batch goes through. Delivery order is not trusted; every batch is
//! re-sorted by `sent_at` before rendering, and messages at or before the
//! user's cleared marker are suppressed from this user's view only.

use chrono::{DateTime, Utc};
use tracing::info;

use causette_shared::constants::PREVIEW_MAX_CHARS;
use causette_shared::crypto::{decrypt_message, encrypt_message, ChatKey};
use causette_shared::types::{ConversationId, IdentityId, MessageId};
use causette_shared::wire::SealedPayloadWire;
use causette_store::{MessageDoc, WriteBatch, WriteOp};

use crate::error::ClientError;
use crate::session::Session;

/// Decrypted message content, or a typed placeholder when authentication
/// fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Unreadable,
}

/// A message prepared for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub id: MessageId,
    pub sender_id: IdentityId,
    pub sent_at: DateTime<Utc>,
    pub body: MessageBody,
}

fn render_batch(
    key: &ChatKey,
    docs: &[MessageDoc],
    cleared: Option<DateTime<Utc>>,
) -> Vec<RenderedMessage> {
    let mut visible: Vec<&MessageDoc> = docs
        .iter()
        .filter(|doc| cleared.map_or(true, |marker| doc.sent_at > marker))
        .collect();
    visible.sort_by(|a, b| a.sent_at.cmp(&b.sent_at).then(a.id.cmp(&b.id)));

    visible
        .into_iter()
        .map(|doc| {
            let body = doc
                .payload
                .to_payload()
                .ok()
                .and_then(|payload| decrypt_message(key, &payload).ok())
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .map_or(MessageBody::Unreadable, MessageBody::Text);
            RenderedMessage {
                id: doc.id,
                sender_id: doc.sender_id.clone(),
                sent_at: doc.sent_at,
                body,
            }
        })
        .collect()
}

impl Session {
    /// Encrypt and send a message, refreshing the conversation's sealed
    /// preview and activity timestamp in the same batch.
    pub async fn send_message(
        &self,
        id: &ConversationId,
        text: &str,
    ) -> Result<MessageId, ClientError> {
        let key = self.resolve_chat_key(id).await?;

        let payload = encrypt_message(&key, text.as_bytes())?;
        let preview_text: String = text.chars().take(PREVIEW_MAX_CHARS).collect();
        let preview = encrypt_message(&key, preview_text.as_bytes())?;

        let message = MessageDoc {
            id: MessageId::new(),
            sender_id: self.user_id.clone(),
            payload: SealedPayloadWire::from_payload(&payload),
            sent_at: Utc::now(),
        };
        let message_id = message.id;

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::AppendMessage {
            conversation_id: *id,
            message,
            preview: Some(SealedPayloadWire::from_payload(&preview)),
        });
        self.store.commit(&self.user_id, batch).await?;

        info!(conversation = %id, message = %message_id, "message sent");
        Ok(message_id)
    }

    /// Fetch and render the full history of a conversation.
    pub async fn messages(&self, id: &ConversationId) -> Result<Vec<RenderedMessage>, ClientError> {
        let key = self.resolve_chat_key(id).await?;
        let docs = self.store.messages(&self.user_id, id).await?;
        let cleared = self.store.cleared_marker(&self.user_id, id).await?;
        Ok(render_batch(&key, &docs, cleared))
    }

    /// Render the active conversation's current snapshot.
    pub async fn current_messages(&self) -> Result<Vec<RenderedMessage>, ClientError> {
        let active = self.active.lock().await;
        let active = active.as_ref().ok_or(ClientError::NoActiveConversation)?;
        let cleared = self.store.cleared_marker(&self.user_id, &active.id).await?;
        Ok(render_batch(&active.key, &active.subscription.current(), cleared))
    }

    /// Wait for the next delivery on the active conversation and render it.
    /// Returns `None` once the subscription is closed (conversation purged
    /// or store gone).
    pub async fn next_messages(&self) -> Result<Option<Vec<RenderedMessage>>, ClientError> {
        let mut active = self.active.lock().await;
        let active = active.as_mut().ok_or(ClientError::NoActiveConversation)?;

        if !active.subscription.changed().await {
            return Ok(None);
        }
        let docs = active.subscription.current();
        let cleared = self.store.cleared_marker(&self.user_id, &active.id).await?;
        Ok(Some(render_batch(&active.key, &docs, cleared)))
    }
}
