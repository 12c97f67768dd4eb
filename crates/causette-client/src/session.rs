//! The signed-in session.
//!
//! [`Session`] ties one identity on one device to the shared store and the
//! local key vault. Chat keys live only in the in-memory cache; the private
//! key is re-read from the vault at every resolution so a wiped or corrupt
//! vault is observed immediately instead of at the next restart.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use causette_shared::crypto::ChatKey;
use causette_shared::identity::{encode_public_key, IdentityKeyPair};
use causette_shared::types::{ConversationId, IdentityId};
use causette_store::SharedStore;

use crate::conversations::ActiveConversation;
use crate::error::ClientError;
use crate::vault::KeyVault;

/// One signed-in identity on one device.
pub struct Session {
    pub(crate) user_id: IdentityId,
    pub(crate) store: Arc<dyn SharedStore>,
    pub(crate) vault: Arc<dyn KeyVault>,
    /// Resolved chat keys, in memory only. Never persisted unwrapped.
    pub(crate) chat_keys: Mutex<HashMap<ConversationId, ChatKey>>,
    pub(crate) active: Mutex<Option<ActiveConversation>>,
}

impl Session {
    /// First sign-in on this device: generate a keypair, vault it, and
    /// publish the public half in the identity directory.
    pub async fn create_identity(
        store: Arc<dyn SharedStore>,
        vault: Arc<dyn KeyVault>,
        user_id: IdentityId,
        display_name: Option<String>,
        avatar_ref: Option<String>,
    ) -> Result<Self, ClientError> {
        let keypair = IdentityKeyPair::generate();
        vault.put(&user_id, &keypair).await?;

        store
            .publish_public_key(&user_id, &encode_public_key(&keypair.public_key()))
            .await?;
        store
            .upsert_profile(&user_id, display_name, avatar_ref)
            .await?;

        info!(identity = %user_id, "identity created");

        Ok(Self {
            user_id,
            store,
            vault,
            chat_keys: Mutex::new(HashMap::new()),
            active: Mutex::new(None),
        })
    }

    /// Returning sign-in: the private key must already be in the vault and
    /// must match the published public key.
    pub async fn sign_in(
        store: Arc<dyn SharedStore>,
        vault: Arc<dyn KeyVault>,
        user_id: IdentityId,
    ) -> Result<Self, ClientError> {
        let keypair = vault.get(&user_id).await?;
        let public_hex = encode_public_key(&keypair.public_key());

        match store.published_public_key(&user_id).await? {
            Some(published) if published != public_hex => {
                warn!(identity = %user_id, "local key does not match the directory");
                return Err(ClientError::PublishedKeyMismatch);
            }
            Some(_) => {}
            // Directory entry lost or never written; first write wins.
            None => store.publish_public_key(&user_id, &public_hex).await?,
        }

        info!(identity = %user_id, "signed in");

        Ok(Self {
            user_id,
            store,
            vault,
            chat_keys: Mutex::new(HashMap::new()),
            active: Mutex::new(None),
        })
    }

    pub fn user_id(&self) -> &IdentityId {
        &self.user_id
    }

    /// Load the private key from the vault. Called per resolution so vault
    /// loss surfaces as [`ClientError::KeyNotFound`] right away.
    pub(crate) async fn private_key(&self) -> Result<IdentityKeyPair, ClientError> {
        Ok(self.vault.get(&self.user_id).await?)
    }

    /// Sign out: detach the active subscription and discard every cached
    /// chat key.
    pub async fn sign_out(self) {
        if let Some(active) = self.active.lock().await.take() {
            active.detach();
        }
        self.chat_keys.lock().await.clear();
        info!(identity = %self.user_id, "signed out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::{KeyVault, MemoryVault};
    use causette_store::{MemoryStore, SharedStore};

    fn id(s: &str) -> IdentityId {
        IdentityId::from(s)
    }

    #[tokio::test]
    async fn test_create_identity_publishes_key() {
        let store = Arc::new(MemoryStore::new());
        let vault = Arc::new(MemoryVault::new());

        let session = Session::create_identity(
            store.clone(),
            vault,
            id("alice"),
            Some("Alice".into()),
            None,
        )
        .await
        .unwrap();

        let published = store
            .published_public_key(session.user_id())
            .await
            .unwrap()
            .unwrap();
        let keypair = session.private_key().await.unwrap();
        assert_eq!(published, encode_public_key(&keypair.public_key()));
    }

    #[tokio::test]
    async fn test_sign_in_without_key_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let vault = Arc::new(MemoryVault::new());

        assert!(matches!(
            Session::sign_in(store, vault, id("alice")).await,
            Err(ClientError::KeyNotFound)
        ));
    }

    #[tokio::test]
    async fn test_sign_in_rejects_mismatched_directory_key() {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let vault = Arc::new(MemoryVault::new());

        // Someone else's key is already published under this identity.
        let other = IdentityKeyPair::generate();
        store
            .publish_public_key(&id("alice"), &encode_public_key(&other.public_key()))
            .await
            .unwrap();

        let local = IdentityKeyPair::generate();
        vault.put(&id("alice"), &local).await.unwrap();

        assert!(matches!(
            Session::sign_in(store, vault, id("alice")).await,
            Err(ClientError::PublishedKeyMismatch)
        ));
    }

    #[tokio::test]
    async fn test_sign_in_republishes_after_directory_loss() {
        let store = Arc::new(MemoryStore::new());
        let vault = Arc::new(MemoryVault::new());

        let keypair = IdentityKeyPair::generate();
        vault.put(&id("alice"), &keypair).await.unwrap();

        let session = Session::sign_in(store.clone(), vault, id("alice"))
            .await
            .unwrap();
        assert_eq!(
            store
                .published_public_key(session.user_id())
                .await
                .unwrap()
                .unwrap(),
            encode_public_key(&keypair.public_key())
        );
    }
}
