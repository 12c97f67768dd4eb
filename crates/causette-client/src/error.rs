use thiserror::Error;

use causette_shared::{CryptoError, IdentityError, KeyWrapError};
use causette_store::StoreError;

use crate::vault::VaultError;

/// Errors surfaced to the embedding application.
///
/// Key errors are non-fatal by contract: they disable messaging for one
/// conversation with an explanation, and never destroy local or remote data
/// as a side effect.
#[derive(Error, Debug)]
pub enum ClientError {
    /// No private key is stored on this device for the signed-in identity.
    #[error("No local private key for this identity")]
    KeyNotFound,

    /// The stored private key could not be deserialized. The vault entry
    /// has already been purged.
    #[error("Local private key was corrupt and has been removed")]
    KeyCorrupt,

    /// The wrapped key could not be opened with this private key.
    #[error("Cannot establish secure channel")]
    KeyMismatch,

    /// The conversation carries no wrapped key for this identity.
    #[error("No wrapped key for this identity in the conversation")]
    NoWrappedKey,

    /// The wrapped-key entry did not parse.
    #[error("Malformed wrapped key")]
    MalformedKey,

    /// The local private key does not match the key published in the
    /// identity directory.
    #[error("Stored private key does not match the published public key")]
    PublishedKeyMismatch,

    /// Conversation creation rejected by a block relationship.
    #[error("Conversation creation blocked")]
    CannotCreate,

    /// The counterparty has not published a public key yet.
    #[error("The counterparty has not published a public key")]
    PeerKeyUnavailable,

    #[error("No conversation is active")]
    NoActiveConversation,

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Vault error: {0}")]
    Vault(VaultError),
}

impl From<VaultError> for ClientError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::NotFound => Self::KeyNotFound,
            VaultError::Corrupt => Self::KeyCorrupt,
            other => Self::Vault(other),
        }
    }
}

impl From<KeyWrapError> for ClientError {
    fn from(err: KeyWrapError) -> Self {
        match err {
            KeyWrapError::KeyMismatch => Self::KeyMismatch,
            KeyWrapError::Malformed | KeyWrapError::WrapFailed => Self::MalformedKey,
        }
    }
}
