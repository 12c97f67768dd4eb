//! Chat-key wrapping.
//!
//! A conversation's symmetric key is wrapped once per participant with an
//! X25519 sealed box: an ephemeral keypair performs Diffie-Hellman against
//! the recipient's static public key, the shared secret is run through a
//! BLAKE3 KDF, and the resulting key seals the raw chat-key bytes with
//! ChaCha20-Poly1305. Only the holder of the matching private key can
//! recover the chat key; anyone else hits an authentication failure.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::rngs::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::constants::{KDF_CONTEXT_KEY_WRAP, NONCE_SIZE, PUBKEY_SIZE, WRAPPED_KEY_SIZE};
use crate::crypto::{generate_nonce, ChatKey};
use crate::error::KeyWrapError;

/// An asymmetrically encrypted chat key:
/// ephemeral public key || nonce || sealed key bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey(Vec<u8>);

impl WrappedKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, KeyWrapError> {
        if bytes.len() != WRAPPED_KEY_SIZE {
            return Err(KeyWrapError::Malformed);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Wire form: base64 of the wrap bytes
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.0)
    }

    pub fn from_base64(s: &str) -> Result<Self, KeyWrapError> {
        let bytes = BASE64.decode(s.trim()).map_err(|_| KeyWrapError::Malformed)?;
        Self::from_bytes(bytes)
    }
}

// Domain-separated KDF over the DH output and both public keys, so a wrap
// is bound to the exact keypair it was produced for.
fn derive_wrap_key(shared_secret: &[u8], ephemeral_pub: &[u8], recipient_pub: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_KEY_WRAP);
    hasher.update(shared_secret);
    hasher.update(ephemeral_pub);
    hasher.update(recipient_pub);
    let hash = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&hash.as_bytes()[..32]);
    key
}

/// Wrap a chat key for a recipient. Randomized per call: wrapping the same
/// key twice produces different bytes, but unwrap always recovers the key.
pub fn wrap_chat_key(chat_key: &ChatKey, recipient: &PublicKey) -> Result<WrappedKey, KeyWrapError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_pub = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient);

    let wrap_key = derive_wrap_key(
        shared.as_bytes(),
        ephemeral_pub.as_bytes(),
        recipient.as_bytes(),
    );

    let cipher = ChaCha20Poly1305::new((&wrap_key).into());
    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from_slice(&nonce_bytes);

    let sealed = cipher
        .encrypt(nonce, chat_key.as_ref())
        .map_err(|_| KeyWrapError::WrapFailed)?;

    let mut out = Vec::with_capacity(WRAPPED_KEY_SIZE);
    out.extend_from_slice(ephemeral_pub.as_bytes());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&sealed);
    WrappedKey::from_bytes(out)
}

/// Unwrap a chat key with the recipient's private key.
///
/// A wrap produced for a different public key fails the AEAD authentication
/// check, never a key-identifier comparison, and surfaces as the recoverable
/// [`KeyWrapError::KeyMismatch`].
pub fn unwrap_chat_key(
    wrapped: &WrappedKey,
    own_secret: &StaticSecret,
) -> Result<ChatKey, KeyWrapError> {
    let bytes = wrapped.as_bytes();
    let (ephemeral_bytes, rest) = bytes.split_at(PUBKEY_SIZE);
    let (nonce_bytes, sealed) = rest.split_at(NONCE_SIZE);

    let mut ephemeral_arr = [0u8; PUBKEY_SIZE];
    ephemeral_arr.copy_from_slice(ephemeral_bytes);
    let ephemeral_pub = PublicKey::from(ephemeral_arr);

    let own_pub = PublicKey::from(own_secret);
    let shared = own_secret.diffie_hellman(&ephemeral_pub);

    let wrap_key = derive_wrap_key(
        shared.as_bytes(),
        ephemeral_pub.as_bytes(),
        own_pub.as_bytes(),
    );

    let cipher = ChaCha20Poly1305::new((&wrap_key).into());
    let nonce = Nonce::from_slice(nonce_bytes);

    let plain = cipher
        .decrypt(nonce, sealed)
        .map_err(|_| KeyWrapError::KeyMismatch)?;

    if plain.len() != 32 {
        return Err(KeyWrapError::Malformed);
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&plain);
    Ok(key)
}
