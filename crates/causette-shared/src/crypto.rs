use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;

use crate::constants::{MAX_MESSAGE_SIZE, NONCE_SIZE};
use crate::error::CryptoError;

pub type ChatKey = [u8; 32];

/// A sealed message body. Nonce and ciphertext travel as separate fields
/// because the store wire format carries both alongside plaintext metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPayload {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

pub fn generate_chat_key() -> ChatKey {
    let mut key = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

// Nonces must come from the CSPRNG, never a counter: several sessions may
// encrypt concurrently under the same chat key.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

pub fn encrypt_message(key: &ChatKey, plaintext: &[u8]) -> Result<SealedPayload, CryptoError> {
    if plaintext.len() > MAX_MESSAGE_SIZE {
        return Err(CryptoError::MessageTooLarge);
    }

    let cipher = ChaCha20Poly1305::new(key.into());
    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok(SealedPayload {
        nonce: nonce_bytes,
        ciphertext,
    })
}

pub fn decrypt_message(key: &ChatKey, payload: &SealedPayload) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(key.into());
    let nonce = Nonce::from_slice(&payload.nonce);

    cipher
        .decrypt(nonce, payload.ciphertext.as_ref())
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = generate_chat_key();
        let plaintext = b"On fait la causette?";

        let sealed = encrypt_message(&key, plaintext).unwrap();
        let decrypted = decrypt_message(&key, &sealed).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = generate_chat_key();
        let key2 = generate_chat_key();

        let sealed = encrypt_message(&key1, b"secret").unwrap();
        assert!(decrypt_message(&key2, &sealed).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = generate_chat_key();

        let mut sealed = encrypt_message(&key, b"important").unwrap();
        let len = sealed.ciphertext.len();
        sealed.ciphertext[len - 1] ^= 0xFF;

        assert!(decrypt_message(&key, &sealed).is_err());
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let key = generate_chat_key();
        let plaintext = b"same message twice";

        let a = encrypt_message(&key, plaintext).unwrap();
        let b = encrypt_message(&key, plaintext).unwrap();

        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_oversized_message_rejected() {
        let key = generate_chat_key();
        let plaintext = vec![0u8; MAX_MESSAGE_SIZE + 1];
        assert!(matches!(
            encrypt_message(&key, &plaintext),
            Err(CryptoError::MessageTooLarge)
        ));
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let key = generate_chat_key();
        let sealed = encrypt_message(&key, b"").unwrap();
        assert_eq!(decrypt_message(&key, &sealed).unwrap(), b"");
    }
}
