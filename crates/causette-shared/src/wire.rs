//! Wire representation of sealed payloads.
//!
//! The shared store holds documents, not bytes: a sealed message travels as
//! a base64 nonce plus a base64 ciphertext, alongside plaintext sender
//! metadata. Wrapped chat keys have their own base64 form on
//! [`crate::keywrap::WrappedKey`].

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::constants::NONCE_SIZE;
use crate::crypto::SealedPayload;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("Invalid base64")]
    Base64,

    #[error("Invalid nonce length")]
    NonceLength,
}

/// Base64 form of a sealed payload as stored in the shared store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SealedPayloadWire {
    /// 96-bit nonce, base64
    pub nonce: String,
    /// Authenticated ciphertext, base64
    pub ciphertext: String,
}

impl SealedPayloadWire {
    pub fn from_payload(payload: &SealedPayload) -> Self {
        Self {
            nonce: BASE64.encode(payload.nonce),
            ciphertext: BASE64.encode(&payload.ciphertext),
        }
    }

    pub fn to_payload(&self) -> Result<SealedPayload, WireError> {
        let nonce_bytes = BASE64.decode(&self.nonce).map_err(|_| WireError::Base64)?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(WireError::NonceLength);
        }
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&nonce_bytes);

        let ciphertext = BASE64
            .decode(&self.ciphertext)
            .map_err(|_| WireError::Base64)?;

        Ok(SealedPayload { nonce, ciphertext })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{decrypt_message, encrypt_message, generate_chat_key};

    #[test]
    fn test_wire_roundtrip() {
        let key = generate_chat_key();
        let sealed = encrypt_message(&key, b"bonjour").unwrap();

        let wire = SealedPayloadWire::from_payload(&sealed);
        let restored = wire.to_payload().unwrap();

        assert_eq!(restored, sealed);
        assert_eq!(decrypt_message(&key, &restored).unwrap(), b"bonjour");
    }

    #[test]
    fn test_wire_document_form() {
        let key = generate_chat_key();
        let sealed = encrypt_message(&key, b"salut").unwrap();
        let wire = SealedPayloadWire::from_payload(&sealed);

        // The store persists documents as JSON with camelCase fields.
        let json = serde_json::to_string(&wire).unwrap();
        assert!(json.contains("\"nonce\""));
        assert!(json.contains("\"ciphertext\""));

        let parsed: SealedPayloadWire = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, wire);
    }

    #[test]
    fn test_bad_base64_rejected() {
        let wire = SealedPayloadWire {
            nonce: "***".into(),
            ciphertext: String::new(),
        };
        assert!(matches!(wire.to_payload(), Err(WireError::Base64)));
    }

    #[test]
    fn test_bad_nonce_length_rejected() {
        let wire = SealedPayloadWire {
            nonce: BASE64.encode([0u8; 4]),
            ciphertext: BASE64.encode([0u8; 16]),
        };
        assert!(matches!(wire.to_payload(), Err(WireError::NonceLength)));
    }
}
