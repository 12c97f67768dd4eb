use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::constants::PUBKEY_SIZE;
use crate::error::IdentityError;

/// A user's X25519 key-agreement keypair.
///
/// The keypair exists solely to wrap and unwrap per-conversation chat keys;
/// it is not a signing key. The private half never leaves the device that
/// generated it.
#[derive(Clone)]
pub struct IdentityKeyPair {
    secret: StaticSecret,
}

/// Serializable format for storing the keypair in a key vault
#[derive(Serialize, Deserialize)]
pub struct IdentityKeyExport {
    pub secret_key: [u8; 32],
    pub public_key: [u8; 32],
}

impl IdentityKeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        Self { secret }
    }

    /// Restore a keypair from secret key bytes
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self {
            secret: StaticSecret::from(*secret),
        }
    }

    /// Restore a keypair from a serialized export
    pub fn from_export(export: &IdentityKeyExport) -> Self {
        Self::from_secret_bytes(&export.secret_key)
    }

    /// Get the public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(&self.secret)
    }

    /// Get the raw public key bytes
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.public_key().to_bytes()
    }

    /// Get the private half for unwrapping
    pub fn secret(&self) -> &StaticSecret {
        &self.secret
    }

    /// Export for serialization
    pub fn to_export(&self) -> IdentityKeyExport {
        IdentityKeyExport {
            secret_key: self.secret.to_bytes(),
            public_key: self.public_key().to_bytes(),
        }
    }
}

/// Encode a public key for publication in the identity directory
pub fn encode_public_key(key: &PublicKey) -> String {
    hex::encode(key.to_bytes())
}

/// Decode a public key published in the identity directory
pub fn decode_public_key(s: &str) -> Result<PublicKey, IdentityError> {
    let bytes = hex::decode(s).map_err(|_| IdentityError::InvalidKeyBytes)?;
    if bytes.len() != PUBKEY_SIZE {
        return Err(IdentityError::InvalidKeyBytes);
    }
    let mut arr = [0u8; PUBKEY_SIZE];
    arr.copy_from_slice(&bytes);
    Ok(PublicKey::from(arr))
}
