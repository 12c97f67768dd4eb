/// ChaCha20-Poly1305 nonce size in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Symmetric chat key size in bytes
pub const CHAT_KEY_SIZE: usize = 32;

/// X25519 public key size in bytes
pub const PUBKEY_SIZE: usize = 32;

/// X25519 secret key size in bytes
pub const SECRET_KEY_SIZE: usize = 32;

/// Total size of a wrapped chat key:
/// ephemeral public key || nonce || encrypted key + tag
pub const WRAPPED_KEY_SIZE: usize = PUBKEY_SIZE + NONCE_SIZE + CHAT_KEY_SIZE + TAG_SIZE;

/// Maximum plaintext message size in bytes (256 KiB)
pub const MAX_MESSAGE_SIZE: usize = 262_144;

/// Maximum length of the sealed conversation preview, in characters
pub const PREVIEW_MAX_CHARS: usize = 80;

/// Key derivation context for chat-key wrapping (BLAKE3)
pub const KDF_CONTEXT_KEY_WRAP: &str = "causette-key-wrap-v1";
