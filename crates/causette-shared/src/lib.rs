//! # causette-shared
//!
//! Cryptographic primitives and shared domain types for Causette, an
//! end-to-end-encrypted messaging layer over an untrusted shared store.
//!
//! Message content is sealed with ChaCha20-Poly1305 under a per-conversation
//! chat key. The chat key itself never travels in the clear: it is wrapped
//! for each participant with an X25519 sealed box, so only the holder of the
//! matching private key can recover it.

pub mod constants;
pub mod crypto;
pub mod identity;
pub mod keywrap;
pub mod types;
pub mod wire;

mod error;

pub use error::{CryptoError, IdentityError, KeyWrapError};
