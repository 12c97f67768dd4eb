//! # causette-client
//!
//! The session layer of Causette: everything a messaging client needs
//! between the UI and the shared store.
//!
//! A [`Session`] represents one signed-in identity on one device. It owns
//! the device-local [`KeyVault`], resolves per-conversation chat keys by
//! unwrapping its own wrapped-key entry, reconciles pending invites against
//! authoritative membership, derives block/clear/leave state, and turns
//! sealed message documents into renderable bodies -- degrading to typed
//! placeholders and disabled states instead of failing a whole view.

pub mod conversations;
pub mod invites;
pub mod membership;
pub mod messaging;
pub mod session;
pub mod vault;

mod error;

pub use conversations::{ConversationSummary, PeerSummary};
pub use error::ClientError;
pub use invites::InviteOutcome;
pub use membership::MembershipState;
pub use messaging::{MessageBody, RenderedMessage};
pub use session::Session;
pub use vault::{FileVault, KeyVault, MemoryVault, VaultError};
