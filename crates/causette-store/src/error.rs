use thiserror::Error;

/// Errors produced at the store boundary.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The requested document does not exist.
    #[error("Record not found")]
    NotFound,

    /// The acting user is not allowed to touch this path.
    #[error("Not permitted for this user")]
    PermissionDenied,

    /// A different public key is already published for this identity.
    #[error("Public key already published for this identity")]
    KeyAlreadyPublished,

    /// An unconsumed invite already exists for this target and conversation.
    #[error("A pending invite already exists for this conversation")]
    InvitePending,

    /// A message's sender field does not match the authenticated writer.
    #[error("Message sender does not match the acting user")]
    SenderMismatch,

    /// A batch precondition did not hold; nothing was applied.
    #[error("Batch precondition failed: {0}")]
    PreconditionFailed(&'static str),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
