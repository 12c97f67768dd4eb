use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Message exceeds maximum size")]
    MessageTooLarge,
}

#[derive(Error, Debug)]
pub enum KeyWrapError {
    #[error("Key wrapping failed")]
    WrapFailed,

    #[error("Malformed wrapped key")]
    Malformed,

    #[error("Wrapped key was not produced for this private key")]
    KeyMismatch,
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid key bytes")]
    InvalidKeyBytes,

    #[error("Key export is corrupt")]
    CorruptExport,
}
