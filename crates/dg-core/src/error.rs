//! Unified error taxonomy for the envelope core.
//!
//! Messages never carry key material, salts or passphrase contents.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DgError>;

#[derive(Debug, Error)]
pub enum DgError {
    /// Referenced `kid` is absent from the store.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Sealed-blob AEAD tag failed during unseal.
    #[error("invalid passphrase")]
    InvalidPassphrase,

    /// Envelope header missing, malformed, truncated or carrying bad fields.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Content authentication failed, no recipient unwrapped, or share
    /// reconstruction came up short.
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Operation rejected by a policy gate (e.g. key expired).
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}
