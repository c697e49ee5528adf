//! Data Guardian envelope core: hybrid file encryption with RSA-OAEP or
//! X25519-KEM key wrap, streaming chunked AEAD, Shamir threshold sharing,
//! detached Ed25519 signatures and a passphrase-sealed key store.

pub mod aead;
pub mod asymmetric;
pub mod codec;
pub mod config;
mod decryptor;
pub mod ecc;
mod encryptor;
pub mod error;
pub mod header;
pub mod kdf;
pub mod keystore;
mod lifecycle;
pub mod policy;
mod signer;
pub mod stream;
pub mod threshold;

pub use aead::{AeadAlg, ContentKey};
pub use asymmetric::OaepHash;
pub use config::{
    Clock, Context, DgConfig, FixedClock, PassphraseProvider, StaticPassphrase, SystemClock,
};
pub use decryptor::Decryptor;
pub use encryptor::{EncryptOptions, Encryptor};
pub use error::{DgError, Result};
pub use header::{FileHeader, Recipient, WrapScheme, HEADER_VERSION};
pub use keystore::{KeyAlg, KeyRecord, KeyStore, StorePaths};
pub use lifecycle::KeyManager;
pub use signer::{SignatureMetadata, SignerService};

// Passphrases cross the API boundary as secrecy strings.
pub use secrecy::SecretString;
