//! Interchangeable content ciphers behind a uniform seal/open contract.
//!
//! Both primitives take a 32-byte key and a 96-bit nonce and emit
//! ciphertext||tag. Nonce uniqueness per key is the caller's burden; chunked
//! streams derive per-chunk nonces with [`chunk_nonce`].

use aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce as GcmNonce};
use chacha20poly1305::{ChaCha20Poly1305, Nonce as ChNonce};
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};

use crate::error::{DgError, Result};

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

/// Hard cap on chunk counters within a single envelope.
pub const MAX_CHUNKS: u64 = 1 << 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AeadAlg {
    AesGcm,
    ChaCha20,
}

impl AeadAlg {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "AESGCM" => Ok(AeadAlg::AesGcm),
            "CHACHA20" => Ok(AeadAlg::ChaCha20),
            other => Err(DgError::UnsupportedAlgorithm(format!(
                "unknown AEAD: {other}"
            ))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AeadAlg::AesGcm => "AESGCM",
            AeadAlg::ChaCha20 => "CHACHA20",
        }
    }
}

enum Cipher {
    Gcm(Aes256Gcm),
    ChaCha(ChaCha20Poly1305),
}

/// One cipher instance bound to a key; resolved once per envelope.
pub struct AeadCipher {
    alg: AeadAlg,
    cipher: Cipher,
}

impl AeadCipher {
    pub fn new(alg: AeadAlg, key: &[u8; KEY_SIZE]) -> Self {
        let cipher = match alg {
            AeadAlg::AesGcm => Cipher::Gcm(Aes256Gcm::new(key.into())),
            AeadAlg::ChaCha20 => Cipher::ChaCha(ChaCha20Poly1305::new(key.into())),
        };
        AeadCipher { alg, cipher }
    }

    pub fn alg(&self) -> AeadAlg {
        self.alg
    }

    pub fn seal(&self, nonce: &[u8; NONCE_SIZE], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let payload = Payload { msg: plaintext, aad };
        match &self.cipher {
            Cipher::Gcm(c) => c.encrypt(GcmNonce::from_slice(nonce), payload),
            Cipher::ChaCha(c) => c.encrypt(ChNonce::from_slice(nonce), payload),
        }
        .map_err(|_| DgError::InvalidCiphertext("AEAD seal failed".into()))
    }

    pub fn open(&self, nonce: &[u8; NONCE_SIZE], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let payload = Payload {
            msg: ciphertext,
            aad,
        };
        match &self.cipher {
            Cipher::Gcm(c) => c.decrypt(GcmNonce::from_slice(nonce), payload),
            Cipher::ChaCha(c) => c.decrypt(ChNonce::from_slice(nonce), payload),
        }
        .map_err(|_| DgError::InvalidCiphertext("AEAD tag verification failed".into()))
    }
}

/// Content-encryption key. Zeroized on drop; no `Debug`.
pub struct ContentKey(Secret<[u8; KEY_SIZE]>);

impl ContentKey {
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut key);
        ContentKey(Secret::new(key))
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        ContentKey(Secret::new(bytes))
    }

    pub fn expose(&self) -> &[u8; KEY_SIZE] {
        self.0.expose_secret()
    }
}

pub fn gen_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Per-chunk nonce: XOR the big-endian counter into the last four bytes of
/// the base nonce. Injective over the full u32 index range.
pub fn chunk_nonce(base: &[u8; NONCE_SIZE], index: u32) -> [u8; NONCE_SIZE] {
    let mut nonce = *base;
    for (b, c) in nonce[NONCE_SIZE - 4..].iter_mut().zip(index.to_be_bytes()) {
        *b ^= c;
    }
    nonce
}
