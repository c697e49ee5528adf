//! Scrypt key derivation for sealing private-key material.

use rand::RngCore;
use scrypt::Params;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{DgError, Result};

pub const DERIVED_KEY_LEN: usize = 32;

/// Scrypt cost parameters. Compiled-in constants at format v1; the header's
/// optional `kdf` field carries them explicitly for future evolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfParams {
    pub algorithm: String,
    pub n: u32,
    pub r: u32,
    pub p: u32,
    pub length: u32,
    pub salt_length: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        KdfParams {
            algorithm: "scrypt".into(),
            n: 1 << 15,
            r: 8,
            p: 1,
            length: 32,
            salt_length: 16,
        }
    }
}

impl KdfParams {
    fn scrypt_params(&self) -> Result<Params> {
        if self.algorithm != "scrypt" {
            return Err(DgError::UnsupportedAlgorithm(format!(
                "unknown KDF: {}",
                self.algorithm
            )));
        }
        if !self.n.is_power_of_two() || self.n < 2 {
            return Err(DgError::InvalidParameter(
                "scrypt n must be a power of two".into(),
            ));
        }
        if self.length as usize != DERIVED_KEY_LEN {
            return Err(DgError::InvalidParameter(
                "scrypt output length must be 32 bytes".into(),
            ));
        }
        let log_n = self.n.trailing_zeros() as u8;
        Params::new(log_n, self.r, self.p, DERIVED_KEY_LEN)
            .map_err(|_| DgError::InvalidParameter("invalid scrypt parameters".into()))
    }

    pub fn derive_key(
        &self,
        passphrase: &str,
        salt: &[u8],
    ) -> Result<Zeroizing<[u8; DERIVED_KEY_LEN]>> {
        let params = self.scrypt_params()?;
        let mut key = Zeroizing::new([0u8; DERIVED_KEY_LEN]);
        scrypt::scrypt(passphrase.as_bytes(), salt, &params, &mut key[..])
            .map_err(|_| DgError::InvalidParameter("scrypt output length mismatch".into()))?;
        Ok(key)
    }

    pub fn random_salt(&self) -> Vec<u8> {
        random_salt(self.salt_length as usize)
    }
}

pub fn random_salt(len: usize) -> Vec<u8> {
    let mut salt = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}
