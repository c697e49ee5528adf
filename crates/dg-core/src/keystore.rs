//! Filesystem-backed key store.
//!
//! Layout under the store root:
//!
//! ```text
//! keys.json            index {keys: [{kid, alg, label, created_at, expiry?}]}
//! keys/<kid>_pub.pem   public key, SubjectPublicKeyInfo PEM
//! keys/<kid>_priv.enc  sealed blob {v, alg:"AES-256-GCM", salt, nonce, ct}
//! meta/                policy files owned by outer layers
//! ```
//!
//! Private PEMs are AEAD-encrypted under a scrypt-derived key. Sealed blobs
//! are written 0o600 and insecure modes are rejected at read time.

use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use crate::aead::{self, AeadAlg, AeadCipher, NONCE_SIZE};
use crate::codec::{b64d, b64e};
use crate::config::DgConfig;
use crate::error::{DgError, Result};
use crate::kdf::KdfParams;

pub const INDEX_FILE: &str = "keys.json";
const SEAL_ALG: &str = "AES-256-GCM";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyAlg {
    #[serde(rename = "RSA")]
    Rsa,
    #[serde(rename = "ED25519")]
    Ed25519,
    #[serde(rename = "X25519")]
    X25519,
}

impl KeyAlg {
    pub fn kid_prefix(self) -> &'static str {
        match self {
            KeyAlg::Rsa => "rsa",
            KeyAlg::Ed25519 => "ed",
            KeyAlg::X25519 => "x25519",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KeyAlg::Rsa => "RSA",
            KeyAlg::Ed25519 => "ED25519",
            KeyAlg::X25519 => "X25519",
        }
    }
}

/// One managed key pair.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyRecord {
    pub kid: String,
    pub alg: KeyAlg,
    pub label: String,
    pub created_at: u64,
    /// Advisory; enforced by the policy gate, not by deletion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KeyIndex {
    #[serde(default)]
    keys: Vec<KeyRecord>,
}

/// On-disk form of `<kid>_priv.enc`.
#[derive(Debug, Serialize, Deserialize)]
struct SealedBlob {
    v: u32,
    alg: String,
    salt: String,
    nonce: String,
    ct: String,
}

#[derive(Clone, Debug)]
pub struct StorePaths {
    pub root: PathBuf,
    pub keys: PathBuf,
    pub meta: PathBuf,
    pub index: PathBuf,
}

impl StorePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        StorePaths {
            keys: root.join("keys"),
            meta: root.join("meta"),
            index: root.join(INDEX_FILE),
            root,
        }
    }

    /// Idempotent directory and empty-index creation.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.keys)?;
        fs::create_dir_all(&self.meta)?;
        if !self.index.exists() {
            fs::write(&self.index, "{\"keys\": []}")?;
        }
        Ok(())
    }

    pub fn public_pem(&self, kid: &str) -> PathBuf {
        self.keys.join(format!("{kid}_pub.pem"))
    }

    pub fn sealed_private(&self, kid: &str) -> PathBuf {
        self.keys.join(format!("{kid}_priv.enc"))
    }
}

pub struct KeyStore {
    paths: StorePaths,
    kdf: KdfParams,
}

impl KeyStore {
    pub fn open(config: &DgConfig) -> Result<Self> {
        Self::at(config.store_dir.clone(), config.kdf.clone())
    }

    pub fn at(root: impl Into<PathBuf>, kdf: KdfParams) -> Result<Self> {
        let paths = StorePaths::new(root);
        paths.ensure()?;
        Ok(KeyStore { paths, kdf })
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    fn load_index(&self) -> Result<KeyIndex> {
        let raw = fs::read_to_string(&self.paths.index)?;
        serde_json::from_str(&raw).map_err(|_| DgError::InvalidHeader("corrupt key index".into()))
    }

    fn save_index(&self, index: &KeyIndex) -> Result<()> {
        let raw = serde_json::to_string_pretty(index)
            .map_err(|_| DgError::InvalidParameter("key index serialization failed".into()))?;
        fs::write(&self.paths.index, raw)?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<KeyRecord>> {
        Ok(self.load_index()?.keys)
    }

    pub fn get(&self, kid: &str) -> Result<KeyRecord> {
        self.load_index()?
            .keys
            .into_iter()
            .find(|record| record.kid == kid)
            .ok_or_else(|| DgError::KeyNotFound(kid.to_string()))
    }

    /// `<prefix>_<first 10 hex digits of SHA-256 over the public PEM>`.
    pub fn make_kid(alg: KeyAlg, public_pem: &str) -> String {
        let digest = hex::encode(Sha256::digest(public_pem.as_bytes()));
        format!("{}_{}", alg.kid_prefix(), &digest[..10])
    }

    /// Upsert by kid.
    pub fn register(&self, record: KeyRecord) -> Result<()> {
        let mut index = self.load_index()?;
        index.keys.retain(|existing| existing.kid != record.kid);
        index.keys.push(record);
        self.save_index(&index)
    }

    pub fn set_expiry(&self, kid: &str, expiry: Option<u64>) -> Result<()> {
        let mut index = self.load_index()?;
        let record = index
            .keys
            .iter_mut()
            .find(|record| record.kid == kid)
            .ok_or_else(|| DgError::KeyNotFound(kid.to_string()))?;
        record.expiry = expiry;
        self.save_index(&index)
    }

    /// Drop expired index entries; key files stay on disk.
    pub fn clean_expired(&self, now: u64) -> Result<usize> {
        let mut index = self.load_index()?;
        let before = index.keys.len();
        index.keys.retain(|record| record.expiry.map_or(true, |e| e > now));
        let removed = before - index.keys.len();
        if removed > 0 {
            self.save_index(&index)?;
        }
        Ok(removed)
    }

    /// Remove the index entry and delete both key files.
    pub fn remove(&self, kid: &str) -> Result<()> {
        self.unregister(kid)?;
        for path in [self.paths.public_pem(kid), self.paths.sealed_private(kid)] {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    /// Index-only removal; files stay on disk.
    pub fn unregister(&self, kid: &str) -> Result<()> {
        let mut index = self.load_index()?;
        let before = index.keys.len();
        index.keys.retain(|record| record.kid != kid);
        if index.keys.len() == before {
            return Err(DgError::KeyNotFound(kid.to_string()));
        }
        self.save_index(&index)
    }

    pub fn write_keypair(
        &self,
        kid: &str,
        public_pem: &str,
        private_pem: &str,
        passphrase: &SecretString,
    ) -> Result<()> {
        fs::write(self.paths.public_pem(kid), public_pem)?;
        let blob = self.seal_private(private_pem, passphrase)?;
        let raw = serde_json::to_string(&blob)
            .map_err(|_| DgError::InvalidParameter("sealed blob serialization failed".into()))?;
        let path = self.paths.sealed_private(kid);
        fs::write(&path, raw)?;
        set_private_mode(&path)?;
        Ok(())
    }

    fn seal_private(&self, private_pem: &str, passphrase: &SecretString) -> Result<SealedBlob> {
        let salt = self.kdf.random_salt();
        let key = self.kdf.derive_key(passphrase.expose_secret(), &salt)?;
        let nonce = aead::gen_nonce();
        let cipher = AeadCipher::new(AeadAlg::AesGcm, &key);
        let ct = cipher.seal(&nonce, private_pem.as_bytes(), b"")?;
        Ok(SealedBlob {
            v: 1,
            alg: SEAL_ALG.into(),
            salt: b64e(&salt),
            nonce: b64e(nonce),
            ct: b64e(ct),
        })
    }

    pub fn load_public_pem(&self, kid: &str) -> Result<String> {
        let path = self.paths.public_pem(kid);
        if !path.exists() {
            return Err(DgError::KeyNotFound(kid.to_string()));
        }
        Ok(fs::read_to_string(path)?)
    }

    pub fn load_private_pem(
        &self,
        kid: &str,
        passphrase: &SecretString,
    ) -> Result<Zeroizing<String>> {
        let path = self.paths.sealed_private(kid);
        if !path.exists() {
            return Err(DgError::KeyNotFound(kid.to_string()));
        }
        assert_private_mode(&path)?;
        let raw = fs::read_to_string(&path)?;
        let blob: SealedBlob = serde_json::from_str(&raw)
            .map_err(|_| DgError::InvalidHeader("corrupt sealed key blob".into()))?;
        if blob.alg != SEAL_ALG {
            return Err(DgError::UnsupportedAlgorithm(format!(
                "unknown sealing algorithm: {}",
                blob.alg
            )));
        }
        let salt = b64d(&blob.salt)?;
        let nonce: [u8; NONCE_SIZE] = b64d(&blob.nonce)?
            .as_slice()
            .try_into()
            .map_err(|_| DgError::InvalidHeader("sealed blob nonce must be 12 bytes".into()))?;
        let ct = b64d(&blob.ct)?;
        let key = self.kdf.derive_key(passphrase.expose_secret(), &salt)?;
        let cipher = AeadCipher::new(AeadAlg::AesGcm, &key);
        let pem = cipher
            .open(&nonce, &ct, b"")
            .map_err(|_| DgError::InvalidPassphrase)?;
        match String::from_utf8(pem) {
            Ok(pem) => Ok(Zeroizing::new(pem)),
            Err(err) => {
                let mut bytes = err.into_bytes();
                bytes.zeroize();
                Err(DgError::InvalidPassphrase)
            }
        }
    }
}

#[cfg(unix)]
fn set_private_mode(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_private_mode(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn assert_private_mode(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = fs::metadata(path)?.permissions().mode() & 0o777;
    if mode & 0o077 != 0 {
        return Err(DgError::PolicyDenied(format!(
            "insecure permissions on sealed key file: {mode:o}"
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
fn assert_private_mode(_path: &Path) -> Result<()> {
    Ok(())
}
