//! Detached Ed25519 signatures over raw file bytes, with a JSON metadata
//! sidecar next to the signature file.

use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::asymmetric;
use crate::codec::{b64d, b64e};
use crate::error::{DgError, Result};
use crate::lifecycle::KeyManager;

const SIGNATURE_ALG: &str = "Ed25519";

/// Sidecar `<sig>.json` written next to the signature file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignatureMetadata {
    pub v: u32,
    pub alg: String,
    pub kid: String,
}

pub struct SignerService<'a> {
    keys: &'a KeyManager,
}

impl<'a> SignerService<'a> {
    pub fn new(keys: &'a KeyManager) -> Self {
        SignerService { keys }
    }

    /// Sign the whole file; the signature lands as one URL-safe-Base64 line,
    /// the metadata as `<sig>.json`.
    pub fn sign_file(
        &self,
        input: &Path,
        sig_path: &Path,
        kid: &str,
        passphrase: &SecretString,
    ) -> Result<()> {
        self.keys.ensure_usable(kid)?;
        let data = fs::read(input)?;
        let signing = self.keys.load_ed25519_private(kid, passphrase)?;
        let signature = asymmetric::ed_sign(&signing, &data);
        fs::write(sig_path, b64e(signature))?;

        let metadata = SignatureMetadata {
            v: 1,
            alg: SIGNATURE_ALG.into(),
            kid: kid.to_string(),
        };
        let raw = serde_json::to_string_pretty(&metadata)
            .map_err(|_| DgError::InvalidParameter("metadata serialization failed".into()))?;
        fs::write(sidecar_path(sig_path), raw)?;
        Ok(())
    }

    /// Boolean verdict; structural problems surface as errors.
    pub fn verify_file(
        &self,
        input: &Path,
        sig_path: &Path,
        meta_path: Option<&Path>,
    ) -> Result<bool> {
        let data = fs::read(input)?;
        let sig_text = fs::read_to_string(sig_path)?;
        let signature = b64d(sig_text.trim())?;

        let sidecar = meta_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| sidecar_path(sig_path));
        let raw = fs::read_to_string(sidecar)?;
        let metadata: SignatureMetadata = serde_json::from_str(&raw)
            .map_err(|_| DgError::InvalidHeader("malformed signature metadata".into()))?;
        if metadata.alg != SIGNATURE_ALG {
            return Err(DgError::UnsupportedAlgorithm(format!(
                "unknown signature algorithm: {}",
                metadata.alg
            )));
        }
        let public = self.keys.load_ed25519_public(&metadata.kid)?;
        Ok(asymmetric::ed_verify(&public, &data, &signature))
    }
}

fn sidecar_path(sig_path: &Path) -> PathBuf {
    let mut name = sig_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".json");
    sig_path.with_file_name(name)
}
