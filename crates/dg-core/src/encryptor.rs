//! Hybrid envelope encryption: AEAD content under a fresh CEK, the CEK (or
//! its Shamir shares) wrapped once per recipient.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::debug;
use tokio::io::AsyncReadExt;
use zeroize::Zeroize;

use crate::aead::{self, AeadAlg, AeadCipher, ContentKey};
use crate::asymmetric::{self, OaepHash};
use crate::codec::b64e;
use crate::config::DgConfig;
use crate::ecc;
use crate::error::{DgError, Result};
use crate::header::{chunk_assoc, FileHeader, Recipient, WrapScheme, HEADER_VERSION};
use crate::lifecycle::KeyManager;
use crate::stream;
use crate::threshold;

/// Per-call options; `default()` mirrors the shipped configuration defaults.
#[derive(Clone, Debug)]
pub struct EncryptOptions {
    pub enc: WrapScheme,
    pub aead: AeadAlg,
    pub oaep_hash: OaepHash,
    /// `Some(k)` with `k > 1` splits the CEK into one share per recipient.
    pub threshold_k: Option<u8>,
    /// Caller-supplied associated data, committed via `aad_tag` and bound to
    /// every chunk.
    pub user_aad: Option<Vec<u8>>,
    pub chunk_size: u32,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        EncryptOptions {
            enc: WrapScheme::RsaOaep,
            aead: AeadAlg::AesGcm,
            oaep_hash: OaepHash::Sha256,
            threshold_k: None,
            user_aad: None,
            chunk_size: 1024 * 1024,
        }
    }
}

impl EncryptOptions {
    pub fn from_config(config: &DgConfig) -> Self {
        EncryptOptions {
            enc: WrapScheme::RsaOaep,
            aead: config.crypto.aead,
            oaep_hash: config.crypto.rsa_oaep_hash,
            threshold_k: None,
            user_aad: None,
            chunk_size: config.crypto.default_chunk_size,
        }
    }
}

pub struct Encryptor<'a> {
    keys: &'a KeyManager,
}

impl<'a> Encryptor<'a> {
    pub fn new(keys: &'a KeyManager) -> Self {
        Encryptor { keys }
    }

    pub async fn encrypt_file(
        &self,
        input: &Path,
        output: &Path,
        recipient_kids: &[String],
        opts: &EncryptOptions,
    ) -> Result<()> {
        if recipient_kids.is_empty() {
            return Err(DgError::InvalidParameter("empty recipient list".into()));
        }
        if opts.chunk_size == 0 {
            return Err(DgError::InvalidParameter(
                "chunk_size must be positive".into(),
            ));
        }
        let threshold = opts.threshold_k.filter(|k| *k > 1);
        if let Some(k) = opts.threshold_k {
            if k as usize > recipient_kids.len() {
                return Err(DgError::InvalidParameter(format!(
                    "threshold {k} exceeds recipient count {}",
                    recipient_kids.len()
                )));
            }
        }
        if threshold.is_some() && recipient_kids.len() > 255 {
            return Err(DgError::InvalidParameter(
                "threshold sharing supports at most 255 recipients".into(),
            ));
        }

        let cek = ContentKey::generate();
        let base_nonce = aead::gen_nonce();

        let shares = match threshold {
            Some(k) => Some(threshold::split_secret(
                cek.expose(),
                recipient_kids.len() as u8,
                k,
            )?),
            None => None,
        };

        let mut recipients = Vec::with_capacity(recipient_kids.len());
        for (position, kid) in recipient_kids.iter().enumerate() {
            self.keys.ensure_usable(kid)?;
            let (material, share_index): (&[u8], Option<u8>) = match &shares {
                Some(shares) => {
                    let (x, y) = &shares[position];
                    (&y[..], Some(*x))
                }
                None => (&cek.expose()[..], None),
            };
            recipients.push(self.wrap_for(kid, material, share_index, opts)?);
        }

        let total_size = tokio::fs::metadata(input).await?.len();
        let header = FileHeader {
            version: HEADER_VERSION.to_string(),
            aead: opts.aead,
            enc: opts.enc,
            nonce: b64e(base_nonce),
            recipients,
            created_at: self.keys.now(),
            chunked: true,
            chunk_size: Some(opts.chunk_size),
            total_size: Some(total_size),
            threshold,
            aad_tag: opts.user_aad.as_deref().map(FileHeader::aad_tag_for),
            kdf: None,
            salt: None,
        };

        let assoc_base = header.aad_bytes();
        let mut out = BufWriter::new(File::create(output)?);
        stream::write_header(&mut out, &header)?;

        let cipher = AeadCipher::new(opts.aead, cek.expose());
        let mut reader = tokio::fs::File::open(input).await?;
        let mut buf = vec![0u8; opts.chunk_size as usize];
        let mut index: u32 = 0;
        let mut wrote_any = false;
        loop {
            let n = read_full(&mut reader, &mut buf).await?;
            if n == 0 && wrote_any {
                break;
            }
            let nonce = aead::chunk_nonce(&base_nonce, index);
            let assoc = chunk_assoc(&assoc_base, opts.user_aad.as_deref(), index);
            let ct = cipher.seal(&nonce, &buf[..n], &assoc)?;
            stream::write_frame(&mut out, index, &ct)?;
            buf[..n].zeroize();
            wrote_any = true;
            if n < buf.len() {
                break;
            }
            index = index
                .checked_add(1)
                .ok_or_else(|| DgError::InvalidParameter("chunk counter exhausted".into()))?;
        }
        out.flush()?;
        debug!(
            "encrypted {total_size} byte(s) into {} chunk(s) for {} recipient(s)",
            u64::from(index) + 1,
            recipient_kids.len()
        );
        Ok(())
    }

    fn wrap_for(
        &self,
        kid: &str,
        material: &[u8],
        share_index: Option<u8>,
        opts: &EncryptOptions,
    ) -> Result<Recipient> {
        match opts.enc {
            WrapScheme::RsaOaep => {
                let public = self.keys.load_rsa_public(kid)?;
                let wrapped = asymmetric::rsa_wrap(&public, material, opts.oaep_hash)?;
                Ok(Recipient {
                    kid: kid.to_string(),
                    scheme: WrapScheme::RsaOaep,
                    ek: b64e(wrapped),
                    epk: None,
                    nonce: None,
                    share_index,
                })
            }
            WrapScheme::X25519Kem => {
                let public = self.keys.load_x25519_public(kid)?;
                let wrap = ecc::wrap_key(&public, material, opts.aead)?;
                Ok(Recipient {
                    kid: kid.to_string(),
                    scheme: WrapScheme::X25519Kem,
                    ek: b64e(wrap.ct),
                    epk: Some(b64e(wrap.epk_pem.as_bytes())),
                    nonce: Some(b64e(wrap.nonce)),
                    share_index,
                })
            }
        }
    }
}

async fn read_full(reader: &mut tokio::fs::File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
