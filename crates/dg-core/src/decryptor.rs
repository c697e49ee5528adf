//! Envelope decryption: recipient-try CEK recovery, then streamed chunk
//! authentication and decryption.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::debug;
use sha2::{Digest, Sha256};
use tokio::io::BufReader;
use zeroize::{Zeroize, Zeroizing};

use crate::aead::{self, AeadCipher, ContentKey, KEY_SIZE, MAX_CHUNKS, NONCE_SIZE, TAG_SIZE};
use crate::asymmetric::{self, OaepHash};
use crate::codec::{b64d, ct_eq};
use crate::config::PassphraseProvider;
use crate::ecc;
use crate::error::{DgError, Result};
use crate::header::{chunk_assoc, FileHeader, Recipient, WrapScheme};
use crate::lifecycle::KeyManager;
use crate::stream;
use crate::threshold;

/// Outcome of one recipient attempt. Failures that mean "this recipient is
/// not ours" continue the loop; only I/O failures abort it.
enum Unwrap {
    Unwrapped(Zeroizing<Vec<u8>>),
    Skipped,
}

pub struct Decryptor<'a> {
    keys: &'a KeyManager,
    passphrases: &'a dyn PassphraseProvider,
}

impl<'a> Decryptor<'a> {
    pub fn new(keys: &'a KeyManager, passphrases: &'a dyn PassphraseProvider) -> Self {
        Decryptor { keys, passphrases }
    }

    pub async fn decrypt_file(
        &self,
        input: &Path,
        output: &Path,
        user_aad: Option<&[u8]>,
    ) -> Result<()> {
        let mut reader = BufReader::new(tokio::fs::File::open(input).await?);
        let header = stream::read_header(&mut reader).await?;
        if !header.chunked {
            return Err(DgError::InvalidHeader("unsupported v1 variant".into()));
        }
        let base_nonce = header.nonce_bytes()?;

        // AAD commitment checks before any key material is touched.
        match (&header.aad_tag, user_aad) {
            (Some(tag), Some(user)) => {
                let expected = b64d(tag)?;
                let actual = Sha256::digest(user);
                if !ct_eq(&expected, &actual) {
                    return Err(DgError::InvalidCiphertext("AAD mismatch".into()));
                }
            }
            (Some(_), None) => {
                return Err(DgError::InvalidCiphertext("AAD required".into()));
            }
            (None, Some(_)) => {
                return Err(DgError::InvalidCiphertext("unexpected AAD".into()));
            }
            (None, None) => {}
        }

        let cek = self.recover_cek(&header)?;
        let cipher = AeadCipher::new(header.aead, cek.expose());
        let assoc_base = header.aad_bytes();
        let max_frame = header.chunk_size.unwrap_or(0) as usize + TAG_SIZE;

        let mut out = BufWriter::new(File::create(output)?);
        let mut expected: u32 = 0;
        let mut chunks: u64 = 0;
        while let Some((index, ct)) = stream::read_frame(&mut reader, max_frame).await? {
            if chunks >= MAX_CHUNKS {
                return Err(DgError::InvalidHeader("too many chunks".into()));
            }
            if index != expected {
                return Err(DgError::InvalidHeader(format!(
                    "frame out of order: expected {expected}, got {index}"
                )));
            }
            let nonce = aead::chunk_nonce(&base_nonce, index);
            let assoc = chunk_assoc(&assoc_base, user_aad, index);
            let mut plaintext = cipher
                .open(&nonce, &ct, &assoc)
                .map_err(|_| DgError::InvalidCiphertext(format!("AEAD tag failure at chunk {index}")))?;
            out.write_all(&plaintext)?;
            plaintext.zeroize();
            chunks += 1;
            expected = expected.wrapping_add(1);
        }
        out.flush()?;
        debug!("decrypted {chunks} chunk(s)");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // CEK recovery
    // -----------------------------------------------------------------------

    fn recover_cek(&self, header: &FileHeader) -> Result<ContentKey> {
        match header.threshold {
            Some(k) if k >= 2 => self.recover_threshold(header, k),
            _ => self.recover_direct(header),
        }
    }

    /// Recipients are tried in header order; the first success wins.
    fn recover_direct(&self, header: &FileHeader) -> Result<ContentKey> {
        for recipient in &header.recipients {
            match self.try_unwrap(header, recipient)? {
                Unwrap::Unwrapped(material) => {
                    let key: [u8; KEY_SIZE] = material.as_slice().try_into().map_err(|_| {
                        DgError::InvalidCiphertext("unwrapped CEK has wrong length".into())
                    })?;
                    return Ok(ContentKey::from_bytes(key));
                }
                Unwrap::Skipped => continue,
            }
        }
        Err(DgError::InvalidCiphertext("no matching key".into()))
    }

    fn recover_threshold(&self, header: &FileHeader, k: u8) -> Result<ContentKey> {
        let mut shares: Vec<(u8, [u8; threshold::SECRET_LEN])> = Vec::new();
        for (position, recipient) in header.recipients.iter().enumerate() {
            match self.try_unwrap(header, recipient)? {
                Unwrap::Unwrapped(material) => {
                    let y: [u8; threshold::SECRET_LEN] =
                        material.as_slice().try_into().map_err(|_| {
                            DgError::InvalidCiphertext("share has wrong length".into())
                        })?;
                    // Position fallback covers legacy headers that predate
                    // explicit share_index recording.
                    let x = recipient
                        .share_index
                        .unwrap_or_else(|| u8::try_from(position + 1).unwrap_or(u8::MAX));
                    shares.push((x, y));
                    if shares.len() >= k as usize {
                        break;
                    }
                }
                Unwrap::Skipped => continue,
            }
        }
        if shares.len() < k as usize {
            return Err(DgError::InvalidCiphertext(
                "insufficient shares to reconstruct CEK".into(),
            ));
        }
        let secret = threshold::combine_shares(&shares, k as usize)?;
        Ok(ContentKey::from_bytes(secret))
    }

    fn try_unwrap(&self, header: &FileHeader, recipient: &Recipient) -> Result<Unwrap> {
        match self.unwrap_recipient(header, recipient) {
            Ok(material) => Ok(Unwrap::Unwrapped(material)),
            Err(DgError::Io(e)) => Err(DgError::Io(e)),
            Err(_) => Ok(Unwrap::Skipped),
        }
    }

    fn unwrap_recipient(
        &self,
        header: &FileHeader,
        recipient: &Recipient,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let wrapped = b64d(&recipient.ek)?;
        match recipient.scheme {
            WrapScheme::RsaOaep => {
                let passphrase = self.passphrases.passphrase(&recipient.kid)?;
                let private = self.keys.load_rsa_private(&recipient.kid, &passphrase)?;
                // The OAEP hash is not recorded in the header: try the current
                // defaults first, then the legacy read-only ladder.
                for hash in [OaepHash::Sha256, OaepHash::Sha512, OaepHash::Sha1] {
                    if let Ok(material) = asymmetric::rsa_unwrap(&private, &wrapped, hash) {
                        return Ok(material);
                    }
                }
                Err(DgError::InvalidCiphertext("RSA-OAEP unwrap failed".into()))
            }
            WrapScheme::X25519Kem => {
                let epk = recipient
                    .epk
                    .as_ref()
                    .ok_or_else(|| DgError::InvalidHeader("X25519 recipient missing epk".into()))?;
                let wrap_nonce = recipient.nonce.as_ref().ok_or_else(|| {
                    DgError::InvalidHeader("X25519 recipient missing wrap nonce".into())
                })?;
                let epk_pem = String::from_utf8(b64d(epk)?)
                    .map_err(|_| DgError::InvalidHeader("ephemeral key is not UTF-8 PEM".into()))?;
                let nonce: [u8; NONCE_SIZE] =
                    b64d(wrap_nonce)?.as_slice().try_into().map_err(|_| {
                        DgError::InvalidHeader("wrap nonce must be 12 bytes".into())
                    })?;
                let passphrase = self.passphrases.passphrase(&recipient.kid)?;
                let private = self.keys.load_x25519_private(&recipient.kid, &passphrase)?;
                ecc::unwrap_key(&private, &epk_pem, &wrapped, &nonce, header.aead)
            }
        }
    }
}
