//! X25519 KEM: ephemeral-static ECDH, HKDF-SHA256 KEK derivation, AEAD wrap
//! of the CEK (or of one Shamir share standing in for it).

use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret as X25519Secret};
use zeroize::Zeroizing;

use crate::aead::{self, AeadAlg, AeadCipher, KEY_SIZE, NONCE_SIZE};
use crate::asymmetric::{x25519_from_public_pem, x25519_public_pem};
use crate::error::Result;

/// HKDF info label binding derived KEKs to this scheme.
const KEK_INFO: &[u8] = b"DG-X25519-CEK";

/// Output of wrapping key material to one recipient.
pub struct X25519Wrap {
    /// Ephemeral public key, PEM SubjectPublicKeyInfo.
    pub epk_pem: String,
    /// AEAD ciphertext of the wrapped key material (includes tag).
    pub ct: Vec<u8>,
    /// Fresh wrap nonce.
    pub nonce: [u8; NONCE_SIZE],
}

fn derive_kek(shared: &[u8]) -> Zeroizing<[u8; KEY_SIZE]> {
    let hk = Hkdf::<Sha256>::new(None, shared);
    let mut kek = Zeroizing::new([0u8; KEY_SIZE]);
    hk.expand(KEK_INFO, &mut kek[..]).expect("HKDF expand");
    kek
}

pub fn wrap_key(recipient: &X25519Public, key_material: &[u8], alg: AeadAlg) -> Result<X25519Wrap> {
    let ephemeral = X25519Secret::random_from_rng(rand::rngs::OsRng);
    let ephemeral_public = X25519Public::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient);
    let kek = derive_kek(shared.as_bytes());
    let cipher = AeadCipher::new(alg, &kek);
    let nonce = aead::gen_nonce();
    // The raw ephemeral public key doubles as the wrap AAD.
    let ct = cipher.seal(&nonce, key_material, ephemeral_public.as_bytes())?;
    Ok(X25519Wrap {
        epk_pem: x25519_public_pem(&ephemeral_public)?,
        ct,
        nonce,
    })
}

pub fn unwrap_key(
    recipient: &X25519Secret,
    epk_pem: &str,
    ct: &[u8],
    nonce: &[u8; NONCE_SIZE],
    alg: AeadAlg,
) -> Result<Zeroizing<Vec<u8>>> {
    let ephemeral_public = x25519_from_public_pem(epk_pem)?;
    let shared = recipient.diffie_hellman(&ephemeral_public);
    let kek = derive_kek(shared.as_bytes());
    let cipher = AeadCipher::new(alg, &kek);
    cipher
        .open(nonce, ct, ephemeral_public.as_bytes())
        .map(Zeroizing::new)
}
