//! RSA-OAEP key wrapping, Ed25519 signatures, and PEM codecs for every key
//! algorithm the store manages.
//!
//! RSA and Ed25519 keys ride the `pkcs8` trait impls of their crates. X25519
//! has no such impls, so its SubjectPublicKeyInfo / PKCS#8 documents are
//! assembled by hand (RFC 8410: the PKCS#8 private-key field wraps the raw
//! scalar in an inner OCTET STRING).

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use pkcs8::der::asn1::{BitStringRef, ObjectIdentifier, OctetStringRef};
use pkcs8::der::pem::LineEnding;
use pkcs8::der::{Decode, Document, Encode, SecretDocument};
use pkcs8::spki::{
    AlgorithmIdentifierRef, DecodePublicKey, EncodePublicKey, SubjectPublicKeyInfoRef,
};
use pkcs8::{DecodePrivateKey, EncodePrivateKey, PrivateKeyInfo};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret as X25519Secret};
use zeroize::Zeroizing;

use crate::error::{DgError, Result};

pub const RSA_KEY_BITS: usize = 3072;
pub const ED25519_SIGNATURE_LEN: usize = 64;

const X25519_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.110");
const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";
const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";

// ---------------------------------------------------------------------------
// RSA-OAEP
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OaepHash {
    /// Legacy; accepted on unwrap only.
    Sha1,
    Sha256,
    Sha512,
}

impl OaepHash {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SHA1" => Ok(OaepHash::Sha1),
            "SHA256" => Ok(OaepHash::Sha256),
            "SHA512" => Ok(OaepHash::Sha512),
            other => Err(DgError::UnsupportedAlgorithm(format!(
                "unknown OAEP hash: {other}"
            ))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OaepHash::Sha1 => "SHA1",
            OaepHash::Sha256 => "SHA256",
            OaepHash::Sha512 => "SHA512",
        }
    }

    fn padding(self) -> Oaep {
        match self {
            OaepHash::Sha1 => Oaep::new::<Sha1>(),
            OaepHash::Sha256 => Oaep::new::<Sha256>(),
            OaepHash::Sha512 => Oaep::new::<Sha512>(),
        }
    }
}

/// 3072-bit modulus, e = 65537.
pub fn gen_rsa() -> Result<RsaPrivateKey> {
    RsaPrivateKey::new(&mut rand::rngs::OsRng, RSA_KEY_BITS)
        .map_err(|_| DgError::InvalidParameter("RSA key generation failed".into()))
}

pub fn rsa_wrap(public: &RsaPublicKey, data: &[u8], hash: OaepHash) -> Result<Vec<u8>> {
    if hash == OaepHash::Sha1 {
        return Err(DgError::UnsupportedAlgorithm(
            "OAEP-SHA1 is unwrap-only".into(),
        ));
    }
    public
        .encrypt(&mut rand::rngs::OsRng, hash.padding(), data)
        .map_err(|_| DgError::InvalidParameter("RSA-OAEP wrap failed".into()))
}

pub fn rsa_unwrap(
    private: &RsaPrivateKey,
    ciphertext: &[u8],
    hash: OaepHash,
) -> Result<Zeroizing<Vec<u8>>> {
    private
        .decrypt(hash.padding(), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| DgError::InvalidCiphertext("RSA-OAEP unwrap failed".into()))
}

pub fn rsa_public_pem(key: &RsaPublicKey) -> Result<String> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|_| DgError::InvalidParameter("RSA public key encoding failed".into()))
}

pub fn rsa_from_public_pem(pem: &str) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .map_err(|_| DgError::UnsupportedAlgorithm("not an RSA public key".into()))
}

pub fn rsa_private_pem(key: &RsaPrivateKey) -> Result<Zeroizing<String>> {
    key.to_pkcs8_pem(LineEnding::LF)
        .map_err(|_| DgError::InvalidParameter("RSA private key encoding failed".into()))
}

pub fn rsa_from_private_pem(pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .map_err(|_| DgError::UnsupportedAlgorithm("not an RSA private key".into()))
}

// ---------------------------------------------------------------------------
// Ed25519
// ---------------------------------------------------------------------------

pub fn gen_ed25519() -> SigningKey {
    SigningKey::generate(&mut rand::rngs::OsRng)
}

pub fn ed_public_pem(key: &VerifyingKey) -> Result<String> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|_| DgError::InvalidParameter("Ed25519 public key encoding failed".into()))
}

pub fn ed_from_public_pem(pem: &str) -> Result<VerifyingKey> {
    VerifyingKey::from_public_key_pem(pem)
        .map_err(|_| DgError::UnsupportedAlgorithm("not an Ed25519 public key".into()))
}

pub fn ed_private_pem(key: &SigningKey) -> Result<Zeroizing<String>> {
    key.to_pkcs8_pem(LineEnding::LF)
        .map_err(|_| DgError::InvalidParameter("Ed25519 private key encoding failed".into()))
}

pub fn ed_from_private_pem(pem: &str) -> Result<SigningKey> {
    SigningKey::from_pkcs8_pem(pem)
        .map_err(|_| DgError::UnsupportedAlgorithm("not an Ed25519 private key".into()))
}

pub fn ed_sign(key: &SigningKey, data: &[u8]) -> [u8; ED25519_SIGNATURE_LEN] {
    key.sign(data).to_bytes()
}

pub fn ed_verify(key: &VerifyingKey, data: &[u8], signature: &[u8]) -> bool {
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(data, &signature).is_ok()
}

// ---------------------------------------------------------------------------
// X25519 (RFC 8410 documents assembled by hand)
// ---------------------------------------------------------------------------

fn x25519_algorithm() -> AlgorithmIdentifierRef<'static> {
    AlgorithmIdentifierRef {
        oid: X25519_OID,
        parameters: None,
    }
}

pub fn gen_x25519() -> X25519Secret {
    X25519Secret::random_from_rng(rand::rngs::OsRng)
}

pub fn x25519_public_pem(key: &X25519Public) -> Result<String> {
    let err = || DgError::InvalidParameter("X25519 public key encoding failed".into());
    let spki = SubjectPublicKeyInfoRef {
        algorithm: x25519_algorithm(),
        subject_public_key: BitStringRef::from_bytes(key.as_bytes()).map_err(|_| err())?,
    };
    let doc = Document::encode_msg(&spki).map_err(|_| err())?;
    doc.to_pem(PUBLIC_KEY_LABEL, LineEnding::LF).map_err(|_| err())
}

pub fn x25519_from_public_pem(pem: &str) -> Result<X25519Public> {
    let err = || DgError::UnsupportedAlgorithm("not an X25519 public key".into());
    let (label, doc) = Document::from_pem(pem).map_err(|_| err())?;
    if label != PUBLIC_KEY_LABEL {
        return Err(err());
    }
    let spki: SubjectPublicKeyInfoRef<'_> = doc.decode_msg().map_err(|_| err())?;
    if spki.algorithm.oid != X25519_OID {
        return Err(err());
    }
    let raw: [u8; 32] = spki
        .subject_public_key
        .raw_bytes()
        .try_into()
        .map_err(|_| err())?;
    Ok(X25519Public::from(raw))
}

pub fn x25519_private_pem(key: &X25519Secret) -> Result<Zeroizing<String>> {
    let err = || DgError::InvalidParameter("X25519 private key encoding failed".into());
    let scalar = Zeroizing::new(key.to_bytes());
    let inner = Zeroizing::new(
        OctetStringRef::new(scalar.as_ref())
            .and_then(|s| s.to_der())
            .map_err(|_| err())?,
    );
    let info = PrivateKeyInfo {
        algorithm: x25519_algorithm(),
        private_key: &inner,
        public_key: None,
    };
    let doc = SecretDocument::encode_msg(&info).map_err(|_| err())?;
    doc.to_pem(PRIVATE_KEY_LABEL, LineEnding::LF).map_err(|_| err())
}

pub fn x25519_from_private_pem(pem: &str) -> Result<X25519Secret> {
    let err = || DgError::UnsupportedAlgorithm("not an X25519 private key".into());
    let (label, doc) = SecretDocument::from_pem(pem).map_err(|_| err())?;
    if label != PRIVATE_KEY_LABEL {
        return Err(err());
    }
    let info: PrivateKeyInfo<'_> = doc.decode_msg().map_err(|_| err())?;
    if info.algorithm.oid != X25519_OID {
        return Err(err());
    }
    let inner = OctetStringRef::from_der(info.private_key).map_err(|_| err())?;
    let raw: [u8; 32] = inner.as_bytes().try_into().map_err(|_| err())?;
    Ok(X25519Secret::from(raw))
}
