//! Typed envelope header: validation, canonical serialization, legacy parse.
//!
//! Canonical form is compact JSON with sorted keys; `serde_json`'s default
//! object map is a BTreeMap, which gives the ordering for free. Legacy field
//! aliases are normalized on parse and never emitted.

use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::aead::{AeadAlg, NONCE_SIZE};
use crate::codec::{b64d, b64e};
use crate::error::{DgError, Result};
use crate::kdf::KdfParams;

pub const HEADER_VERSION: &str = "1";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WrapScheme {
    RsaOaep,
    X25519Kem,
}

impl WrapScheme {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "RSA-OAEP" => Ok(WrapScheme::RsaOaep),
            "X25519-KEM" => Ok(WrapScheme::X25519Kem),
            other => Err(DgError::UnsupportedAlgorithm(format!(
                "unknown key wrap scheme: {other}"
            ))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            WrapScheme::RsaOaep => "RSA-OAEP",
            WrapScheme::X25519Kem => "X25519-KEM",
        }
    }
}

/// One wrapped CEK (or share) for a given key id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recipient {
    pub kid: String,
    pub scheme: WrapScheme,
    /// Wrapped key material, URL-safe Base64.
    pub ek: String,
    /// X25519 only: ephemeral public key, Base64 of the PEM.
    pub epk: Option<String>,
    /// X25519 only: 12-byte wrap nonce, Base64.
    pub nonce: Option<String>,
    /// Share x-coordinate for threshold envelopes (1..=255).
    pub share_index: Option<u8>,
}

impl Recipient {
    pub fn validate(&self) -> Result<()> {
        if self.kid.is_empty() {
            return Err(DgError::InvalidHeader("recipient missing kid".into()));
        }
        if self.ek.is_empty() {
            return Err(DgError::InvalidHeader(
                "recipient missing wrapped key material".into(),
            ));
        }
        match self.scheme {
            WrapScheme::X25519Kem => {
                if self.epk.is_none() || self.nonce.is_none() {
                    return Err(DgError::InvalidHeader(
                        "X25519 recipient missing metadata".into(),
                    ));
                }
            }
            WrapScheme::RsaOaep => {
                if self.epk.is_some() || self.nonce.is_some() {
                    return Err(DgError::InvalidHeader(
                        "RSA recipient should not carry X25519 metadata".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("kid".into(), json!(self.kid));
        map.insert("scheme".into(), json!(self.scheme.name()));
        map.insert("ek".into(), json!(self.ek));
        if let Some(epk) = &self.epk {
            map.insert("epk".into(), json!(epk));
        }
        if let Some(nonce) = &self.nonce {
            map.insert("nonce".into(), json!(nonce));
        }
        if let Some(index) = self.share_index {
            map.insert("share_index".into(), json!(index));
        }
        Value::Object(map)
    }

    fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| DgError::InvalidHeader("recipient entry is not an object".into()))?;
        let kid = str_field(obj, "kid")
            .ok_or_else(|| DgError::InvalidHeader("recipient missing kid".into()))?;
        let scheme_name = str_field(obj, "scheme").unwrap_or_else(|| "RSA-OAEP".into());
        let scheme = WrapScheme::from_name(&scheme_name).map_err(|_| {
            DgError::InvalidHeader(format!("unsupported key wrap scheme: {scheme_name}"))
        })?;
        let ek = str_field(obj, "ek")
            .or_else(|| str_field(obj, "ek_b64"))
            .ok_or_else(|| DgError::InvalidHeader("recipient missing wrapped key".into()))?;
        let share_index = match obj.get("share_index") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                v.as_u64()
                    .filter(|x| (1..=255).contains(x))
                    .ok_or_else(|| DgError::InvalidHeader("invalid share_index".into()))?
                    as u8,
            ),
        };
        Ok(Recipient {
            kid,
            scheme,
            ek,
            epk: str_field(obj, "epk").or_else(|| str_field(obj, "epk_pem_b64")),
            nonce: str_field(obj, "nonce").or_else(|| str_field(obj, "nonce_b64")),
            share_index,
        })
    }
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .filter(|s| !s.is_empty())
}

/// Envelope header. Constructed at encryption time, immutable thereafter.
#[derive(Clone, Debug, PartialEq)]
pub struct FileHeader {
    pub version: String,
    pub aead: AeadAlg,
    pub enc: WrapScheme,
    /// Base content nonce: URL-safe Base64 of 12 bytes.
    pub nonce: String,
    pub recipients: Vec<Recipient>,
    pub created_at: u64,
    pub chunked: bool,
    pub chunk_size: Option<u32>,
    pub total_size: Option<u64>,
    pub threshold: Option<u8>,
    /// SHA-256 over the caller-supplied AAD, Base64.
    pub aad_tag: Option<String>,
    pub kdf: Option<KdfParams>,
    pub salt: Option<String>,
}

impl FileHeader {
    pub fn validate(&self) -> Result<()> {
        if self.version.is_empty() {
            return Err(DgError::InvalidHeader("missing header version".into()));
        }
        if self.version != HEADER_VERSION {
            return Err(DgError::InvalidHeader(format!(
                "unsupported header version: {}",
                self.version
            )));
        }
        if self.nonce.is_empty() {
            return Err(DgError::InvalidHeader("missing content nonce".into()));
        }
        self.nonce_bytes()?;
        if self.recipients.is_empty() {
            return Err(DgError::InvalidHeader(
                "header contains no recipients".into(),
            ));
        }
        for recipient in &self.recipients {
            recipient.validate()?;
        }
        if self.chunked && self.chunk_size.map_or(true, |size| size == 0) {
            return Err(DgError::InvalidHeader(
                "invalid chunk_size for chunked ciphertext".into(),
            ));
        }
        Ok(())
    }

    pub fn nonce_bytes(&self) -> Result<[u8; NONCE_SIZE]> {
        b64d(&self.nonce)?
            .as_slice()
            .try_into()
            .map_err(|_| DgError::InvalidHeader("content nonce must be 12 bytes".into()))
    }

    /// SHA-256 commitment to caller-supplied AAD, as stored in `aad_tag`.
    pub fn aad_tag_for(user_aad: &[u8]) -> String {
        b64e(Sha256::digest(user_aad))
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("version".into(), json!(self.version));
        map.insert("aead".into(), json!(self.aead.name()));
        map.insert("enc".into(), json!(self.enc.name()));
        map.insert("nonce".into(), json!(self.nonce));
        map.insert("created_at".into(), json!(self.created_at));
        map.insert("chunked".into(), json!(self.chunked));
        map.insert(
            "recipients".into(),
            Value::Array(self.recipients.iter().map(Recipient::to_value).collect()),
        );
        if let Some(size) = self.chunk_size {
            map.insert("chunk_size".into(), json!(size));
        }
        if let Some(size) = self.total_size {
            map.insert("total_size".into(), json!(size));
        }
        if let Some(k) = self.threshold {
            map.insert("threshold".into(), json!(k));
        }
        if let Some(tag) = &self.aad_tag {
            map.insert("aad_tag".into(), json!(tag));
        }
        if let Some(kdf) = &self.kdf {
            map.insert("kdf".into(), json!(kdf));
        }
        if let Some(salt) = &self.salt {
            map.insert("salt".into(), json!(salt));
        }
        Value::Object(map)
    }

    /// Canonical JSON: sorted keys, `,`/`:` separators, single line.
    pub fn to_json(&self) -> Result<String> {
        self.validate()?;
        Ok(self.to_value().to_string())
    }

    /// Header core authenticated with every content chunk: canonical JSON of
    /// `{version, aead, enc, nonce, created_at, chunked, chunk_size,
    /// threshold, salt}` with null fields omitted. Includes the base nonce.
    pub fn aad_bytes(&self) -> Vec<u8> {
        let mut map = Map::new();
        map.insert("version".into(), json!(self.version));
        map.insert("aead".into(), json!(self.aead.name()));
        map.insert("enc".into(), json!(self.enc.name()));
        map.insert("nonce".into(), json!(self.nonce));
        map.insert("created_at".into(), json!(self.created_at));
        map.insert("chunked".into(), json!(self.chunked));
        if let Some(size) = self.chunk_size {
            map.insert("chunk_size".into(), json!(size));
        }
        if let Some(k) = self.threshold {
            map.insert("threshold".into(), json!(k));
        }
        if let Some(salt) = &self.salt {
            map.insert("salt".into(), json!(salt));
        }
        Value::Object(map).to_string().into_bytes()
    }

    /// Parse, accepting legacy field aliases; emits only canonical names on
    /// re-serialization.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|_| DgError::InvalidHeader("malformed header JSON".into()))?;
        let obj = value
            .as_object()
            .ok_or_else(|| DgError::InvalidHeader("header is not a JSON object".into()))?;

        let version = match obj.get("version").or_else(|| obj.get("v")) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            None => HEADER_VERSION.to_string(),
            Some(_) => return Err(DgError::InvalidHeader("invalid version field".into())),
        };

        let aead_name = str_field(obj, "aead")
            .or_else(|| str_field(obj, "alg"))
            .unwrap_or_else(|| "AESGCM".into());
        let aead = AeadAlg::from_name(&aead_name)
            .map_err(|_| DgError::InvalidHeader(format!("unsupported AEAD: {aead_name}")))?;

        let enc_name = str_field(obj, "enc").unwrap_or_else(|| "RSA-OAEP".into());
        let enc = WrapScheme::from_name(&enc_name)
            .map_err(|_| DgError::InvalidHeader(format!("unsupported key wrap: {enc_name}")))?;

        let nonce = str_field(obj, "nonce")
            .or_else(|| str_field(obj, "content_nonce_b64"))
            .unwrap_or_default();

        let recipients = obj
            .get("recipients")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .map(Recipient::from_value)
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        let chunked = obj
            .get("chunked")
            .and_then(Value::as_bool)
            .or_else(|| obj.get("chunk").and_then(Value::as_bool))
            .unwrap_or(false);

        let chunk_size = match obj.get("chunk_size") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                v.as_u64()
                    .filter(|size| *size <= u32::MAX as u64)
                    .ok_or_else(|| DgError::InvalidHeader("invalid chunk_size".into()))?
                    as u32,
            ),
        };

        let threshold = match obj.get("threshold").or_else(|| obj.get("threshold_k")) {
            None | Some(Value::Null) => None,
            Some(v) => v
                .as_u64()
                .map(|k| {
                    if k > 255 {
                        Err(DgError::InvalidHeader("invalid threshold".into()))
                    } else {
                        Ok(k as u8)
                    }
                })
                .transpose()?
                .filter(|k| *k > 0),
        };

        let mut header = FileHeader {
            version,
            aead,
            enc,
            nonce,
            recipients,
            created_at: obj.get("created_at").and_then(Value::as_u64).unwrap_or(0),
            chunked,
            chunk_size,
            total_size: obj.get("total_size").and_then(Value::as_u64),
            threshold,
            aad_tag: str_field(obj, "aad_tag"),
            kdf: match obj.get("kdf") {
                None | Some(Value::Null) => None,
                Some(v) => Some(
                    serde_json::from_value::<KdfParams>(v.clone())
                        .map_err(|_| DgError::InvalidHeader("invalid kdf parameters".into()))?,
                ),
            },
            salt: str_field(obj, "salt"),
        };
        if !header.chunked {
            header.chunk_size = None;
        }
        header.validate()?;
        Ok(header)
    }
}

/// Per-chunk associated data: header core || caller AAD (if any) || be32(index).
pub fn chunk_assoc(header_aad: &[u8], user_aad: Option<&[u8]>, index: u32) -> Vec<u8> {
    let mut assoc =
        Vec::with_capacity(header_aad.len() + user_aad.map_or(0, <[u8]>::len) + 4);
    assoc.extend_from_slice(header_aad);
    if let Some(user) = user_aad {
        assoc.extend_from_slice(user);
    }
    assoc.extend_from_slice(&index.to_be_bytes());
    assoc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::b64e;

    fn sample_header() -> FileHeader {
        FileHeader {
            version: HEADER_VERSION.into(),
            aead: AeadAlg::AesGcm,
            enc: WrapScheme::RsaOaep,
            nonce: b64e([7u8; NONCE_SIZE]),
            recipients: vec![Recipient {
                kid: "rsa_0123456789".into(),
                scheme: WrapScheme::RsaOaep,
                ek: "d3JhcHBlZA".into(),
                epk: None,
                nonce: None,
                share_index: None,
            }],
            created_at: 1_700_000_000,
            chunked: true,
            chunk_size: Some(1_048_576),
            total_size: Some(11),
            threshold: None,
            aad_tag: None,
            kdf: None,
            salt: None,
        }
    }

    #[test]
    fn canonical_serialization_is_sorted_and_compact() {
        let header = sample_header();
        let json = header.to_json().unwrap();
        assert!(!json.contains(' '));
        assert!(!json.contains('\n'));
        // sorted top-level keys
        let aead_pos = json.find("\"aead\"").unwrap();
        let chunk_pos = json.find("\"chunk_size\"").unwrap();
        let version_pos = json.find("\"version\"").unwrap();
        assert!(aead_pos < chunk_pos && chunk_pos < version_pos);
    }

    #[test]
    fn reserialization_is_stable() {
        let header = sample_header();
        let once = header.to_json().unwrap();
        let parsed = FileHeader::from_json(&once).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.to_json().unwrap(), once);
    }

    #[test]
    fn aad_bytes_covers_the_core_and_includes_nonce() {
        let header = sample_header();
        let aad = String::from_utf8(header.aad_bytes()).unwrap();
        let expected = format!(
            "{{\"aead\":\"AESGCM\",\"chunk_size\":1048576,\"chunked\":true,\
             \"created_at\":1700000000,\"enc\":\"RSA-OAEP\",\"nonce\":\"{}\",\
             \"version\":\"1\"}}",
            header.nonce
        );
        assert_eq!(aad, expected);
        // recipients and total_size are not authenticated per chunk
        assert!(!aad.contains("recipients"));
        assert!(!aad.contains("total_size"));
    }

    #[test]
    fn any_header_field_change_alters_aad() {
        let header = sample_header();
        let mut other = header.clone();
        other.created_at += 1;
        assert_ne!(header.aad_bytes(), other.aad_bytes());
        let mut other = header.clone();
        other.aead = AeadAlg::ChaCha20;
        assert_ne!(header.aad_bytes(), other.aad_bytes());
    }

    #[test]
    fn legacy_aliases_are_accepted() {
        let nonce = b64e([1u8; NONCE_SIZE]);
        let raw = format!(
            "{{\"v\":1,\"alg\":\"chacha20\",\"enc\":\"X25519-KEM\",\
             \"content_nonce_b64\":\"{nonce}\",\"chunk\":true,\"chunk_size\":4096,\
             \"threshold_k\":2,\
             \"recipients\":[{{\"kid\":\"x25519_aaaaaaaaaa\",\"scheme\":\"X25519-KEM\",\
             \"ek_b64\":\"Y3Q\",\"epk_pem_b64\":\"cGVt\",\"nonce_b64\":\"bm9uY2U\",\
             \"share_index\":1}},\
             {{\"kid\":\"x25519_bbbbbbbbbb\",\"scheme\":\"X25519-KEM\",\
             \"ek_b64\":\"Y3Q\",\"epk_pem_b64\":\"cGVt\",\"nonce_b64\":\"bm9uY2U\",\
             \"share_index\":2}}]}}"
        );
        let header = FileHeader::from_json(&raw).unwrap();
        assert_eq!(header.version, "1");
        assert_eq!(header.aead, AeadAlg::ChaCha20);
        assert_eq!(header.enc, WrapScheme::X25519Kem);
        assert_eq!(header.nonce, nonce);
        assert!(header.chunked);
        assert_eq!(header.chunk_size, Some(4096));
        assert_eq!(header.threshold, Some(2));
        assert_eq!(header.recipients[0].ek, "Y3Q");
        assert_eq!(header.recipients[0].epk.as_deref(), Some("cGVt"));
        assert_eq!(header.recipients[1].share_index, Some(2));

        // canonical names only on re-emission
        let emitted = header.to_json().unwrap();
        for legacy in ["alg", "content_nonce_b64", "ek_b64", "epk_pem_b64", "threshold_k"] {
            assert!(!emitted.contains(&format!("\"{legacy}\"")), "leaked {legacy}");
        }
    }

    #[test]
    fn validation_rejects_bad_headers() {
        let mut header = sample_header();
        header.version = "2".into();
        assert!(matches!(header.validate(), Err(DgError::InvalidHeader(_))));

        let mut header = sample_header();
        header.recipients.clear();
        assert!(header.validate().is_err());

        let mut header = sample_header();
        header.nonce = b64e([0u8; 8]);
        assert!(header.validate().is_err());

        let mut header = sample_header();
        header.chunk_size = None;
        assert!(header.validate().is_err());

        let mut header = sample_header();
        header.recipients[0].epk = Some("cGVt".into());
        assert!(header.validate().is_err());
    }

    #[test]
    fn parse_rejects_unknown_enums() {
        let raw = "{\"version\":\"1\",\"aead\":\"AES-SIV\",\"nonce\":\"AAAA\",\"recipients\":[]}";
        assert!(matches!(
            FileHeader::from_json(raw),
            Err(DgError::InvalidHeader(_))
        ));
    }

    #[test]
    fn non_chunked_headers_drop_chunk_size() {
        let nonce = b64e([1u8; NONCE_SIZE]);
        let raw = format!(
            "{{\"version\":\"1\",\"aead\":\"AESGCM\",\"enc\":\"RSA-OAEP\",\"nonce\":\"{nonce}\",\
             \"chunked\":false,\"chunk_size\":4096,\
             \"recipients\":[{{\"kid\":\"rsa_aaaaaaaaaa\",\"scheme\":\"RSA-OAEP\",\"ek\":\"Y3Q\"}}]}}"
        );
        let header = FileHeader::from_json(&raw).unwrap();
        assert!(!header.chunked);
        assert_eq!(header.chunk_size, None);
    }

    #[test]
    fn chunk_assoc_layout() {
        let assoc = chunk_assoc(b"HDR", Some(b"AAD"), 0x0102_0304);
        assert_eq!(assoc, b"HDRAAD\x01\x02\x03\x04");
        let assoc = chunk_assoc(b"HDR", None, 1);
        assert_eq!(assoc, b"HDR\x00\x00\x00\x01");
    }
}
