//! Shared fixtures for the integration tests.
//!
//! RSA-3072 generation dominates test time, so the two fixture key pairs are
//! generated once per process and imported into each test's temp store. Tests
//! also run scrypt with a reduced cost parameter; the sealing format is
//! identical.

#![allow(dead_code)]

use std::path::Path;
use std::sync::OnceLock;

use dg_core::kdf::KdfParams;
use dg_core::{asymmetric, Context, DgConfig, KeyAlg, KeyManager, SecretString};

pub const PASS: &str = "Correct Horse 42";

pub fn secret(passphrase: &str) -> SecretString {
    SecretString::new(passphrase.to_string())
}

pub fn fast_kdf() -> KdfParams {
    KdfParams {
        n: 1 << 10,
        ..KdfParams::default()
    }
}

pub fn manager(root: &Path) -> KeyManager {
    let mut config = DgConfig::at(root);
    config.kdf = fast_kdf();
    KeyManager::open(&Context::new(config)).expect("open key manager")
}

/// Two RSA-3072 PEM pairs `(public, private)`, generated once per process.
pub fn rsa_fixture() -> &'static [(String, String); 2] {
    static KEYS: OnceLock<[(String, String); 2]> = OnceLock::new();
    KEYS.get_or_init(|| {
        let generate = || {
            let private = asymmetric::gen_rsa().expect("rsa keygen");
            let public_pem =
                asymmetric::rsa_public_pem(&private.to_public_key()).expect("public pem");
            let private_pem = asymmetric::rsa_private_pem(&private).expect("private pem");
            (public_pem, private_pem.to_string())
        };
        [generate(), generate()]
    })
}

pub fn import_rsa(keys: &KeyManager, pair: &(String, String), label: &str) -> String {
    keys.import(KeyAlg::Rsa, label, &pair.0, &pair.1, &secret(PASS))
        .expect("import rsa key")
}

/// Split an envelope file into its raw header line and parsed frames.
pub fn split_envelope(path: &Path) -> (Vec<u8>, Vec<(u32, Vec<u8>)>) {
    let blob = std::fs::read(path).expect("read envelope");
    let sep = blob
        .windows(2)
        .position(|w| w == b"\n\n")
        .expect("header separator");
    let header = blob[..sep].to_vec();
    let mut frames = Vec::new();
    let mut body = &blob[sep + 2..];
    while !body.is_empty() {
        let length = u32::from_be_bytes(body[..4].try_into().unwrap()) as usize;
        let index = u32::from_be_bytes(body[4..8].try_into().unwrap());
        frames.push((index, body[8..8 + length].to_vec()));
        body = &body[8 + length..];
    }
    (header, frames)
}

/// Parsed header JSON plus frames.
pub fn read_envelope(path: &Path) -> (serde_json::Value, Vec<(u32, Vec<u8>)>) {
    let (header, frames) = split_envelope(path);
    (
        serde_json::from_slice(&header).expect("parse header"),
        frames,
    )
}

/// Reassemble an envelope from a header line and frames.
pub fn join_envelope(header: &[u8], frames: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let mut out = header.to_vec();
    out.extend_from_slice(b"\n\n");
    for (index, payload) in frames {
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&index.to_be_bytes());
        out.extend_from_slice(payload);
    }
    out
}
