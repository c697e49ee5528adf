//! Negative paths: tampering, truncation, reordering, missing keys.

mod common;

use common::*;
use dg_core::{
    AeadAlg, Decryptor, DgError, EncryptOptions, Encryptor, StaticPassphrase, WrapScheme,
};

struct Fixture {
    dir: tempfile::TempDir,
    keys: dg_core::KeyManager,
    envelope: std::path::PathBuf,
}

async fn encrypted_fixture(plaintext: &[u8], opts: &EncryptOptions) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let keys = manager(dir.path());
    let kid = keys.create_x25519("victim", &secret(PASS)).unwrap();

    let input = dir.path().join("in");
    std::fs::write(&input, plaintext).unwrap();
    let envelope = dir.path().join("in.dgd");
    let opts = EncryptOptions {
        enc: WrapScheme::X25519Kem,
        ..opts.clone()
    };
    Encryptor::new(&keys)
        .encrypt_file(&input, &envelope, &[kid], &opts)
        .await
        .unwrap();
    Fixture { dir, keys, envelope }
}

async fn decrypt(fixture: &Fixture, envelope: &std::path::Path) -> Result<Vec<u8>, DgError> {
    let provider = StaticPassphrase::new(PASS);
    let out = fixture.dir.path().join("out");
    Decryptor::new(&fixture.keys, &provider)
        .decrypt_file(envelope, &out, None)
        .await?;
    Ok(std::fs::read(&out).unwrap())
}

fn is_invalid(err: &DgError) -> bool {
    matches!(
        err,
        DgError::InvalidCiphertext(_) | DgError::InvalidHeader(_)
    )
}

#[tokio::test]
async fn header_field_tamper_invalidates_every_chunk() {
    let fixture = encrypted_fixture(b"bound to the header", &EncryptOptions::default()).await;
    let mut blob = std::fs::read(&fixture.envelope).unwrap();

    // alter one digit of created_at; the header still parses but the AAD
    // binding no longer matches
    let marker = b"\"created_at\":";
    let at = blob
        .windows(marker.len())
        .position(|w| w == marker)
        .unwrap()
        + marker.len();
    blob[at] = if blob[at] == b'1' { b'2' } else { b'1' };

    let tampered = fixture.dir.path().join("tampered.dgd");
    std::fs::write(&tampered, blob).unwrap();
    let err = decrypt(&fixture, &tampered).await.unwrap_err();
    assert!(is_invalid(&err), "got {err}");
}

#[tokio::test]
async fn chunk_body_tamper_is_fatal() {
    let fixture = encrypted_fixture(b"some protected bytes", &EncryptOptions::default()).await;
    let mut blob = std::fs::read(&fixture.envelope).unwrap();

    let last = blob.len() - 1;
    blob[last] ^= 0x01; // inside the tag of the last chunk
    let tampered = fixture.dir.path().join("tampered.dgd");
    std::fs::write(&tampered, blob).unwrap();
    let err = decrypt(&fixture, &tampered).await.unwrap_err();
    assert!(matches!(err, DgError::InvalidCiphertext(_)), "got {err}");
}

#[tokio::test]
async fn every_region_bitflip_fails() {
    let fixture = encrypted_fixture(b"sweep me", &EncryptOptions::default()).await;
    let blob = std::fs::read(&fixture.envelope).unwrap();

    // sample positions across header and body
    for at in [10, blob.len() / 2, blob.len() - 3] {
        let mut copy = blob.clone();
        copy[at] ^= 0x80;
        let tampered = fixture.dir.path().join("flip.dgd");
        std::fs::write(&tampered, copy).unwrap();
        let err = decrypt(&fixture, &tampered).await.unwrap_err();
        assert!(is_invalid(&err), "flip at {at}: got {err}");
    }
}

#[tokio::test]
async fn truncated_frame_is_invalid_header() {
    let fixture = encrypted_fixture(b"truncate me please", &EncryptOptions::default()).await;
    let blob = std::fs::read(&fixture.envelope).unwrap();

    // short payload
    let short = fixture.dir.path().join("short.dgd");
    std::fs::write(&short, &blob[..blob.len() - 3]).unwrap();
    let err = decrypt(&fixture, &short).await.unwrap_err();
    assert!(matches!(err, DgError::InvalidHeader(_)), "got {err}");

    // torn frame header
    let (header, frames) = split_envelope(&fixture.envelope);
    let mut torn = join_envelope(&header, &[]);
    torn.extend_from_slice(&(frames[0].1.len() as u32).to_be_bytes());
    torn.extend_from_slice(&frames[0].0.to_be_bytes()[..2]);
    let torn_path = fixture.dir.path().join("torn.dgd");
    std::fs::write(&torn_path, torn).unwrap();
    let err = decrypt(&fixture, &torn_path).await.unwrap_err();
    assert!(matches!(err, DgError::InvalidHeader(_)), "got {err}");
}

#[tokio::test]
async fn reordered_frames_are_rejected() {
    let opts = EncryptOptions {
        chunk_size: 8,
        ..EncryptOptions::default()
    };
    let fixture = encrypted_fixture(b"twenty-four byte input!!", &opts).await;
    let (header, mut frames) = split_envelope(&fixture.envelope);
    assert_eq!(frames.len(), 3);

    frames.swap(0, 1);
    let reordered = fixture.dir.path().join("reordered.dgd");
    std::fs::write(&reordered, join_envelope(&header, &frames)).unwrap();
    let err = decrypt(&fixture, &reordered).await.unwrap_err();
    assert!(matches!(err, DgError::InvalidHeader(_)), "got {err}");
}

#[tokio::test]
async fn renumbered_frames_fail_authentication() {
    let opts = EncryptOptions {
        chunk_size: 8,
        ..EncryptOptions::default()
    };
    let fixture = encrypted_fixture(b"twenty-four byte input!!", &opts).await;
    let (header, mut frames) = split_envelope(&fixture.envelope);

    // swap the payloads but keep the indices sequential: the per-chunk nonce
    // and AAD are derived from the index, so the tags cannot verify
    let (a, b) = (frames[0].1.clone(), frames[1].1.clone());
    frames[0].1 = b;
    frames[1].1 = a;
    let forged = fixture.dir.path().join("forged.dgd");
    std::fs::write(&forged, join_envelope(&header, &frames)).unwrap();
    let err = decrypt(&fixture, &forged).await.unwrap_err();
    assert!(matches!(err, DgError::InvalidCiphertext(_)), "got {err}");
}

#[tokio::test]
async fn no_matching_key_is_invalid_ciphertext() {
    let fixture = encrypted_fixture(b"not for you", &EncryptOptions::default()).await;

    let stranger_dir = tempfile::tempdir().unwrap();
    let stranger = manager(stranger_dir.path());
    stranger.create_x25519("stranger", &secret(PASS)).unwrap();

    let provider = StaticPassphrase::new(PASS);
    let out = stranger_dir.path().join("out");
    let err = Decryptor::new(&stranger, &provider)
        .decrypt_file(&fixture.envelope, &out, None)
        .await
        .unwrap_err();
    match err {
        DgError::InvalidCiphertext(msg) => assert!(msg.contains("no matching key"), "got {msg}"),
        other => panic!("expected InvalidCiphertext, got {other}"),
    }
}

#[tokio::test]
async fn wrong_passphrase_skips_recipient_until_exhaustion() {
    let fixture = encrypted_fixture(b"locked", &EncryptOptions::default()).await;
    let provider = StaticPassphrase::new("Wrong Horse 43");
    let out = fixture.dir.path().join("out");
    let err = Decryptor::new(&fixture.keys, &provider)
        .decrypt_file(&fixture.envelope, &out, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DgError::InvalidCiphertext(_)), "got {err}");
}

#[tokio::test]
async fn unexpected_aad_is_rejected() {
    let fixture = encrypted_fixture(b"no aad recorded", &EncryptOptions::default()).await;
    let provider = StaticPassphrase::new(PASS);
    let out = fixture.dir.path().join("out");
    let err = Decryptor::new(&fixture.keys, &provider)
        .decrypt_file(&fixture.envelope, &out, Some(b"surprise"))
        .await
        .unwrap_err();
    match err {
        DgError::InvalidCiphertext(msg) => assert!(msg.contains("unexpected AAD"), "got {msg}"),
        other => panic!("expected InvalidCiphertext, got {other}"),
    }
}

#[tokio::test]
async fn non_chunked_v1_variant_is_rejected() {
    let fixture = encrypted_fixture(b"chunked only", &EncryptOptions::default()).await;
    let (header_bytes, frames) = split_envelope(&fixture.envelope);
    let mut header: serde_json::Value = serde_json::from_slice(&header_bytes).unwrap();
    header["chunked"] = serde_json::Value::Bool(false);
    header.as_object_mut().unwrap().remove("chunk_size");

    let rewritten = fixture.dir.path().join("flat.dgd");
    std::fs::write(&rewritten, join_envelope(header.to_string().as_bytes(), &frames)).unwrap();
    let err = decrypt(&fixture, &rewritten).await.unwrap_err();
    match err {
        DgError::InvalidHeader(msg) => assert!(msg.contains("unsupported v1 variant"), "got {msg}"),
        other => panic!("expected InvalidHeader, got {other}"),
    }
}

#[tokio::test]
async fn aead_name_in_header_must_match_wrapped_key() {
    // forging the AEAD name breaks both the KEK wrap AAD path and the chunk
    // binding; either way nothing decrypts
    let fixture = encrypted_fixture(b"pinned cipher", &EncryptOptions::default()).await;
    let (header_bytes, frames) = split_envelope(&fixture.envelope);
    let text = String::from_utf8(header_bytes).unwrap();
    let forged = text.replace("\"AESGCM\"", "\"CHACHA20\"");
    assert_ne!(text, forged);

    let path = fixture.dir.path().join("forged.dgd");
    std::fs::write(&path, join_envelope(forged.as_bytes(), &frames)).unwrap();
    let err = decrypt(&fixture, &path).await.unwrap_err();
    assert!(is_invalid(&err), "got {err}");
}

#[tokio::test]
async fn aead_variants_roundtrip() {
    // sanity companion to the negative cases above
    for aead in [AeadAlg::AesGcm, AeadAlg::ChaCha20] {
        let opts = EncryptOptions {
            aead,
            ..EncryptOptions::default()
        };
        let fixture = encrypted_fixture(b"both ciphers work", &opts).await;
        let plaintext = decrypt(&fixture, &fixture.envelope.clone()).await.unwrap();
        assert_eq!(plaintext, b"both ciphers work");
    }
}
