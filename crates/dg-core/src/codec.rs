//! Base64 and constant-time helpers shared across the envelope core.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use subtle::ConstantTimeEq;

use crate::error::{DgError, Result};

/// URL-safe Base64 without padding.
pub fn b64e(data: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// URL-safe Base64 decode. Stray `=` padding is tolerated.
pub fn b64d(value: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|_| DgError::InvalidHeader("invalid base64 payload".into()))
}

/// Byte equality for secret-bearing comparisons.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
