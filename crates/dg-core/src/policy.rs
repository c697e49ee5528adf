//! Advisory policy gates applied before key material is used.

use crate::error::{DgError, Result};
use crate::keystore::KeyRecord;

/// Expiry is advisory index metadata; this gate is where it becomes
/// enforceable. Decryption paths deliberately do not call it.
pub fn ensure_key_usable(record: &KeyRecord, now: u64) -> Result<()> {
    if let Some(expiry) = record.expiry {
        if expiry <= now {
            return Err(DgError::PolicyDenied(format!("key expired: {}", record.kid)));
        }
    }
    Ok(())
}

/// Minimum strength for interactively chosen passphrases. Hosts call this
/// before sealing; the store itself accepts any non-empty passphrase so
/// existing blobs always round-trip.
pub fn check_passphrase_strength(passphrase: &str) -> Result<()> {
    let has_alpha = passphrase.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = passphrase.chars().any(|c| c.is_ascii_digit());
    if passphrase.len() < 8 || !has_alpha || !has_digit {
        return Err(DgError::InvalidParameter(
            "passphrase too weak: require >= 8 characters, letters and digits".into(),
        ));
    }
    Ok(())
}
