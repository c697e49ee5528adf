//! Explicit configuration and capabilities threaded through every service.
//!
//! There is no ambient state: the store location, KDF costs, crypto defaults,
//! clock and passphrase source all arrive through constructors.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use secrecy::SecretString;

use crate::aead::AeadAlg;
use crate::asymmetric::OaepHash;
use crate::error::Result;
use crate::kdf::KdfParams;

pub const STORE_DIR_ENV: &str = "DG_STORE_DIR";
pub const LOG_LEVEL_ENV: &str = "DG_LOG_LEVEL";

const DEFAULT_STORE_DIR: &str = ".data_guardian";

#[derive(Clone, Copy, Debug)]
pub struct CryptoDefaults {
    pub aead: AeadAlg,
    pub rsa_oaep_hash: OaepHash,
    pub default_chunk_size: u32,
}

impl Default for CryptoDefaults {
    fn default() -> Self {
        CryptoDefaults {
            aead: AeadAlg::AesGcm,
            rsa_oaep_hash: OaepHash::Sha256,
            default_chunk_size: 1024 * 1024,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DgConfig {
    pub store_dir: PathBuf,
    pub kdf: KdfParams,
    pub crypto: CryptoDefaults,
    /// Log filter requested via `DG_LOG_LEVEL`; the host installs the logger,
    /// the core only emits `log` records.
    pub log_level: Option<String>,
}

impl DgConfig {
    /// Defaults plus `DG_STORE_DIR` / `DG_LOG_LEVEL` overrides.
    pub fn from_env() -> Self {
        let store_dir = env::var_os(STORE_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(default_store_dir);
        DgConfig {
            store_dir,
            kdf: KdfParams::default(),
            crypto: CryptoDefaults::default(),
            log_level: env::var(LOG_LEVEL_ENV).ok(),
        }
    }

    pub fn at(store_dir: impl Into<PathBuf>) -> Self {
        DgConfig {
            store_dir: store_dir.into(),
            kdf: KdfParams::default(),
            crypto: CryptoDefaults::default(),
            log_level: None,
        }
    }
}

fn default_store_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_STORE_DIR)
}

pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Pinned clock for tests and replay tooling.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

/// Capability bundle handed to the top-level services.
#[derive(Clone)]
pub struct Context {
    pub config: DgConfig,
    pub clock: Arc<dyn Clock>,
}

impl Context {
    pub fn new(config: DgConfig) -> Self {
        Context {
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(config: DgConfig, clock: Arc<dyn Clock>) -> Self {
        Context { config, clock }
    }
}

/// Injected passphrase source; the library never reads a TTY itself.
pub trait PassphraseProvider {
    fn passphrase(&self, kid: &str) -> Result<SecretString>;
}

/// Same passphrase for every key.
pub struct StaticPassphrase(SecretString);

impl StaticPassphrase {
    pub fn new(passphrase: impl Into<String>) -> Self {
        StaticPassphrase(SecretString::new(passphrase.into()))
    }
}

impl PassphraseProvider for StaticPassphrase {
    fn passphrase(&self, _kid: &str) -> Result<SecretString> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipped_constants() {
        let defaults = CryptoDefaults::default();
        assert_eq!(defaults.aead, AeadAlg::AesGcm);
        assert_eq!(defaults.rsa_oaep_hash, OaepHash::Sha256);
        assert_eq!(defaults.default_chunk_size, 1_048_576);
    }

    #[test]
    fn fixed_clock_is_pinned() {
        assert_eq!(FixedClock(42).now(), 42);
    }
}
