//! Key lifecycle: creation, typed loaders, and the maintenance verbs
//! (expire, revoke, rotate, export, import).

use std::sync::Arc;

use ed25519_dalek::{SigningKey, VerifyingKey};
use log::info;
use rsa::{RsaPrivateKey, RsaPublicKey};
use secrecy::SecretString;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret as X25519Secret};
use zeroize::Zeroizing;

use crate::asymmetric;
use crate::config::{Clock, Context};
use crate::error::{DgError, Result};
use crate::keystore::{KeyAlg, KeyRecord, KeyStore};
use crate::policy;

pub struct KeyManager {
    store: KeyStore,
    clock: Arc<dyn Clock>,
}

impl KeyManager {
    pub fn open(ctx: &Context) -> Result<Self> {
        Ok(KeyManager {
            store: KeyStore::open(&ctx.config)?,
            clock: ctx.clock.clone(),
        })
    }

    pub fn new(store: KeyStore, clock: Arc<dyn Clock>) -> Self {
        KeyManager { store, clock }
    }

    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn list(&self) -> Result<Vec<KeyRecord>> {
        self.store.list()
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    pub fn create_rsa(&self, label: &str, passphrase: &SecretString) -> Result<String> {
        let private = asymmetric::gen_rsa()?;
        let public_pem = asymmetric::rsa_public_pem(&private.to_public_key())?;
        let private_pem = asymmetric::rsa_private_pem(&private)?;
        self.install(KeyAlg::Rsa, label, &public_pem, &private_pem, passphrase)
    }

    pub fn create_ed25519(&self, label: &str, passphrase: &SecretString) -> Result<String> {
        let private = asymmetric::gen_ed25519();
        let public_pem = asymmetric::ed_public_pem(&private.verifying_key())?;
        let private_pem = asymmetric::ed_private_pem(&private)?;
        self.install(KeyAlg::Ed25519, label, &public_pem, &private_pem, passphrase)
    }

    pub fn create_x25519(&self, label: &str, passphrase: &SecretString) -> Result<String> {
        let private = asymmetric::gen_x25519();
        let public_pem = asymmetric::x25519_public_pem(&X25519Public::from(&private))?;
        let private_pem = asymmetric::x25519_private_pem(&private)?;
        self.install(KeyAlg::X25519, label, &public_pem, &private_pem, passphrase)
    }

    fn install(
        &self,
        alg: KeyAlg,
        label: &str,
        public_pem: &str,
        private_pem: &str,
        passphrase: &SecretString,
    ) -> Result<String> {
        let kid = KeyStore::make_kid(alg, public_pem);
        self.store
            .write_keypair(&kid, public_pem, private_pem, passphrase)?;
        self.store.register(KeyRecord {
            kid: kid.clone(),
            alg,
            label: label.to_string(),
            created_at: self.clock.now(),
            expiry: None,
        })?;
        info!("created {} key {kid}", alg.as_str());
        Ok(kid)
    }

    // -----------------------------------------------------------------------
    // Typed loaders (the record's declared alg gates the parse)
    // -----------------------------------------------------------------------

    fn record_for(&self, kid: &str, alg: KeyAlg) -> Result<KeyRecord> {
        let record = self.store.get(kid)?;
        if record.alg != alg {
            return Err(DgError::UnsupportedAlgorithm(format!(
                "key {kid} is {}, expected {}",
                record.alg.as_str(),
                alg.as_str()
            )));
        }
        Ok(record)
    }

    pub fn load_rsa_public(&self, kid: &str) -> Result<RsaPublicKey> {
        self.record_for(kid, KeyAlg::Rsa)?;
        asymmetric::rsa_from_public_pem(&self.store.load_public_pem(kid)?)
    }

    pub fn load_rsa_private(&self, kid: &str, passphrase: &SecretString) -> Result<RsaPrivateKey> {
        self.record_for(kid, KeyAlg::Rsa)?;
        let pem = self.store.load_private_pem(kid, passphrase)?;
        asymmetric::rsa_from_private_pem(&pem)
    }

    pub fn load_x25519_public(&self, kid: &str) -> Result<X25519Public> {
        self.record_for(kid, KeyAlg::X25519)?;
        asymmetric::x25519_from_public_pem(&self.store.load_public_pem(kid)?)
    }

    pub fn load_x25519_private(
        &self,
        kid: &str,
        passphrase: &SecretString,
    ) -> Result<X25519Secret> {
        self.record_for(kid, KeyAlg::X25519)?;
        let pem = self.store.load_private_pem(kid, passphrase)?;
        asymmetric::x25519_from_private_pem(&pem)
    }

    pub fn load_ed25519_public(&self, kid: &str) -> Result<VerifyingKey> {
        self.record_for(kid, KeyAlg::Ed25519)?;
        asymmetric::ed_from_public_pem(&self.store.load_public_pem(kid)?)
    }

    pub fn load_ed25519_private(&self, kid: &str, passphrase: &SecretString) -> Result<SigningKey> {
        self.record_for(kid, KeyAlg::Ed25519)?;
        let pem = self.store.load_private_pem(kid, passphrase)?;
        asymmetric::ed_from_private_pem(&pem)
    }

    /// Usable = present and not past its advisory expiry.
    pub fn ensure_usable(&self, kid: &str) -> Result<()> {
        policy::ensure_key_usable(&self.store.get(kid)?, self.clock.now())
    }

    // -----------------------------------------------------------------------
    // Maintenance verbs
    // -----------------------------------------------------------------------

    pub fn set_expiry(&self, kid: &str, expiry: Option<u64>) -> Result<()> {
        self.store.set_expiry(kid, expiry)
    }

    /// Returns how many index entries were dropped.
    pub fn clean_expired(&self) -> Result<usize> {
        let removed = self.store.clean_expired(self.clock.now())?;
        if removed > 0 {
            info!("dropped {removed} expired key record(s)");
        }
        Ok(removed)
    }

    /// Removes the index entry and deletes both PEM and sealed blob.
    pub fn revoke(&self, kid: &str) -> Result<()> {
        self.store.remove(kid)?;
        info!("revoked key {kid}");
        Ok(())
    }

    /// New key pair of the same algorithm under a new kid; the old record is
    /// dropped from the index (files stay until revoked).
    pub fn rotate(&self, kid: &str, passphrase: &SecretString) -> Result<String> {
        let record = self.store.get(kid)?;
        let new_kid = match record.alg {
            KeyAlg::Rsa => self.create_rsa(&record.label, passphrase)?,
            KeyAlg::Ed25519 => self.create_ed25519(&record.label, passphrase)?,
            KeyAlg::X25519 => self.create_x25519(&record.label, passphrase)?,
        };
        self.store.unregister(kid)?;
        info!("rotated key {kid} -> {new_kid}");
        Ok(new_kid)
    }

    /// Unseal and hand back the PEM pair.
    pub fn export(
        &self,
        kid: &str,
        passphrase: &SecretString,
    ) -> Result<(String, Zeroizing<String>)> {
        self.store.get(kid)?;
        let public_pem = self.store.load_public_pem(kid)?;
        let private_pem = self.store.load_private_pem(kid, passphrase)?;
        Ok((public_pem, private_pem))
    }

    /// Seal an externally supplied PEM pair into the store. The kid derives
    /// from the public PEM, keeping the kid<->PEM invariant.
    pub fn import(
        &self,
        alg: KeyAlg,
        label: &str,
        public_pem: &str,
        private_pem: &str,
        passphrase: &SecretString,
    ) -> Result<String> {
        self.install(alg, label, public_pem, private_pem, passphrase)
    }
}
