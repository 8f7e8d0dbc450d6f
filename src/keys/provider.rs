// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The pluggable crypto capability interface.
//!
//! The original design loads a shared library and resolves its entry
//! points by name; here the same contract is a trait object selected at
//! init time. Only one implementation ships: ECDSA P-256 with SHA-256
//! digests, algorithm suite id 1.

use std::sync::{
    Arc, Mutex, RwLock,
    atomic::{AtomicI32, Ordering},
};

use anyhow::{Result, bail};
use tracing::{debug, info};

use crate::{
    bgpsec::engine::{
        self, SignRequest, SignResult, ValidationData, ValidationResult,
    },
    cfg::config::CryptoConfig,
    keys::{
        status::ApiStatus,
        store::{
            BgpsecKey, KeySource, KeyStore, PrivateKeyHandle, PublicKeyHandle, Ski,
        },
    },
};

/// The algorithm suite identifier of ECDSA P-256 / SHA-256 (RFC 8608).
pub const ECDSA_P256_ALGO_ID: u8 = 1;

/// Crypto capability set: key registration, validation and signing.
///
/// Implementations must be safe for concurrent `validate` / `sign`
/// once `init` returned without error.
pub trait CryptoProvider: Send + Sync {
    /// Prepare the provider. A second call without `release` reports
    /// `INIT_ALREADY_DONE` and must not reinitialize any state.
    fn init(&self, init_value: Option<&str>, debug_level: i32) -> ApiStatus;

    /// Tear down; a following `init` starts fresh.
    fn release(&self) -> ApiStatus;

    fn is_algorithm_supported(&self, algo_id: u8) -> bool;

    /// Path validation per the engine contract. Returns `Error` iff an
    /// error bit ended up in `data.status`.
    fn validate(&self, data: &mut ValidationData<'_>) -> ValidationResult;

    /// Sign a batch. `Failure` iff at least one request carries an
    /// error bit afterwards.
    fn sign(&self, requests: &mut [SignRequest]) -> SignResult;

    fn register_public_key(&self, key: &BgpsecKey, source: KeySource) -> ApiStatus;
    fn unregister_public_key(
        &self,
        asn: u32,
        ski: &Ski,
        algo_id: u8,
        source: KeySource,
    ) -> ApiStatus;
    fn register_private_key(&self, key: &BgpsecKey) -> ApiStatus;
    fn unregister_private_key(&self, asn: u32, ski: &Ski, algo_id: u8) -> ApiStatus;

    /// Drop all public keys delivered by `source`.
    fn clean_keys(&self, source: KeySource) -> ApiStatus;

    /// Drop all private keys.
    fn clean_private_keys(&self) -> ApiStatus;

    fn debug_level(&self) -> i32;

    /// Set a new debug level, returning the previous one.
    fn set_debug_level(&self, level: i32) -> i32;
}

/// Resolve and initialize the capability object the loader config
/// names. An empty `library_name` selects the built-in ECDSA P-256
/// provider; the `method_*` entries of the old dynamic loader are
/// accepted but not needed for built-ins.
pub fn provider_from_config(cfg: &CryptoConfig) -> Result<Arc<dyn CryptoProvider>> {
    let provider: Arc<dyn CryptoProvider> = match cfg.library_name.as_str() {
        "" | "ecdsa-p256" => Arc::new(EcdsaP256Provider::new()),
        other => bail!("unknown crypto provider '{other}'"),
    };
    let init_value = (!cfg.init_value.is_empty()).then_some(cfg.init_value.as_str());
    let status = provider.init(init_value, cfg.debug_type);
    if status.is_error() {
        bail!("crypto provider init failed: {status:?}");
    }
    Ok(provider)
}

/// Built-in ECDSA P-256 provider backed by the bucketed key stores.
pub struct EcdsaP256Provider {
    initialized: Mutex<bool>,
    pub_keys: RwLock<KeyStore<PublicKeyHandle>>,
    priv_keys: RwLock<KeyStore<PrivateKeyHandle>>,
    debug_level: AtomicI32,
}

impl Default for EcdsaP256Provider {
    fn default() -> Self {
        Self::new()
    }
}

impl EcdsaP256Provider {
    pub fn new() -> Self {
        Self {
            initialized: Mutex::new(false),
            pub_keys: RwLock::new(KeyStore::new(ECDSA_P256_ALGO_ID)),
            priv_keys: RwLock::new(KeyStore::new(ECDSA_P256_ALGO_ID)),
            debug_level: AtomicI32::new(-1),
        }
    }
}

impl CryptoProvider for EcdsaP256Provider {
    fn init(&self, init_value: Option<&str>, debug_level: i32) -> ApiStatus {
        let mut initialized = match self.initialized.lock() {
            Ok(g) => g,
            Err(_) => return ApiStatus::ERR_USER1,
        };
        if *initialized {
            return ApiStatus::INIT_ALREADY_DONE;
        }
        *initialized = true;
        if debug_level >= 0 {
            self.debug_level.store(debug_level, Ordering::Relaxed);
        }
        info!(
            init_value = init_value.unwrap_or(""),
            "ECDSA P-256 provider initialized"
        );
        ApiStatus::OK
    }

    fn release(&self) -> ApiStatus {
        let mut initialized = match self.initialized.lock() {
            Ok(g) => g,
            Err(_) => return ApiStatus::ERR_USER1,
        };
        *initialized = false;
        if let Ok(mut store) = self.pub_keys.write() {
            store.clear();
        }
        if let Ok(mut store) = self.priv_keys.write() {
            store.clear();
        }
        debug!("ECDSA P-256 provider released");
        ApiStatus::OK
    }

    fn is_algorithm_supported(&self, algo_id: u8) -> bool {
        algo_id == ECDSA_P256_ALGO_ID
    }

    fn validate(&self, data: &mut ValidationData<'_>) -> ValidationResult {
        let store = match self.pub_keys.read() {
            Ok(s) => s,
            Err(_) => {
                data.status |= ApiStatus::ERR_USER1;
                return ValidationResult::Error;
            },
        };
        engine::validate(&store, data, |a| self.is_algorithm_supported(a))
    }

    fn sign(&self, requests: &mut [SignRequest]) -> SignResult {
        let store = match self.priv_keys.read() {
            Ok(s) => s,
            Err(_) => {
                for req in requests.iter_mut() {
                    req.status |= ApiStatus::ERR_USER1;
                }
                return SignResult::Failure;
            },
        };
        let mut overall = SignResult::Success;
        for req in requests.iter_mut() {
            let res = engine::sign_one(&store, req, |a| self.is_algorithm_supported(a));
            if res == SignResult::Failure || req.status.is_error() {
                overall = SignResult::Failure;
            }
        }
        overall
    }

    fn register_public_key(&self, key: &BgpsecKey, source: KeySource) -> ApiStatus {
        match self.pub_keys.write() {
            Ok(mut store) => store.register(key, source),
            Err(_) => ApiStatus::ERR_USER1,
        }
    }

    fn unregister_public_key(
        &self,
        asn: u32,
        ski: &Ski,
        algo_id: u8,
        source: KeySource,
    ) -> ApiStatus {
        match self.pub_keys.write() {
            Ok(mut store) => store.unregister(asn, ski, algo_id, source),
            Err(_) => ApiStatus::ERR_USER1,
        }
    }

    fn register_private_key(&self, key: &BgpsecKey) -> ApiStatus {
        use crate::keys::store::KEY_SOURCE_INTERNAL;
        match self.priv_keys.write() {
            Ok(mut store) => store.register(key, KEY_SOURCE_INTERNAL),
            Err(_) => ApiStatus::ERR_USER1,
        }
    }

    fn unregister_private_key(&self, asn: u32, ski: &Ski, algo_id: u8) -> ApiStatus {
        use crate::keys::store::KEY_SOURCE_INTERNAL;
        match self.priv_keys.write() {
            Ok(mut store) => store.unregister(asn, ski, algo_id, KEY_SOURCE_INTERNAL),
            Err(_) => ApiStatus::ERR_USER1,
        }
    }

    fn clean_keys(&self, source: KeySource) -> ApiStatus {
        match self.pub_keys.write() {
            Ok(mut store) => {
                let removed = store.unregister_source(source);
                debug!(removed, source, "cleaned public keys");
                ApiStatus::OK
            },
            Err(_) => ApiStatus::ERR_USER1,
        }
    }

    fn clean_private_keys(&self) -> ApiStatus {
        match self.priv_keys.write() {
            Ok(mut store) => {
                store.clear();
                ApiStatus::OK
            },
            Err(_) => ApiStatus::ERR_USER1,
        }
    }

    fn debug_level(&self) -> i32 {
        self.debug_level.load(Ordering::Relaxed)
    }

    fn set_debug_level(&self, level: i32) -> i32 {
        self.debug_level.swap(level, Ordering::Relaxed)
    }
}
