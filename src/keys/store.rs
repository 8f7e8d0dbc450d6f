// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Bucketed storage for BGPsec router keys.
//!
//! Keys are addressed by the `(asn, ski)` pair. The bucket index is the
//! sum of the four ASN octets modulo 256, which spreads sequentially
//! assigned AS numbers evenly. One `(asn, ski)` point may hold several
//! DER blobs at once: SKI collisions are legal and the verifier simply
//! tries every candidate.
//!
//! DER material is validated when it is registered; the decoded key
//! handle is built lazily on first lookup and cached.

use once_cell::sync::OnceCell;
use p256::{
    SecretKey,
    ecdsa::{SigningKey, VerifyingKey},
    pkcs8::{DecodePrivateKey, DecodePublicKey},
};

use crate::keys::status::ApiStatus;

/// Subject key identifier, 20 octets.
pub type Ski = [u8; 20];

/// Tag identifying which loader produced a key; enables bulk cleanup
/// when a source is reconfigured.
pub type KeySource = u8;

/// Source tag for keys registered by the library itself.
pub const KEY_SOURCE_INTERNAL: KeySource = 0;

/// Cap on DER blobs stored under one `(asn, ski)` identity.
const MAX_KEYS_PER_IDENT: usize = 0xFFFF;

const BUCKET_COUNT: usize = 256;

/// A router key as handed to the store: identity plus the DER blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgpsecKey {
    pub algo_id: u8,
    pub asn: u32,
    pub ski: Ski,
    pub der: Vec<u8>,
}

/// Key material that can be decoded out of a DER blob.
pub trait KeyMaterial: Clone + Send + Sync + Sized {
    fn decode(der: &[u8]) -> Option<Self>;
}

/// Decoded ECDSA P-256 public key.
#[derive(Debug, Clone)]
pub struct PublicKeyHandle(pub VerifyingKey);

impl KeyMaterial for PublicKeyHandle {
    fn decode(der: &[u8]) -> Option<Self> {
        // SubjectPublicKeyInfo first (what the RTR Router Key PDU and the
        // key vault deliver), raw SEC1 point as a fallback.
        VerifyingKey::from_public_key_der(der)
            .ok()
            .or_else(|| VerifyingKey::from_sec1_bytes(der).ok())
            .map(PublicKeyHandle)
    }
}

/// Decoded ECDSA P-256 private key.
#[derive(Debug, Clone)]
pub struct PrivateKeyHandle(pub SigningKey);

impl KeyMaterial for PrivateKeyHandle {
    fn decode(der: &[u8]) -> Option<Self> {
        SigningKey::from_pkcs8_der(der)
            .ok()
            .or_else(|| SecretKey::from_sec1_der(der).ok().map(SigningKey::from))
            .map(PrivateKeyHandle)
    }
}

#[derive(Debug)]
struct KeyEntry<K> {
    source: KeySource,
    der: Vec<u8>,
    decoded: OnceCell<K>,
}

#[derive(Debug)]
struct KeyChain<K> {
    asn: u32,
    ski: Ski,
    entries: Vec<KeyEntry<K>>,
}

/// One store instance per key category (public / private). The
/// algorithm ID is fixed at creation; keys for any other suite are
/// rejected.
#[derive(Debug)]
pub struct KeyStore<K> {
    algo_id: u8,
    buckets: Vec<Vec<KeyChain<K>>>,
    size: usize,
}

impl<K: KeyMaterial> KeyStore<K> {
    pub fn new(algo_id: u8) -> Self {
        Self {
            algo_id,
            buckets: (0..BUCKET_COUNT).map(|_| Vec::new()).collect(),
            size: 0,
        }
    }

    #[inline]
    pub fn algorithm_id(&self) -> u8 {
        self.algo_id
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    fn bucket(asn: u32) -> usize {
        let sum = (asn >> 24) + ((asn >> 16) & 0xFF) + ((asn >> 8) & 0xFF) + (asn & 0xFF);
        (sum & 0xFF) as usize
    }

    /// Store a clone of `key`. The DER blob must decode or the key is
    /// rejected with `ERR_INVALID_KEY`; a blob already present under the
    /// same identity and source reports `DUPLICATE` without storing.
    pub fn register(&mut self, key: &BgpsecKey, source: KeySource) -> ApiStatus {
        if key.der.is_empty() {
            return ApiStatus::ERR_NO_DATA;
        }
        if key.algo_id != self.algo_id {
            return ApiStatus::ERR_INVALID_KEY;
        }
        let Some(decoded) = K::decode(&key.der) else {
            return ApiStatus::ERR_INVALID_KEY;
        };

        let bucket = &mut self.buckets[Self::bucket(key.asn)];
        let chain = match bucket
            .iter_mut()
            .position(|c| c.asn == key.asn && c.ski == key.ski)
        {
            Some(pos) => &mut bucket[pos],
            None => {
                bucket.push(KeyChain {
                    asn: key.asn,
                    ski: key.ski,
                    entries: Vec::with_capacity(1),
                });
                let last = bucket.len() - 1;
                &mut bucket[last]
            },
        };

        if chain
            .entries
            .iter()
            .any(|e| e.source == source && e.der == key.der)
        {
            return ApiStatus::DUPLICATE;
        }
        if chain.entries.len() >= MAX_KEYS_PER_IDENT {
            return ApiStatus::ERR_INSUFFICIENT_KEY_STORAGE;
        }

        let cell = OnceCell::new();
        let _ = cell.set(decoded);
        chain.entries.push(KeyEntry {
            source,
            der: key.der.clone(),
            decoded: cell,
        });
        self.size += 1;
        ApiStatus::OK
    }

    /// Remove every blob stored under `(asn, ski)` for `source`.
    pub fn unregister(
        &mut self,
        asn: u32,
        ski: &Ski,
        algo_id: u8,
        source: KeySource,
    ) -> ApiStatus {
        if algo_id != self.algo_id {
            return ApiStatus::ERR_INVALID_KEY;
        }
        let bucket = &mut self.buckets[Self::bucket(asn)];
        let mut removed = 0;
        if let Some(pos) = bucket
            .iter_mut()
            .position(|c| c.asn == asn && c.ski == *ski)
        {
            let chain = &mut bucket[pos];
            let before = chain.entries.len();
            chain.entries.retain(|e| e.source != source);
            removed = before - chain.entries.len();
            if chain.entries.is_empty() {
                bucket.swap_remove(pos);
            }
        }
        self.size -= removed;
        if removed == 0 {
            ApiStatus::KEY_NOT_FOUND
        } else {
            ApiStatus::OK
        }
    }

    /// Drop every key registered by `source`, returning the count.
    pub fn unregister_source(&mut self, source: KeySource) -> usize {
        let mut removed = 0;
        for bucket in &mut self.buckets {
            for chain in bucket.iter_mut() {
                let before = chain.entries.len();
                chain.entries.retain(|e| e.source != source);
                removed += before - chain.entries.len();
            }
            bucket.retain(|c| !c.entries.is_empty());
        }
        self.size -= removed;
        removed
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.size = 0;
    }

    /// All decoded handles registered under `(asn, ski)`. More than one
    /// element means an SKI collision; the caller tries each in turn.
    pub fn lookup(&self, asn: u32, ski: &Ski) -> Vec<K> {
        let bucket = &self.buckets[Self::bucket(asn)];
        let Some(chain) = bucket.iter().find(|c| c.asn == asn && c.ski == *ski) else {
            return Vec::new();
        };
        chain
            .entries
            .iter()
            .filter_map(|e| {
                e.decoded
                    .get_or_try_init(|| K::decode(&e.der).ok_or(()))
                    .ok()
                    .cloned()
            })
            .collect()
    }
}
