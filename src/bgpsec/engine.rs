// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! BGPsec path validation and signing over ECDSA P-256 / SHA-256.
//!
//! The engine is stateless: all key material comes from the stores the
//! caller passes in, and every invocation works on its own
//! [`HashMessage`]. Callers may therefore validate and sign from
//! multiple threads concurrently.
//!
//! Results follow the status-flag discipline: `validate` yields one of
//! `{Valid, Invalid, Error}` and `sign` one of `{Success, Failure}`,
//! with the reason carried in the [`ApiStatus`] word rather than in a
//! Rust error.

use p256::ecdsa::{
    Signature as EcdsaSignature,
    signature::{DigestSigner, DigestVerifier},
};
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use crate::{
    bgpsec::{
        attr::{BgpsecPathAttr, SecurePathSegment},
        hash::{HashMessage, Nlri, build_origin_message, build_validation_message},
    },
    keys::{
        status::ApiStatus,
        store::{KeyStore, PrivateKeyHandle, PublicKeyHandle, Ski},
    },
};

/// Outcome of a path validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid,
    Error,
}

/// Outcome of a signing batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignResult {
    Success,
    Failure,
}

/// Input and output of one validation call. The hash message is filled
/// in on first use and can be handed back for later reuse.
#[derive(Debug)]
pub struct ValidationData<'a> {
    /// Own AS, the target of the most recent signature.
    pub my_asn: u32,
    /// The BGPsec_PATH attribute exactly as on the wire.
    pub attr: &'a [u8],
    pub nlri: Nlri,
    pub status: ApiStatus,
    pub hash_message: Option<HashMessage>,
}

impl<'a> ValidationData<'a> {
    pub fn new(my_asn: u32, attr: &'a [u8], nlri: Nlri) -> Self {
        Self {
            my_asn,
            attr,
            nlri,
            status: ApiStatus::OK,
            hash_message: None,
        }
    }
}

/// A produced path signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub algo_id: u8,
    pub ski: Ski,
    pub bytes: Vec<u8>,
}

/// One entry of a signing batch.
#[derive(Debug)]
pub struct SignRequest {
    pub my_asn: u32,
    pub peer_asn: u32,
    /// The path segment this host contributes (pCount, flags, own ASN).
    pub my_segment: SecurePathSegment,
    pub ski: Ski,
    pub algo_id: u8,
    /// Required when no hash message is given (origin signing).
    pub nlri: Option<Nlri>,
    /// Reused from a prior validate / sign; rebuilt otherwise.
    pub hash_message: Option<HashMessage>,
    pub status: ApiStatus,
    pub signature: Option<Signature>,
}

impl SignRequest {
    pub fn origin(
        my_asn: u32,
        peer_asn: u32,
        my_segment: SecurePathSegment,
        ski: Ski,
        algo_id: u8,
        nlri: Nlri,
    ) -> Self {
        Self {
            my_asn,
            peer_asn,
            my_segment,
            ski,
            algo_id,
            nlri: Some(nlri),
            hash_message: None,
            status: ApiStatus::OK,
            signature: None,
        }
    }
}

/// Validate a BGPsec_PATH attribute against the public key store.
///
/// Signatures are checked newest to oldest. The signer of signature `i`
/// is the AS of secure-path segment `i`; its ASN sits in the digest
/// buffer at the start of digest `i+1` (for the origin, six bytes past
/// its own digest start). A missing key yields `Invalid` with the
/// `KEY_NOT_FOUND` info bit and stops further checks; a bad signature
/// yields `Invalid` with `SIGNATURE_MISMATCH` but the remaining
/// segments are still examined.
pub fn validate(
    pub_keys: &KeyStore<PublicKeyHandle>,
    data: &mut ValidationData<'_>,
    is_supported: impl Fn(u8) -> bool,
) -> ValidationResult {
    if data.attr.is_empty() {
        data.status |= ApiStatus::ERR_NO_DATA;
        return ValidationResult::Error;
    }

    let hash = match data.hash_message.take() {
        Some(h) => h,
        None => {
            let attr = match BgpsecPathAttr::parse(data.attr) {
                Ok(a) => a,
                Err(e) => {
                    debug!("BGPsec attribute rejected: {e}");
                    data.status |= e.status();
                    return ValidationResult::Error;
                },
            };
            let Some(algo_id) = attr
                .blocks
                .iter()
                .map(|b| b.algo_id)
                .find(|a| is_supported(*a))
            else {
                data.status |= ApiStatus::ERR_UNSUPPORTED_ALGO;
                return ValidationResult::Error;
            };
            match build_validation_message(data.my_asn, &attr, &data.nlri, algo_id) {
                Ok(h) => h,
                Err(st) => {
                    data.status |= st;
                    return ValidationResult::Error;
                },
            }
        },
    };

    let mut result = ValidationResult::Valid;
    let n = hash.segment_count();
    for i in 0..n {
        let signer_asn = signer_asn(&hash, i);
        let Some(sig_seg) = hash.signature(i) else {
            data.status |= ApiStatus::ERR_NO_DATA;
            data.hash_message = Some(hash);
            return ValidationResult::Error;
        };
        let mut ski = [0u8; 20];
        ski.copy_from_slice(&sig_seg[..20]);
        let sig_bytes = &sig_seg[22..];

        let candidates = pub_keys.lookup(signer_asn, &ski);
        if candidates.is_empty() {
            trace!(asn = signer_asn, "no key registered for signer");
            data.status |= ApiStatus::KEY_NOT_FOUND;
            result = ValidationResult::Invalid;
            break;
        }

        let verified = EcdsaSignature::from_der(sig_bytes).is_ok_and(|sig| {
            candidates.iter().any(|key| {
                let digest = Sha256::new_with_prefix(hash.digest(i));
                key.0.verify_digest(digest, &sig).is_ok()
            })
        });
        if !verified {
            data.status |= ApiStatus::SIGNATURE_MISMATCH;
            result = ValidationResult::Invalid;
        }
    }

    data.hash_message = Some(hash);
    result
}

/// Sign one request. On success the request carries the signature and
/// keeps the hash message for the next peer; on failure the status word
/// names the reason and the signature stays `None`.
pub fn sign_one(
    priv_keys: &KeyStore<PrivateKeyHandle>,
    req: &mut SignRequest,
    is_supported: impl Fn(u8) -> bool,
) -> SignResult {
    req.signature = None;

    if !is_supported(req.algo_id) {
        req.status |= ApiStatus::ERR_UNSUPPORTED_ALGO;
        return SignResult::Failure;
    }

    let mut hash = match req.hash_message.take() {
        Some(h) => h,
        None => {
            // No prior hash message means this host originates the
            // update, which needs the prefix.
            let Some(nlri) = req.nlri else {
                req.status |= ApiStatus::ERR_NO_DATA;
                return SignResult::Failure;
            };
            build_origin_message(req.peer_asn, &req.my_segment, &nlri, req.algo_id)
        },
    };

    // The target and the own path segment change per outgoing peer.
    hash.set_target(req.peer_asn);
    hash.set_own_segment(&req.my_segment);

    let keys = priv_keys.lookup(req.my_asn, &req.ski);
    let Some(key) = keys.first() else {
        req.status |= ApiStatus::KEY_NOT_FOUND | ApiStatus::ERR_KEY_IO;
        req.hash_message = Some(hash);
        return SignResult::Failure;
    };

    let digest = Sha256::new_with_prefix(hash.signing_digest());
    let sig: EcdsaSignature = key.0.sign_digest(digest);
    req.signature = Some(Signature {
        algo_id: req.algo_id,
        ski: req.ski,
        bytes: sig.to_der().as_bytes().to_vec(),
    });
    req.hash_message = Some(hash);
    SignResult::Success
}

/// The AS that produced signature `i` of the hash message.
fn signer_asn(hash: &HashMessage, i: usize) -> u32 {
    let n = hash.segment_count();
    let at = if i + 1 < n {
        hash.digest_start(i + 1)
    } else {
        // The origin segment follows its own digest start: ASN (4)
        // plus pCount/flags (2) of the preceding segment.
        hash.digest_start(i) + 6
    };
    let buf = hash.raw();
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}
