// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Origin signing against path validation with a real P-256 keypair.

use bgpsec_rtr_rs::{
    bgpsec::{
        attr::{BgpsecPathAttr, SecurePathSegment, SignatureBlock, SignatureSegment},
        engine::{SignRequest, SignResult, ValidationData, ValidationResult},
        hash::Nlri,
    },
    keys::{
        provider::{CryptoProvider, ECDSA_P256_ALGO_ID, EcdsaP256Provider},
        status::ApiStatus,
        store::{BgpsecKey, Ski},
    },
    models::prefix::Prefix,
};
use p256::{
    ecdsa::SigningKey,
    pkcs8::{EncodePrivateKey, EncodePublicKey},
};

const ORIGIN_ASN: u32 = 64500;
const PEER_ASN: u32 = 64501;
const TEST_SKI: Ski = [
    0x47, 0xF2, 0x3B, 0xF1, 0xAB, 0x2F, 0x8A, 0x9D, 0x26, 0x86, 0x4E, 0xBB, 0xD8,
    0xDF, 0x27, 0x11, 0xC7, 0x44, 0x06, 0xEC,
];

fn keypair() -> (Vec<u8>, Vec<u8>) {
    let mut scalar = [0u8; 32];
    scalar[0] = 0x2A;
    scalar[31] = 0x01;
    let signing = SigningKey::from_slice(&scalar).expect("scalar in range");
    let private = signing.to_pkcs8_der().expect("pkcs8").as_bytes().to_vec();
    let public = signing
        .verifying_key()
        .to_public_key_der()
        .expect("spki")
        .into_vec();
    (private, public)
}

fn provider_with_keys(register_public: bool) -> EcdsaP256Provider {
    let (private, public) = keypair();
    let provider = EcdsaP256Provider::new();
    provider.init(None, -1);
    let st = provider.register_private_key(&BgpsecKey {
        algo_id: ECDSA_P256_ALGO_ID,
        asn: ORIGIN_ASN,
        ski: TEST_SKI,
        der: private,
    });
    assert!(st.is_ok(), "private key registration failed: {st:?}");
    if register_public {
        let st = provider.register_public_key(
            &BgpsecKey {
                algo_id: ECDSA_P256_ALGO_ID,
                asn: ORIGIN_ASN,
                ski: TEST_SKI,
                der: public,
            },
            0,
        );
        assert!(st.is_ok(), "public key registration failed: {st:?}");
    }
    provider
}

fn origin_segment() -> SecurePathSegment {
    SecurePathSegment::new(1, 0, ORIGIN_ASN)
}

fn test_nlri() -> Nlri {
    Nlri::unicast(Prefix::parse("192.0.2.0/24").expect("prefix"))
}

/// Sign as the origin, wrap the signature into a path attribute and
/// validate it as the receiving peer.
#[test]
fn origin_sign_then_verify_is_valid() {
    let provider = provider_with_keys(true);

    let mut requests = [SignRequest::origin(
        ORIGIN_ASN,
        PEER_ASN,
        origin_segment(),
        TEST_SKI,
        ECDSA_P256_ALGO_ID,
        test_nlri(),
    )];
    assert_eq!(provider.sign(&mut requests), SignResult::Success);
    let signature = requests[0].signature.clone().expect("signature present");
    assert_eq!(signature.algo_id, ECDSA_P256_ALGO_ID);
    assert_eq!(signature.ski, TEST_SKI);

    let attr = BgpsecPathAttr::new(
        vec![origin_segment()],
        vec![SignatureBlock {
            algo_id: ECDSA_P256_ALGO_ID,
            segments: vec![SignatureSegment {
                ski: signature.ski,
                signature: signature.bytes,
            }],
        }],
    )
    .encode();

    let mut data = ValidationData::new(PEER_ASN, &attr, test_nlri());
    assert_eq!(provider.validate(&mut data), ValidationResult::Valid);
    assert!(data.status.is_ok(), "status: {:?}", data.status);
    assert!(data.hash_message.is_some(), "hash message is reusable");

    // Second validation round with the cached hash message.
    let hash = data.hash_message.take();
    let mut again = ValidationData::new(PEER_ASN, &attr, test_nlri());
    again.hash_message = hash;
    assert_eq!(provider.validate(&mut again), ValidationResult::Valid);
}

/// Same attribute against an empty public key store: Invalid with the
/// key-not-found bit, never an error.
#[test]
fn missing_public_key_is_invalid() {
    let signer = provider_with_keys(true);
    let mut requests = [SignRequest::origin(
        ORIGIN_ASN,
        PEER_ASN,
        origin_segment(),
        TEST_SKI,
        ECDSA_P256_ALGO_ID,
        test_nlri(),
    )];
    assert_eq!(signer.sign(&mut requests), SignResult::Success);
    let signature = requests[0].signature.clone().expect("signature");

    let attr = BgpsecPathAttr::new(
        vec![origin_segment()],
        vec![SignatureBlock {
            algo_id: ECDSA_P256_ALGO_ID,
            segments: vec![SignatureSegment {
                ski: signature.ski,
                signature: signature.bytes,
            }],
        }],
    )
    .encode();

    let verifier = EcdsaP256Provider::new();
    verifier.init(None, -1);
    let mut data = ValidationData::new(PEER_ASN, &attr, test_nlri());
    assert_eq!(verifier.validate(&mut data), ValidationResult::Invalid);
    assert!(data.status.contains(ApiStatus::KEY_NOT_FOUND));
    assert!(!data.status.is_error());
}

/// A tampered signature fails with the signature-mismatch bit.
#[test]
fn tampered_signature_is_invalid() {
    let provider = provider_with_keys(true);
    let mut requests = [SignRequest::origin(
        ORIGIN_ASN,
        PEER_ASN,
        origin_segment(),
        TEST_SKI,
        ECDSA_P256_ALGO_ID,
        test_nlri(),
    )];
    assert_eq!(provider.sign(&mut requests), SignResult::Success);
    let signature = requests[0].signature.clone().expect("signature");

    // Announce a different prefix than the one that was signed.
    let attr = BgpsecPathAttr::new(
        vec![origin_segment()],
        vec![SignatureBlock {
            algo_id: ECDSA_P256_ALGO_ID,
            segments: vec![SignatureSegment {
                ski: signature.ski,
                signature: signature.bytes,
            }],
        }],
    )
    .encode();
    let wrong_nlri = Nlri::unicast(Prefix::parse("198.51.100.0/24").expect("prefix"));

    let mut data = ValidationData::new(PEER_ASN, &attr, wrong_nlri);
    assert_eq!(provider.validate(&mut data), ValidationResult::Invalid);
    assert!(data.status.contains(ApiStatus::SIGNATURE_MISMATCH));
}

/// Origin signing without an NLRI cannot build the digest.
#[test]
fn origin_sign_without_nlri_fails() {
    let provider = provider_with_keys(false);
    let mut req = SignRequest::origin(
        ORIGIN_ASN,
        PEER_ASN,
        origin_segment(),
        TEST_SKI,
        ECDSA_P256_ALGO_ID,
        test_nlri(),
    );
    req.nlri = None;
    let mut requests = [req];
    assert_eq!(provider.sign(&mut requests), SignResult::Failure);
    assert!(requests[0].status.contains(ApiStatus::ERR_NO_DATA));
    assert!(requests[0].signature.is_none());
}

/// Signing with an unknown algorithm suite is refused.
#[test]
fn unsupported_algorithm_fails() {
    let provider = provider_with_keys(false);
    let mut requests = [SignRequest::origin(
        ORIGIN_ASN,
        PEER_ASN,
        origin_segment(),
        TEST_SKI,
        99,
        test_nlri(),
    )];
    assert_eq!(provider.sign(&mut requests), SignResult::Failure);
    assert!(requests[0].status.contains(ApiStatus::ERR_UNSUPPORTED_ALGO));
}

/// Signing without the private key is a failure with an error bit set.
#[test]
fn missing_private_key_fails() {
    let provider = EcdsaP256Provider::new();
    provider.init(None, -1);
    let mut requests = [SignRequest::origin(
        ORIGIN_ASN,
        PEER_ASN,
        origin_segment(),
        TEST_SKI,
        ECDSA_P256_ALGO_ID,
        test_nlri(),
    )];
    assert_eq!(provider.sign(&mut requests), SignResult::Failure);
    assert!(requests[0].status.contains(ApiStatus::KEY_NOT_FOUND));
    assert!(requests[0].status.is_error());
}

/// An unsupported validation attribute (no block with a known
/// algorithm) is an error, not merely invalid.
#[test]
fn unsupported_validation_algorithm_is_error() {
    let provider = provider_with_keys(true);
    let attr = BgpsecPathAttr::new(
        vec![origin_segment()],
        vec![SignatureBlock {
            algo_id: 99,
            segments: vec![SignatureSegment {
                ski: TEST_SKI,
                signature: vec![0; 70],
            }],
        }],
    )
    .encode();

    let mut data = ValidationData::new(PEER_ASN, &attr, test_nlri());
    assert_eq!(provider.validate(&mut data), ValidationResult::Error);
    assert!(data.status.contains(ApiStatus::ERR_UNSUPPORTED_ALGO));
}

/// The same hash message signed towards two peers produces different
/// digests, demonstrated by rewriting the buffer head.
#[test]
fn resigning_to_another_peer_changes_target() {
    let provider = provider_with_keys(true);
    let mut requests = [SignRequest::origin(
        ORIGIN_ASN,
        PEER_ASN,
        origin_segment(),
        TEST_SKI,
        ECDSA_P256_ALGO_ID,
        test_nlri(),
    )];
    assert_eq!(provider.sign(&mut requests), SignResult::Success);
    let first = requests[0].signature.clone().expect("signature");

    // Reuse the hash message towards a different peer.
    requests[0].peer_asn = 64999;
    assert_eq!(provider.sign(&mut requests), SignResult::Success);
    let second = requests[0].signature.clone().expect("signature");

    // The signed digest now targets another AS: the first signature
    // must not verify for the new target, the second one must.
    let attr = BgpsecPathAttr::new(
        vec![origin_segment()],
        vec![SignatureBlock {
            algo_id: ECDSA_P256_ALGO_ID,
            segments: vec![SignatureSegment {
                ski: first.ski,
                signature: first.bytes,
            }],
        }],
    )
    .encode();
    let mut data = ValidationData::new(64999, &attr, test_nlri());
    assert_eq!(provider.validate(&mut data), ValidationResult::Invalid);

    let attr = BgpsecPathAttr::new(
        vec![origin_segment()],
        vec![SignatureBlock {
            algo_id: ECDSA_P256_ALGO_ID,
            segments: vec![SignatureSegment {
                ski: second.ski,
                signature: second.bytes,
            }],
        }],
    )
    .encode();
    let mut data = ValidationData::new(64999, &attr, test_nlri());
    assert_eq!(provider.validate(&mut data), ValidationResult::Valid);
}
