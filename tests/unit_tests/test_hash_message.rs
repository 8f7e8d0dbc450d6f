// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bgpsec_rtr_rs::{
    bgpsec::{
        attr::{BgpsecPathAttr, SecurePathSegment, SignatureBlock, SignatureSegment},
        hash::{Nlri, build_origin_message, build_validation_message},
    },
    keys::status::ApiStatus,
    models::prefix::Prefix,
};

fn nlri(s: &str) -> Nlri {
    Nlri::unicast(Prefix::parse(s).expect("prefix"))
}

fn two_hop_attr() -> BgpsecPathAttr {
    BgpsecPathAttr::new(
        vec![
            SecurePathSegment::new(1, 0, 64501), // most recent
            SecurePathSegment::new(1, 0, 64500), // origin
        ],
        vec![SignatureBlock {
            algo_id: 1,
            segments: vec![
                SignatureSegment {
                    ski: [0xAA; 20],
                    signature: vec![0x11; 70],
                },
                SignatureSegment {
                    ski: [0xBB; 20],
                    signature: vec![0x22; 71],
                },
            ],
        }],
    )
}

#[test]
fn test_origin_message_layout() {
    let own = SecurePathSegment::new(1, 0, 64500);
    let n = nlri("192.0.2.0/24");
    let hm = build_origin_message(64501, &own, &n, 1);

    assert_eq!(hm.segment_count(), 1);
    assert!(hm.signature(0).is_none());
    assert_eq!(hm.digest_start(0), 0);

    // target(4) | pCount,flags,asn(6) | algo(1) | afi(2) safi(1) len(1)
    // prefix(3)
    let expected: Vec<u8> = [
        64501u32.to_be_bytes().as_slice(),
        &[1, 0],
        64500u32.to_be_bytes().as_slice(),
        &[1],
        &[0, 1, 1, 24],
        &[192, 0, 2],
    ]
    .concat();
    assert_eq!(hm.digest(0), expected.as_slice());
    assert_eq!(hm.buffer_len(), 4 + 6 + 1 + 4 + 3);
}

#[test]
fn test_origin_message_rewrites_head() {
    let own = SecurePathSegment::new(1, 0, 64500);
    let n = nlri("192.0.2.0/24");
    let mut hm = build_origin_message(64501, &own, &n, 1);

    hm.set_target(64999);
    hm.set_own_segment(&SecurePathSegment::new(2, 0x80, 64500));
    assert_eq!(&hm.digest(0)[..4], &64999u32.to_be_bytes());
    assert_eq!(&hm.digest(0)[4..6], &[2, 0x80]);
}

#[test]
fn test_validation_message_pointer_map() {
    let attr = two_hop_attr();
    let n = nlri("10.0.0.0/8");
    let hm = build_validation_message(65010, &attr, &n, 1).expect("build");

    assert_eq!(hm.segment_count(), 2);
    assert_eq!(hm.algorithm_id(), 1);

    // Every digest runs to the end of the buffer, and the newest
    // segment covers the most bytes.
    for i in 0..hm.segment_count() {
        assert_eq!(hm.digest_start(i) + hm.digest(i).len(), hm.buffer_len());
    }
    assert!(hm.digest(0).len() > hm.digest(1).len());

    // Digest 0 starts at our own ASN.
    assert_eq!(&hm.digest(0)[..4], &65010u32.to_be_bytes());
    // Digest 1 starts at the ASN of the most recent path segment.
    assert_eq!(&hm.digest(1)[..4], &64501u32.to_be_bytes());

    // The signature copies carry SKI, length and the raw bytes.
    let sig0 = hm.signature(0).expect("sig 0");
    assert_eq!(&sig0[..20], &[0xAA; 20]);
    assert_eq!(&sig0[20..22], &70u16.to_be_bytes());
    assert_eq!(&sig0[22..], vec![0x11; 70].as_slice());

    // The buffer tail is origin segment, algo id, then the NLRI.
    let tail_len = 6 + 1 + 4 + 1; // origin | algo | afi,safi,len | 1 prefix byte
    let tail = &hm.digest(1)[hm.digest(1).len() - tail_len..];
    assert_eq!(&tail[..6], &[1, 0, 0, 0, 0xFB, 0xF4]); // origin 64500
    assert_eq!(tail[6], 1);
    assert_eq!(&tail[7..], &[0, 1, 1, 8, 10]);
}

#[test]
fn test_validation_message_digest_one_is_suffix_of_digest_zero() {
    let attr = two_hop_attr();
    let n = nlri("10.0.0.0/8");
    let hm = build_validation_message(65010, &attr, &n, 1).expect("build");

    let d0 = hm.digest(0);
    let d1 = hm.digest(1);
    assert_eq!(&d0[d0.len() - d1.len()..], d1);
}

#[test]
fn test_unknown_algorithm_is_reported() {
    let attr = two_hop_attr();
    let n = nlri("10.0.0.0/8");
    match build_validation_message(65010, &attr, &n, 7) {
        Err(st) => assert!(st.contains(ApiStatus::ERR_UNSUPPORTED_ALGO)),
        Ok(_) => panic!("algorithm 7 must not resolve"),
    }
}

#[test]
fn test_segment_count_mismatch_is_syntax() {
    let mut attr = two_hop_attr();
    attr.blocks[0].segments.pop();
    let n = nlri("10.0.0.0/8");
    match build_validation_message(65010, &attr, &n, 1) {
        Err(st) => assert!(st.contains(ApiStatus::ERR_SYNTAX)),
        Ok(_) => panic!("mismatched counts must not build"),
    }
}

#[test]
fn test_empty_path_is_syntax() {
    let attr = BgpsecPathAttr::new(
        vec![],
        vec![SignatureBlock {
            algo_id: 1,
            segments: vec![],
        }],
    );
    let n = nlri("10.0.0.0/8");
    assert!(build_validation_message(65010, &attr, &n, 1).is_err());
}
