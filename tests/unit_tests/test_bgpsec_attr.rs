// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bgpsec_rtr_rs::bgpsec::attr::{
    ATTR_FLAG_EXT_LENGTH, AttrError, BgpsecPathAttr, SecurePathSegment, SignatureBlock,
    SignatureSegment,
};

fn sample_attr(sig_len: usize) -> BgpsecPathAttr {
    BgpsecPathAttr::new(
        vec![
            SecurePathSegment::new(1, 0, 64501),
            SecurePathSegment::new(1, 0, 64500),
        ],
        vec![SignatureBlock {
            algo_id: 1,
            segments: vec![
                SignatureSegment {
                    ski: [0xAA; 20],
                    signature: vec![0x11; sig_len],
                },
                SignatureSegment {
                    ski: [0xBB; 20],
                    signature: vec![0x22; sig_len],
                },
            ],
        }],
    )
}

#[test]
fn test_roundtrip_short_form() {
    let attr = sample_attr(40);
    let wire = attr.encode();
    assert_eq!(wire[0] & ATTR_FLAG_EXT_LENGTH, 0, "short length expected");
    let parsed = BgpsecPathAttr::parse(&wire).expect("parse");
    assert_eq!(parsed.secure_path, attr.secure_path);
    assert_eq!(parsed.blocks, attr.blocks);
    assert_eq!(parsed.encode(), wire);
}

#[test]
fn test_roundtrip_extended_length() {
    // Fat signatures push the body over 255 bytes.
    let attr = sample_attr(120);
    let wire = attr.encode();
    assert_ne!(wire[0] & ATTR_FLAG_EXT_LENGTH, 0, "extended length expected");
    let parsed = BgpsecPathAttr::parse(&wire).expect("parse");
    assert_eq!(parsed, {
        let mut a = attr;
        a.flags |= ATTR_FLAG_EXT_LENGTH;
        a
    });
}

#[test]
fn test_algorithm_ids() {
    let mut attr = sample_attr(40);
    assert_eq!(attr.algorithm_ids(), (1, 0));
    attr.blocks.push(SignatureBlock {
        algo_id: 2,
        segments: vec![],
    });
    assert_eq!(attr.algorithm_ids(), (1, 2));
}

#[test]
fn test_declared_length_mismatch() {
    let mut wire = sample_attr(40).encode();
    wire.pop();
    assert!(matches!(
        BgpsecPathAttr::parse(&wire),
        Err(AttrError::LengthMismatch { .. })
    ));
}

#[test]
fn test_zero_block_length_rejected() {
    // Secure path with one segment, then a signature block whose length
    // field is zero although bytes remain: the endless-loop guard.
    let mut wire = vec![0xC0, 33];
    let body: &[u8] = &[
        0, 8, // secure path length
        1, 0, 0, 0, 0xFC, 0x00, // one segment
        0, 0, // block length 0
        1, // algo id
    ];
    wire.push(body.len() as u8);
    wire.extend_from_slice(body);
    assert!(matches!(
        BgpsecPathAttr::parse(&wire),
        Err(AttrError::BadBlockLength(0))
    ));
}

#[test]
fn test_block_length_beyond_buffer_rejected() {
    let mut wire = vec![0xC0, 33];
    let body: &[u8] = &[
        0, 8, // secure path
        1, 0, 0, 0, 0xFC, 0x00, //
        0, 200, // block claims 200 bytes
        1,
    ];
    wire.push(body.len() as u8);
    wire.extend_from_slice(body);
    assert!(matches!(
        BgpsecPathAttr::parse(&wire),
        Err(AttrError::BadBlockLength(200))
    ));
}

#[test]
fn test_ragged_secure_path_rejected() {
    let mut wire = vec![0xC0, 33];
    let body: &[u8] = &[
        0, 9, // secure path length: 7 segment bytes
        1, 0, 0, 0, 0xFC, 0x00, 0xFF,
    ];
    wire.push(body.len() as u8);
    wire.extend_from_slice(body);
    assert!(matches!(
        BgpsecPathAttr::parse(&wire),
        Err(AttrError::RaggedSecurePath(7))
    ));
}

#[test]
fn test_third_block_rejected() {
    let mut attr = sample_attr(4);
    attr.blocks = vec![
        SignatureBlock {
            algo_id: 1,
            segments: vec![],
        },
        SignatureBlock {
            algo_id: 2,
            segments: vec![],
        },
        SignatureBlock {
            algo_id: 3,
            segments: vec![],
        },
    ];
    let wire = attr.encode();
    assert!(matches!(
        BgpsecPathAttr::parse(&wire),
        Err(AttrError::TooManyBlocks)
    ));
}

#[test]
fn test_truncated_signature_segment() {
    let mut wire = vec![0xC0, 33];
    let body: &[u8] = &[
        0, 8, // secure path
        1, 0, 0, 0, 0xFC, 0x00, //
        0, 26, // block: 3 header + 23 segment bytes (one short of 22+2)
        1, //
        0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, //
        0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, //
        0, 2, // sig len 2
        0x11, // but only one byte follows
    ];
    wire.push(body.len() as u8);
    wire.extend_from_slice(body);
    assert!(matches!(
        BgpsecPathAttr::parse(&wire),
        Err(AttrError::Truncated(_))
    ));
}
