// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! BGPsec_PATH attribute wire format (RFC 8205 § 3).
//!
//! ```text
//! +------------------------------------------------+
//! | attr flags (1) | type 33 (1) | length (1 or 2) |
//! +------------------------------------------------+
//! | Secure_Path                                    |
//! |   length (2, includes itself)                  |
//! |   N x { pCount (1) | flags (1) | ASN (4) }     |
//! +------------------------------------------------+
//! | 1..2 Signature_Blocks                          |
//! |   length (2, includes itself) | algo id (1)    |
//! |   N x { SKI (20) | sig len (2) | sig (var) }   |
//! +------------------------------------------------+
//! ```
//!
//! Secure_Path and every Signature_Block list the most recent hop first.
//! Every embedded length is validated against the bytes that are
//! actually present; a zero block length with bytes remaining would
//! loop forever and is rejected outright.

use thiserror::Error;

use crate::keys::{status::ApiStatus, store::Ski};

/// Attribute type code assigned to BGPsec_PATH.
pub const BGPSEC_PATH_TYPE: u8 = 33;

/// Attribute flag bit selecting the 2-byte length encoding.
pub const ATTR_FLAG_EXT_LENGTH: u8 = 0x10;

/// Default flags for a self-built attribute: optional transitive.
pub const ATTR_FLAGS_DEFAULT: u8 = 0xC0;

/// At most two signature blocks may be present.
pub const MAX_SIG_BLOCK_COUNT: usize = 2;

const SECURE_PATH_SEGMENT_LEN: usize = 6;
const SIG_SEGMENT_HDR_LEN: usize = 22;
const SIG_BLOCK_HDR_LEN: usize = 3;

/// One hop of the Secure_Path: `(pCount, flags, asn)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurePathSegment {
    pub pcount: u8,
    pub flags: u8,
    pub asn: u32,
}

impl SecurePathSegment {
    pub fn new(pcount: u8, flags: u8, asn: u32) -> Self {
        Self { pcount, flags, asn }
    }

    /// The 6-byte wire image of this segment.
    pub fn to_wire(self) -> [u8; 6] {
        let asn = self.asn.to_be_bytes();
        [self.pcount, self.flags, asn[0], asn[1], asn[2], asn[3]]
    }
}

/// One signature of a Signature_Block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureSegment {
    pub ski: Ski,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureBlock {
    pub algo_id: u8,
    pub segments: Vec<SignatureSegment>,
}

/// A fully parsed BGPsec_PATH attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgpsecPathAttr {
    pub flags: u8,
    pub type_code: u8,
    pub secure_path: Vec<SecurePathSegment>,
    pub blocks: Vec<SignatureBlock>,
}

/// Structural failures while walking the attribute. All of them map to
/// the `ERR_SYNTAX` status bit.
#[derive(Debug, Error)]
pub enum AttrError {
    #[error("attribute truncated: {0}")]
    Truncated(&'static str),
    #[error("attribute length field mismatch: declared {declared}, present {present}")]
    LengthMismatch { declared: usize, present: usize },
    #[error("secure path length {0} is not a whole number of segments")]
    RaggedSecurePath(usize),
    #[error("signature block length {0} inconsistent with remaining bytes")]
    BadBlockLength(usize),
    #[error("more than {MAX_SIG_BLOCK_COUNT} signature blocks")]
    TooManyBlocks,
}

impl AttrError {
    #[inline]
    pub fn status(&self) -> ApiStatus {
        ApiStatus::ERR_SYNTAX
    }
}

impl BgpsecPathAttr {
    pub fn new(secure_path: Vec<SecurePathSegment>, blocks: Vec<SignatureBlock>) -> Self {
        Self {
            flags: ATTR_FLAGS_DEFAULT,
            type_code: BGPSEC_PATH_TYPE,
            secure_path,
            blocks,
        }
    }

    /// Algorithm IDs of the first and second signature block, 0 when a
    /// block is absent.
    pub fn algorithm_ids(&self) -> (u8, u8) {
        let first = self.blocks.first().map_or(0, |b| b.algo_id);
        let second = self.blocks.get(1).map_or(0, |b| b.algo_id);
        (first, second)
    }

    /// Parse the complete attribute as it appears in an UPDATE message.
    pub fn parse(attr: &[u8]) -> Result<Self, AttrError> {
        if attr.len() < 3 {
            return Err(AttrError::Truncated("common attribute header"));
        }
        let flags = attr[0];
        let type_code = attr[1];

        let (declared, body) = if flags & ATTR_FLAG_EXT_LENGTH != 0 {
            if attr.len() < 4 {
                return Err(AttrError::Truncated("extended length field"));
            }
            (u16::from_be_bytes([attr[2], attr[3]]) as usize, &attr[4..])
        } else {
            (attr[2] as usize, &attr[3..])
        };
        if declared != body.len() {
            return Err(AttrError::LengthMismatch {
                declared,
                present: body.len(),
            });
        }

        // Secure_Path
        if body.len() < 2 {
            return Err(AttrError::Truncated("secure path length"));
        }
        let sp_len = u16::from_be_bytes([body[0], body[1]]) as usize;
        if sp_len < 2 || sp_len > body.len() {
            return Err(AttrError::LengthMismatch {
                declared: sp_len,
                present: body.len(),
            });
        }
        let seg_bytes = sp_len - 2;
        if seg_bytes % SECURE_PATH_SEGMENT_LEN != 0 {
            return Err(AttrError::RaggedSecurePath(seg_bytes));
        }
        let secure_path = body[2..sp_len]
            .chunks_exact(SECURE_PATH_SEGMENT_LEN)
            .map(|c| SecurePathSegment {
                pcount: c[0],
                flags: c[1],
                asn: u32::from_be_bytes([c[2], c[3], c[4], c[5]]),
            })
            .collect::<Vec<_>>();

        // Signature blocks
        let mut blocks = Vec::new();
        let mut rest = &body[sp_len..];
        while !rest.is_empty() {
            if blocks.len() == MAX_SIG_BLOCK_COUNT {
                return Err(AttrError::TooManyBlocks);
            }
            if rest.len() < SIG_BLOCK_HDR_LEN {
                return Err(AttrError::Truncated("signature block header"));
            }
            let block_len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
            // A zero length with bytes remaining would never advance.
            if block_len < SIG_BLOCK_HDR_LEN || block_len > rest.len() {
                return Err(AttrError::BadBlockLength(block_len));
            }
            let algo_id = rest[2];
            let segments = parse_sig_segments(&rest[SIG_BLOCK_HDR_LEN..block_len])?;
            blocks.push(SignatureBlock { algo_id, segments });
            rest = &rest[block_len..];
        }

        Ok(Self {
            flags,
            type_code,
            secure_path,
            blocks,
        })
    }

    /// Re-encode into the wire image; the extended-length form is used
    /// whenever the body exceeds 255 bytes.
    pub fn encode(&self) -> Vec<u8> {
        let sp_len = 2 + self.secure_path.len() * SECURE_PATH_SEGMENT_LEN;
        let blocks_len: usize = self
            .blocks
            .iter()
            .map(|b| {
                SIG_BLOCK_HDR_LEN
                    + b.segments
                        .iter()
                        .map(|s| SIG_SEGMENT_HDR_LEN + s.signature.len())
                        .sum::<usize>()
            })
            .sum();
        let body_len = sp_len + blocks_len;

        let ext = body_len > u8::MAX as usize;
        let mut flags = self.flags;
        if ext {
            flags |= ATTR_FLAG_EXT_LENGTH;
        } else {
            flags &= !ATTR_FLAG_EXT_LENGTH;
        }

        let mut out = Vec::with_capacity(body_len + 4);
        out.push(flags);
        out.push(self.type_code);
        if ext {
            out.extend_from_slice(&(body_len as u16).to_be_bytes());
        } else {
            out.push(body_len as u8);
        }

        out.extend_from_slice(&(sp_len as u16).to_be_bytes());
        for seg in &self.secure_path {
            out.extend_from_slice(&seg.to_wire());
        }
        for block in &self.blocks {
            let block_len = SIG_BLOCK_HDR_LEN
                + block
                    .segments
                    .iter()
                    .map(|s| SIG_SEGMENT_HDR_LEN + s.signature.len())
                    .sum::<usize>();
            out.extend_from_slice(&(block_len as u16).to_be_bytes());
            out.push(block.algo_id);
            for seg in &block.segments {
                out.extend_from_slice(&seg.ski);
                out.extend_from_slice(&(seg.signature.len() as u16).to_be_bytes());
                out.extend_from_slice(&seg.signature);
            }
        }
        out
    }
}

fn parse_sig_segments(mut buf: &[u8]) -> Result<Vec<SignatureSegment>, AttrError> {
    let mut segments = Vec::new();
    while !buf.is_empty() {
        if buf.len() < SIG_SEGMENT_HDR_LEN {
            return Err(AttrError::Truncated("signature segment header"));
        }
        let mut ski = [0u8; 20];
        ski.copy_from_slice(&buf[..20]);
        let sig_len = u16::from_be_bytes([buf[20], buf[21]]) as usize;
        let total = SIG_SEGMENT_HDR_LEN + sig_len;
        if total > buf.len() {
            return Err(AttrError::Truncated("signature bytes"));
        }
        segments.push(SignatureSegment {
            ski,
            signature: buf[SIG_SEGMENT_HDR_LEN..total].to_vec(),
        });
        buf = &buf[total..];
    }
    Ok(segments)
}
