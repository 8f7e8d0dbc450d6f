// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Construction of the BGPsec digest input ("hash message").
//!
//! One contiguous buffer holds everything the per-segment digests need;
//! each segment is described by `(signature range, digest offset)` into
//! that buffer. Digest `i` always runs from its offset to the end of the
//! buffer, so the newest segment (index 0) has the longest digest and
//! the origin the shortest.
//!
//! Buffer layout for a validation message over N segments:
//!
//! ```text
//! [ target ASN, 4 bytes, rewritten per sign call        ]
//! [ signature segment 0 (SKI | len | sig)               ]
//! [ own pCount/flags (2, zero) | own ASN (4)            ] <- digest 0
//! [ signature segment 1 | path segment 0 (6)            ] <- digest 1 at its ASN
//! ...
//! [ signature segment N-1 | path segment N-2 (6)        ] <- digest N-1 at its ASN
//! [ origin path segment (6) ]
//! [ algo id (1) ]
//! [ AFI (2) | SAFI (1) | prefix len (1) | prefix bytes  ]
//! ```
//!
//! The origin form collapses to `target | own segment | algo id | NLRI`
//! with a single digest covering the whole buffer.

use std::ops::Range;

use crate::{
    bgpsec::attr::{BgpsecPathAttr, SecurePathSegment},
    keys::status::ApiStatus,
    models::prefix::Prefix,
};

/// AFI / SAFI / prefix triple as it enters the digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nlri {
    pub afi: u16,
    pub safi: u8,
    pub prefix: Prefix,
}

impl Nlri {
    /// Unicast NLRI for a prefix; the AFI follows the address family.
    pub fn unicast(prefix: Prefix) -> Self {
        Self {
            afi: if prefix.is_v6() { 2 } else { 1 },
            safi: 1,
            prefix,
        }
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.afi.to_be_bytes());
        out.push(self.safi);
        out.push(self.prefix.length);
        let octets = match self.prefix.addr {
            std::net::IpAddr::V4(a) => a.octets().to_vec(),
            std::net::IpAddr::V6(a) => a.octets().to_vec(),
        };
        out.extend_from_slice(&octets[..self.prefix.byte_len()]);
    }
}

#[derive(Debug, Clone)]
struct SegmentRef {
    signature: Option<Range<usize>>,
    digest_start: usize,
}

/// The owned digest buffer plus the per-segment slice map.
#[derive(Debug, Clone)]
pub struct HashMessage {
    buffer: Vec<u8>,
    segments: Vec<SegmentRef>,
    /// Offset of the signer's own `pCount` byte; the 6 bytes from here
    /// are rewritten by every sign call.
    own_segment_at: usize,
    algo_id: u8,
}

impl HashMessage {
    #[inline]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    #[inline]
    pub fn algorithm_id(&self) -> u8 {
        self.algo_id
    }

    #[inline]
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// The whole underlying buffer.
    #[inline]
    pub fn raw(&self) -> &[u8] {
        &self.buffer
    }

    /// Digest input for segment `i`, running to the buffer end.
    pub fn digest(&self, i: usize) -> &[u8] {
        &self.buffer[self.segments[i].digest_start..]
    }

    /// Offset of digest `i` inside the buffer.
    pub fn digest_start(&self, i: usize) -> usize {
        self.segments[i].digest_start
    }

    /// The copied signature segment bytes for segment `i` (SKI, length,
    /// signature). `None` for the origin slot of a signing message.
    pub fn signature(&self, i: usize) -> Option<&[u8]> {
        self.segments[i]
            .signature
            .as_ref()
            .map(|r| &self.buffer[r.clone()])
    }

    /// Rewrite the 4 head bytes with the AS the update is sent to.
    pub fn set_target(&mut self, peer_asn: u32) {
        self.buffer[..4].copy_from_slice(&peer_asn.to_be_bytes());
    }

    /// Rewrite the signer's own path segment (pCount, flags, ASN).
    pub fn set_own_segment(&mut self, seg: &SecurePathSegment) {
        let at = self.own_segment_at;
        self.buffer[at..at + 6].copy_from_slice(&seg.to_wire());
    }

    /// The slice that an added signature covers: digest 0.
    pub fn signing_digest(&self) -> &[u8] {
        self.digest(0)
    }
}

/// Build the validation message for `attr` using the signature block
/// carrying `algo_id`.
///
/// Fails with `ERR_UNSUPPORTED_ALGO` when no block matches and with
/// `ERR_SYNTAX` when the segment counts of the secure path and the
/// chosen block disagree. Only the first matching block is digested; a
/// second block is ignored here and surfaced via
/// [`BgpsecPathAttr::algorithm_ids`].
pub fn build_validation_message(
    my_asn: u32,
    attr: &BgpsecPathAttr,
    nlri: &Nlri,
    algo_id: u8,
) -> Result<HashMessage, ApiStatus> {
    let Some(block) = attr.blocks.iter().find(|b| b.algo_id == algo_id) else {
        return Err(ApiStatus::ERR_UNSUPPORTED_ALGO);
    };
    let n = attr.secure_path.len();
    if n == 0 || block.segments.len() != n {
        return Err(ApiStatus::ERR_SYNTAX);
    }

    let mut buffer = vec![0u8; 4]; // target ASN placeholder
    let mut segments = Vec::with_capacity(n);
    let mut own_segment_at = 0;

    for i in 0..n {
        let sig = &block.segments[i];
        let sig_start = buffer.len();
        buffer.extend_from_slice(&sig.ski);
        buffer.extend_from_slice(&(sig.signature.len() as u16).to_be_bytes());
        buffer.extend_from_slice(&sig.signature);
        let sig_range = sig_start..buffer.len();

        let digest_start = if i == 0 {
            // Reserved pCount/flags for this host, then our own ASN.
            own_segment_at = buffer.len();
            buffer.extend_from_slice(&[0, 0]);
            let at = buffer.len();
            buffer.extend_from_slice(&my_asn.to_be_bytes());
            at
        } else {
            let seg = &attr.secure_path[i - 1];
            buffer.push(seg.pcount);
            buffer.push(seg.flags);
            let at = buffer.len();
            buffer.extend_from_slice(&seg.asn.to_be_bytes());
            at
        };
        segments.push(SegmentRef {
            signature: Some(sig_range),
            digest_start,
        });
    }

    // Origin path segment, then algo id and NLRI close the buffer.
    let origin = &attr.secure_path[n - 1];
    buffer.extend_from_slice(&origin.to_wire());
    buffer.push(algo_id);
    nlri.encode_into(&mut buffer);

    Ok(HashMessage {
        buffer,
        segments,
        own_segment_at,
        algo_id,
    })
}

/// Build the short message signed by an origin: `target | own segment |
/// algo id | NLRI`, one digest over the whole buffer.
pub fn build_origin_message(
    peer_asn: u32,
    own: &SecurePathSegment,
    nlri: &Nlri,
    algo_id: u8,
) -> HashMessage {
    let mut buffer = Vec::with_capacity(4 + 6 + 1 + 4 + nlri.prefix.byte_len());
    buffer.extend_from_slice(&peer_asn.to_be_bytes());
    let own_segment_at = buffer.len();
    buffer.extend_from_slice(&own.to_wire());
    buffer.push(algo_id);
    nlri.encode_into(&mut buffer);

    HashMessage {
        buffer,
        segments: vec![SegmentRef {
            signature: None,
            digest_start: 0,
        }],
        own_segment_at,
        algo_id,
    }
}
