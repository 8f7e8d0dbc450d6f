// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! ASPA PDU (type 11, protocol version 2).
//!
//! Body after the common header: flags(8), zero(8), provider count(16),
//! customer ASN(32), then `count` provider ASNs of 32 bits each.

use crate::models::{
    common::{COMMON_HEADER_LEN, CommonHeader, PduError, PduFlags, ProtocolVersion},
    pdu_type::PduType,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AspaPdu {
    pub version: ProtocolVersion,
    pub flags: PduFlags,
    pub customer_asn: u32,
    pub provider_asns: Vec<u32>,
}

impl AspaPdu {
    pub fn new(flags: PduFlags, customer_asn: u32, provider_asns: Vec<u32>) -> Self {
        Self {
            version: ProtocolVersion::V2,
            flags,
            customer_asn,
            provider_asns,
        }
    }

    #[inline]
    pub fn is_announcement(&self) -> bool {
        self.flags.is_announcement()
    }

    /// True if the provider list covers IPv6.
    #[inline]
    pub fn is_v6(&self) -> bool {
        self.flags.contains(PduFlags::AFI_V6)
    }

    pub fn total_len(&self) -> usize {
        COMMON_HEADER_LEN + 8 + self.provider_asns.len() * 4
    }

    pub fn encode(&self) -> Vec<u8> {
        use zerocopy::IntoBytes;
        let mut out = Vec::with_capacity(self.total_len());
        let hdr =
            CommonHeader::new(self.version, PduType::Aspa, 0, self.total_len() as u32);
        out.extend_from_slice(hdr.as_bytes());
        out.push(self.flags.bits());
        out.push(0);
        out.extend_from_slice(&(self.provider_asns.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.customer_asn.to_be_bytes());
        for provider in &self.provider_asns {
            out.extend_from_slice(&provider.to_be_bytes());
        }
        out
    }

    /// Decode from the full PDU image (header included).
    pub fn decode(buf: &[u8]) -> Result<Self, PduError> {
        let hdr = CommonHeader::decode(buf)?;
        let version = ProtocolVersion::try_from(hdr.version)?;
        let body = &buf[COMMON_HEADER_LEN..];
        if body.len() < 8 {
            return Err(PduError::corrupt("ASPA PDU body below minimum size"));
        }

        let flags = PduFlags::from_bits_truncate(body[0]);
        let count = u16::from_be_bytes([body[2], body[3]]) as usize;
        let customer_asn = u32::from_be_bytes([body[4], body[5], body[6], body[7]]);

        let providers = &body[8..];
        if providers.len() != count * 4 {
            return Err(PduError::corrupt(format!(
                "ASPA provider list: count {count} does not match {} payload bytes",
                providers.len()
            )));
        }
        let provider_asns = providers
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(Self {
            version,
            flags,
            customer_asn,
            provider_asns,
        })
    }
}
