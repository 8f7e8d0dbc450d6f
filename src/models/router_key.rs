// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Router Key PDU (type 9, protocol version 1 and later).
//!
//! Carries a BGPsec router key: the 20-byte subject key identifier, the
//! AS number and the variable-length subject public key info blob.

use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U32,
};

use crate::models::{
    common::{PduError, PduFlags, ProtocolVersion},
    pdu_type::PduType,
};

/// Length of a subject key identifier.
pub const SKI_LENGTH: usize = 20;

#[repr(C)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, ZFromBytes, IntoBytes, KnownLayout, Immutable,
)]
pub struct RouterKeyHeader {
    pub version: u8,
    pub pdu_type: u8,
    pub flags: u8,
    pub zero: u8,
    pub length: U32<BigEndian>,
    pub ski: [u8; SKI_LENGTH],
    pub asn: U32<BigEndian>,
}

impl RouterKeyHeader {
    pub const LEN: usize = 32;
}

/// Router Key PDU: fixed header plus the SPKI tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterKeyPdu {
    pub header: RouterKeyHeader,
    pub spki: Vec<u8>,
}

impl RouterKeyPdu {
    pub fn new(
        version: ProtocolVersion,
        flags: PduFlags,
        ski: [u8; SKI_LENGTH],
        asn: u32,
        spki: Vec<u8>,
    ) -> Self {
        let length = (RouterKeyHeader::LEN + spki.len()) as u32;
        Self {
            header: RouterKeyHeader {
                version: version.as_u8(),
                pdu_type: PduType::RouterKey.as_u8(),
                flags: flags.bits(),
                zero: 0,
                length: length.into(),
                ski,
                asn: asn.into(),
            },
            spki,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RouterKeyHeader::LEN + self.spki.len());
        out.extend_from_slice(self.header.as_bytes());
        out.extend_from_slice(&self.spki);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, PduError> {
        if buf.len() < RouterKeyHeader::LEN {
            return Err(PduError::corrupt(format!(
                "Router Key PDU must carry at least {} bytes, got {}",
                RouterKeyHeader::LEN,
                buf.len()
            )));
        }
        let header = RouterKeyHeader::read_from_bytes(&buf[..RouterKeyHeader::LEN])
            .map_err(|_| PduError::corrupt("unreadable Router Key header"))?;
        Ok(Self {
            header,
            spki: buf[RouterKeyHeader::LEN..].to_vec(),
        })
    }

    #[inline]
    pub fn is_announcement(&self) -> bool {
        PduFlags::from_bits_truncate(self.header.flags).is_announcement()
    }
}
