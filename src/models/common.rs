// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Shared pieces of every RPKI-to-Router PDU: the 8-byte common header,
//! the protocol version and the flag octet carried by prefix, router-key
//! and ASPA PDUs.
//!
//! The common header layout is defined by RFC 6810 / RFC 8210 § 5.1:
//!
//! ```text
//!  0          8          16         24        31
//! +----------+----------+---------------------+
//! | version  | pdu type |    mixed (16 bit)   |
//! +----------+----------+---------------------+
//! |            length (32 bit, total)         |
//! +-------------------------------------------+
//! ```
//!
//! The `mixed` field carries a session id, an error code, flags or zero
//! depending on the PDU type. All integers are big-endian on the wire.

use bitflags::bitflags;
use thiserror::Error;
use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U16, U32,
};

use crate::models::pdu_type::PduType;

/// Length of the common header shared by all PDUs.
pub const COMMON_HEADER_LEN: usize = 8;

/// Upper bound for the `length` field of a received PDU. Anything larger
/// is treated as corrupt before any buffer is grown to the claimed size.
pub const MAX_PDU_LENGTH: u32 = 100 * 1024;

/// Protocol versions this implementation speaks.
///
/// V0 is RFC 6810, V1 is RFC 8210 (adds Router Key and the End-of-Data
/// timer fields), V2 adds the ASPA PDU.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProtocolVersion {
    V0 = 0,
    #[default]
    V1 = 1,
    V2 = 2,
}

impl ProtocolVersion {
    #[inline]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::V0),
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            _ => None,
        }
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = PduError;

    fn try_from(v: u8) -> Result<Self, PduError> {
        Self::from_u8(v).ok_or(PduError::UnsupportedVersion(v))
    }
}

bitflags! {
    /// Flag octet of prefix, router-key and ASPA PDUs.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct PduFlags: u8 {
        /// Lowest bit set means announcement, cleared means withdrawal.
        const ANNOUNCEMENT = 0x01;
        /// ASPA only: provider list covers IPv6 instead of IPv4.
        const AFI_V6 = 0x02;
    }
}

impl PduFlags {
    #[inline]
    pub fn is_announcement(self) -> bool {
        self.contains(Self::ANNOUNCEMENT)
    }
}

/// The first 8 bytes of every PDU, used to frame the byte stream before
/// the type-specific body is interpreted.
#[repr(C)]
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    ZFromBytes,
    IntoBytes,
    KnownLayout,
    Immutable,
)]
pub struct CommonHeader {
    pub version: u8,
    pub pdu_type: u8,
    pub mixed: U16<BigEndian>,
    pub length: U32<BigEndian>,
}

impl CommonHeader {
    pub fn new(
        version: ProtocolVersion,
        pdu_type: PduType,
        mixed: u16,
        length: u32,
    ) -> Self {
        Self {
            version: version.as_u8(),
            pdu_type: pdu_type.as_u8(),
            mixed: mixed.into(),
            length: length.into(),
        }
    }

    /// Frame check only: the header itself plus the sanity of the length
    /// field. Body-level validation happens in [`crate::models::parse`].
    pub fn decode(buf: &[u8]) -> Result<Self, PduError> {
        if buf.len() < COMMON_HEADER_LEN {
            return Err(PduError::Truncated {
                need: COMMON_HEADER_LEN,
                have: buf.len(),
            });
        }
        let hdr = CommonHeader::read_from_bytes(&buf[..COMMON_HEADER_LEN])
            .map_err(|_| PduError::corrupt("unreadable common header"))?;
        let length = hdr.length.get();
        if (length as usize) < COMMON_HEADER_LEN {
            return Err(PduError::corrupt(format!(
                "declared PDU length {length} below header size"
            )));
        }
        if length > MAX_PDU_LENGTH {
            return Err(PduError::corrupt(format!(
                "declared PDU length {length} exceeds the {MAX_PDU_LENGTH} byte bound"
            )));
        }
        Ok(hdr)
    }
}

/// Decode / encode failures of the wire codec. Each maps onto an RTR
/// error code so the session layer can echo the offending PDU back.
#[derive(Debug, Error)]
pub enum PduError {
    #[error("truncated PDU: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("corrupt PDU: {0}")]
    Corrupt(String),

    #[error("unsupported PDU type {0}")]
    UnsupportedType(u8),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
}

impl PduError {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    /// The RTR error code a peer should see for this failure.
    pub fn error_code(&self) -> crate::models::pdu_type::ErrorCode {
        use crate::models::pdu_type::ErrorCode;
        match self {
            Self::Truncated { .. } | Self::Corrupt(_) => ErrorCode::CorruptData,
            Self::UnsupportedType(_) => ErrorCode::UnsupportedPdu,
            Self::UnsupportedVersion(_) => ErrorCode::UnsupportedProtocolVersion,
        }
    }
}
