// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Client-to-cache query PDUs: Serial Query (type 1) and Reset Query
//! (type 2).

use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U16, U32,
};

use crate::models::{
    common::{COMMON_HEADER_LEN, PduError, ProtocolVersion},
    pdu_type::PduType,
};

/// Serial Query — request an incremental update starting at `serial`.
///
/// The serial number travels in the same byte order it was received in;
/// the session keeps it as a big-endian value and echoes it verbatim.
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
pub struct SerialQueryPdu {
    pub version: u8,
    pub pdu_type: u8,
    pub session_id: U16<BigEndian>,
    pub length: U32<BigEndian>,
    pub serial: U32<BigEndian>,
}

impl SerialQueryPdu {
    pub const LEN: usize = 12;

    pub fn new(version: ProtocolVersion, session_id: u16, serial: u32) -> Self {
        Self {
            version: version.as_u8(),
            pdu_type: PduType::SerialQuery.as_u8(),
            session_id: session_id.into(),
            length: (Self::LEN as u32).into(),
            serial: serial.into(),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, PduError> {
        read_exact::<Self>(buf, Self::LEN, PduType::SerialQuery)
    }
}

/// Reset Query — request the complete data set.
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
pub struct ResetQueryPdu {
    pub version: u8,
    pub pdu_type: u8,
    pub reserved: U16<BigEndian>,
    pub length: U32<BigEndian>,
}

impl ResetQueryPdu {
    pub const LEN: usize = COMMON_HEADER_LEN;

    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            version: version.as_u8(),
            pdu_type: PduType::ResetQuery.as_u8(),
            reserved: 0.into(),
            length: (Self::LEN as u32).into(),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, PduError> {
        read_exact::<Self>(buf, Self::LEN, PduType::ResetQuery)
    }
}

/// Read a fixed-size PDU image, insisting on the exact wire length the
/// type prescribes.
pub(crate) fn read_exact<T>(
    buf: &[u8],
    expect_len: usize,
    pdu_type: PduType,
) -> Result<T, PduError>
where
    T: ZFromBytes,
{
    if buf.len() != expect_len {
        return Err(PduError::corrupt(format!(
            "{pdu_type} PDU must be {expect_len} bytes, got {}",
            buf.len()
        )));
    }
    T::read_from_bytes(buf)
        .map_err(|_| PduError::corrupt(format!("unreadable {pdu_type} PDU")))
}
