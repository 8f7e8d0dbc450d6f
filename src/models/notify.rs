// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Cache-to-client control PDUs without a variable body: Serial Notify
//! (type 0), Cache Response (type 3) and Cache Reset (type 8).

use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U16, U32,
};

use crate::models::{
    common::{COMMON_HEADER_LEN, PduError, ProtocolVersion},
    pdu_type::PduType,
    query::read_exact,
};

/// Serial Notify — hint that the cache moved past `serial` and the
/// client should issue a Serial Query.
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
pub struct SerialNotifyPdu {
    pub version: u8,
    pub pdu_type: u8,
    pub session_id: U16<BigEndian>,
    pub length: U32<BigEndian>,
    pub serial: U32<BigEndian>,
}

impl SerialNotifyPdu {
    pub const LEN: usize = 12;

    pub fn new(version: ProtocolVersion, session_id: u16, serial: u32) -> Self {
        Self {
            version: version.as_u8(),
            pdu_type: PduType::SerialNotify.as_u8(),
            session_id: session_id.into(),
            length: (Self::LEN as u32).into(),
            serial: serial.into(),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, PduError> {
        read_exact::<Self>(buf, Self::LEN, PduType::SerialNotify)
    }
}

/// Cache Response — opens the record stream answering a query.
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
pub struct CacheResponsePdu {
    pub version: u8,
    pub pdu_type: u8,
    pub session_id: U16<BigEndian>,
    pub length: U32<BigEndian>,
}

impl CacheResponsePdu {
    pub const LEN: usize = COMMON_HEADER_LEN;

    pub fn new(version: ProtocolVersion, session_id: u16) -> Self {
        Self {
            version: version.as_u8(),
            pdu_type: PduType::CacheResponse.as_u8(),
            session_id: session_id.into(),
            length: (Self::LEN as u32).into(),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, PduError> {
        read_exact::<Self>(buf, Self::LEN, PduType::CacheResponse)
    }
}

/// Cache Reset — the cache cannot serve the requested serial; the client
/// must fall back to a Reset Query.
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
pub struct CacheResetPdu {
    pub version: u8,
    pub pdu_type: u8,
    pub reserved: U16<BigEndian>,
    pub length: U32<BigEndian>,
}

impl CacheResetPdu {
    pub const LEN: usize = COMMON_HEADER_LEN;

    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            version: version.as_u8(),
            pdu_type: PduType::CacheReset.as_u8(),
            reserved: 0.into(),
            length: (Self::LEN as u32).into(),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, PduError> {
        read_exact::<Self>(buf, Self::LEN, PduType::CacheReset)
    }
}
