// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! End of Data PDU (type 7).
//!
//! The version-0 form is 12 bytes; version 1 and later append the
//! refresh / retry / expire interval triplet (RFC 8210 § 5.8).

use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U16, U32,
};

use crate::models::{
    common::{PduError, ProtocolVersion},
    pdu_type::PduType,
    query::read_exact,
};

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
struct EndOfDataV0Wire {
    version: u8,
    pdu_type: u8,
    session_id: U16<BigEndian>,
    length: U32<BigEndian>,
    serial: U32<BigEndian>,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
struct EndOfDataV1Wire {
    version: u8,
    pdu_type: u8,
    session_id: U16<BigEndian>,
    length: U32<BigEndian>,
    serial: U32<BigEndian>,
    refresh: U32<BigEndian>,
    retry: U32<BigEndian>,
    expire: U32<BigEndian>,
}

/// End of Data — closes the record stream and hands the client the new
/// serial plus (v1+) the session timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndOfDataPdu {
    pub version: ProtocolVersion,
    pub session_id: u16,
    pub serial: u32,
    pub refresh_interval: Option<u32>,
    pub retry_interval: Option<u32>,
    pub expire_interval: Option<u32>,
}

impl EndOfDataPdu {
    pub const LEN_V0: usize = 12;
    pub const LEN_V1: usize = 24;

    /// RFC 8210 recommended defaults, used when a v0 peer sends no
    /// timer fields.
    pub const DEFAULT_REFRESH: u32 = 3600;
    pub const DEFAULT_RETRY: u32 = 600;
    pub const DEFAULT_EXPIRE: u32 = 7200;

    pub fn new(version: ProtocolVersion, session_id: u16, serial: u32) -> Self {
        let timers = version >= ProtocolVersion::V1;
        Self {
            version,
            session_id,
            serial,
            refresh_interval: timers.then_some(Self::DEFAULT_REFRESH),
            retry_interval: timers.then_some(Self::DEFAULT_RETRY),
            expire_interval: timers.then_some(Self::DEFAULT_EXPIRE),
        }
    }

    pub fn with_timers(mut self, refresh: u32, retry: u32, expire: u32) -> Self {
        self.refresh_interval = Some(refresh);
        self.retry_interval = Some(retry);
        self.expire_interval = Some(expire);
        self
    }

    #[inline]
    pub fn refresh_or_default(&self) -> u32 {
        self.refresh_interval.unwrap_or(Self::DEFAULT_REFRESH)
    }

    #[inline]
    pub fn retry_or_default(&self) -> u32 {
        self.retry_interval.unwrap_or(Self::DEFAULT_RETRY)
    }

    #[inline]
    pub fn expire_or_default(&self) -> u32 {
        self.expire_interval.unwrap_or(Self::DEFAULT_EXPIRE)
    }

    pub fn encode(&self) -> Vec<u8> {
        if self.version == ProtocolVersion::V0 {
            let wire = EndOfDataV0Wire {
                version: self.version.as_u8(),
                pdu_type: PduType::EndOfData.as_u8(),
                session_id: self.session_id.into(),
                length: (Self::LEN_V0 as u32).into(),
                serial: self.serial.into(),
            };
            wire.as_bytes().to_vec()
        } else {
            let wire = EndOfDataV1Wire {
                version: self.version.as_u8(),
                pdu_type: PduType::EndOfData.as_u8(),
                session_id: self.session_id.into(),
                length: (Self::LEN_V1 as u32).into(),
                serial: self.serial.into(),
                refresh: self.refresh_or_default().into(),
                retry: self.retry_or_default().into(),
                expire: self.expire_or_default().into(),
            };
            wire.as_bytes().to_vec()
        }
    }

    pub fn decode(version: ProtocolVersion, buf: &[u8]) -> Result<Self, PduError> {
        if version == ProtocolVersion::V0 {
            let wire = read_exact::<EndOfDataV0Wire>(buf, Self::LEN_V0, PduType::EndOfData)?;
            Ok(Self {
                version,
                session_id: wire.session_id.get(),
                serial: wire.serial.get(),
                refresh_interval: None,
                retry_interval: None,
                expire_interval: None,
            })
        } else {
            let wire = read_exact::<EndOfDataV1Wire>(buf, Self::LEN_V1, PduType::EndOfData)?;
            Ok(Self {
                version,
                session_id: wire.session_id.get(),
                serial: wire.serial.get(),
                refresh_interval: Some(wire.refresh.get()),
                retry_interval: Some(wire.retry.get()),
                expire_interval: Some(wire.expire.get()),
            })
        }
    }
}
