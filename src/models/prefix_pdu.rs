// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! IPv4 Prefix (type 4) and IPv6 Prefix (type 6) PDUs.
//!
//! Both carry one validated ROA payload: flags, prefix length, max
//! length, the address in network order and the origin AS.

use std::net::IpAddr;

use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U16, U32,
};

use crate::models::{
    common::{PduError, PduFlags, ProtocolVersion},
    pdu_type::PduType,
    prefix::Prefix,
    query::read_exact,
};

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
pub struct Ipv4PrefixPdu {
    pub version: u8,
    pub pdu_type: u8,
    pub reserved: U16<BigEndian>,
    pub length: U32<BigEndian>,
    pub flags: u8,
    pub prefix_len: u8,
    pub max_len: u8,
    pub zero: u8,
    pub addr: [u8; 4],
    pub asn: U32<BigEndian>,
}

impl Ipv4PrefixPdu {
    pub const LEN: usize = 20;

    pub fn new(
        version: ProtocolVersion,
        flags: PduFlags,
        prefix: Prefix,
        max_len: u8,
        asn: u32,
    ) -> Self {
        let addr = match prefix.addr {
            IpAddr::V4(v4) => v4.octets(),
            IpAddr::V6(_) => [0; 4],
        };
        Self {
            version: version.as_u8(),
            pdu_type: PduType::Ipv4Prefix.as_u8(),
            reserved: 0.into(),
            length: (Self::LEN as u32).into(),
            flags: flags.bits(),
            prefix_len: prefix.length,
            max_len,
            zero: 0,
            addr,
            asn: asn.into(),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, PduError> {
        let pdu = read_exact::<Self>(buf, Self::LEN, PduType::Ipv4Prefix)?;
        check_lengths(pdu.prefix_len, pdu.max_len, 32)?;
        Ok(pdu)
    }

    #[inline]
    pub fn is_announcement(&self) -> bool {
        PduFlags::from_bits_truncate(self.flags).is_announcement()
    }

    pub fn prefix(&self) -> Prefix {
        // length already validated in decode / constructor
        Prefix::v4(self.addr, self.prefix_len).unwrap_or(Prefix {
            addr: IpAddr::V4(self.addr.into()),
            length: 32,
        })
    }
}

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
pub struct Ipv6PrefixPdu {
    pub version: u8,
    pub pdu_type: u8,
    pub reserved: U16<BigEndian>,
    pub length: U32<BigEndian>,
    pub flags: u8,
    pub prefix_len: u8,
    pub max_len: u8,
    pub zero: u8,
    pub addr: [u8; 16],
    pub asn: U32<BigEndian>,
}

impl Ipv6PrefixPdu {
    pub const LEN: usize = 32;

    pub fn new(
        version: ProtocolVersion,
        flags: PduFlags,
        prefix: Prefix,
        max_len: u8,
        asn: u32,
    ) -> Self {
        let addr = match prefix.addr {
            IpAddr::V6(v6) => v6.octets(),
            IpAddr::V4(_) => [0; 16],
        };
        Self {
            version: version.as_u8(),
            pdu_type: PduType::Ipv6Prefix.as_u8(),
            reserved: 0.into(),
            length: (Self::LEN as u32).into(),
            flags: flags.bits(),
            prefix_len: prefix.length,
            max_len,
            zero: 0,
            addr,
            asn: asn.into(),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, PduError> {
        let pdu = read_exact::<Self>(buf, Self::LEN, PduType::Ipv6Prefix)?;
        check_lengths(pdu.prefix_len, pdu.max_len, 128)?;
        Ok(pdu)
    }

    #[inline]
    pub fn is_announcement(&self) -> bool {
        PduFlags::from_bits_truncate(self.flags).is_announcement()
    }

    pub fn prefix(&self) -> Prefix {
        Prefix::v6(self.addr, self.prefix_len).unwrap_or(Prefix {
            addr: IpAddr::V6(self.addr.into()),
            length: 128,
        })
    }
}

fn check_lengths(prefix_len: u8, max_len: u8, max: u8) -> Result<(), PduError> {
    if prefix_len > max || max_len > max {
        return Err(PduError::corrupt(format!(
            "prefix length {prefix_len}/{max_len} exceeds maximum {max}"
        )));
    }
    Ok(())
}
