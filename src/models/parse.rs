// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The unified [`Pdu`] enum: one variant per PDU type, decoded from and
//! encoded to the exact wire image.

use zerocopy::IntoBytes;

use crate::models::{
    aspa::AspaPdu,
    common::{CommonHeader, PduError, ProtocolVersion},
    end_of_data::EndOfDataPdu,
    error_report::ErrorReportPdu,
    notify::{CacheResetPdu, CacheResponsePdu, SerialNotifyPdu},
    pdu_type::PduType,
    prefix_pdu::{Ipv4PrefixPdu, Ipv6PrefixPdu},
    query::{ResetQueryPdu, SerialQueryPdu},
    router_key::RouterKeyPdu,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Pdu {
    SerialNotify(SerialNotifyPdu),
    SerialQuery(SerialQueryPdu),
    ResetQuery(ResetQueryPdu),
    CacheResponse(CacheResponsePdu),
    Ipv4Prefix(Ipv4PrefixPdu),
    Ipv6Prefix(Ipv6PrefixPdu),
    EndOfData(EndOfDataPdu),
    CacheReset(CacheResetPdu),
    RouterKey(RouterKeyPdu),
    ErrorReport(ErrorReportPdu),
    Aspa(AspaPdu),
}

impl Pdu {
    /// Decode a complete PDU from its full wire image. The buffer must
    /// hold exactly the bytes the length field declares; the framing
    /// layer guarantees this for data read off a socket.
    pub fn decode(buf: &[u8]) -> Result<Self, PduError> {
        let hdr = CommonHeader::decode(buf)?;
        if hdr.length.get() as usize != buf.len() {
            return Err(PduError::corrupt(format!(
                "length field {} does not match the {} bytes received",
                hdr.length.get(),
                buf.len()
            )));
        }
        let version = ProtocolVersion::try_from(hdr.version)?;
        let pdu_type =
            PduType::from_u8(hdr.pdu_type).ok_or(PduError::UnsupportedType(hdr.pdu_type))?;

        let pdu = match pdu_type {
            PduType::SerialNotify => Self::SerialNotify(SerialNotifyPdu::decode(buf)?),
            PduType::SerialQuery => Self::SerialQuery(SerialQueryPdu::decode(buf)?),
            PduType::ResetQuery => Self::ResetQuery(ResetQueryPdu::decode(buf)?),
            PduType::CacheResponse => Self::CacheResponse(CacheResponsePdu::decode(buf)?),
            PduType::Ipv4Prefix => Self::Ipv4Prefix(Ipv4PrefixPdu::decode(buf)?),
            PduType::Ipv6Prefix => Self::Ipv6Prefix(Ipv6PrefixPdu::decode(buf)?),
            PduType::EndOfData => Self::EndOfData(EndOfDataPdu::decode(version, buf)?),
            PduType::CacheReset => Self::CacheReset(CacheResetPdu::decode(buf)?),
            PduType::RouterKey => Self::RouterKey(RouterKeyPdu::decode(buf)?),
            PduType::ErrorReport => Self::ErrorReport(ErrorReportPdu::decode(buf)?),
            PduType::Aspa => Self::Aspa(AspaPdu::decode(buf)?),
        };
        Ok(pdu)
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::SerialNotify(p) => p.as_bytes().to_vec(),
            Self::SerialQuery(p) => p.as_bytes().to_vec(),
            Self::ResetQuery(p) => p.as_bytes().to_vec(),
            Self::CacheResponse(p) => p.as_bytes().to_vec(),
            Self::Ipv4Prefix(p) => p.as_bytes().to_vec(),
            Self::Ipv6Prefix(p) => p.as_bytes().to_vec(),
            Self::EndOfData(p) => p.encode(),
            Self::CacheReset(p) => p.as_bytes().to_vec(),
            Self::RouterKey(p) => p.encode(),
            Self::ErrorReport(p) => p.encode(),
            Self::Aspa(p) => p.encode(),
        }
    }

    pub fn pdu_type(&self) -> PduType {
        match self {
            Self::SerialNotify(_) => PduType::SerialNotify,
            Self::SerialQuery(_) => PduType::SerialQuery,
            Self::ResetQuery(_) => PduType::ResetQuery,
            Self::CacheResponse(_) => PduType::CacheResponse,
            Self::Ipv4Prefix(_) => PduType::Ipv4Prefix,
            Self::Ipv6Prefix(_) => PduType::Ipv6Prefix,
            Self::EndOfData(_) => PduType::EndOfData,
            Self::CacheReset(_) => PduType::CacheReset,
            Self::RouterKey(_) => PduType::RouterKey,
            Self::ErrorReport(_) => PduType::ErrorReport,
            Self::Aspa(_) => PduType::Aspa,
        }
    }

    /// The raw version byte as carried on the wire.
    pub fn version_raw(&self) -> u8 {
        match self {
            Self::SerialNotify(p) => p.version,
            Self::SerialQuery(p) => p.version,
            Self::ResetQuery(p) => p.version,
            Self::CacheResponse(p) => p.version,
            Self::Ipv4Prefix(p) => p.version,
            Self::Ipv6Prefix(p) => p.version,
            Self::EndOfData(p) => p.version.as_u8(),
            Self::CacheReset(p) => p.version,
            Self::RouterKey(p) => p.header.version,
            Self::ErrorReport(p) => p.version.as_u8(),
            Self::Aspa(p) => p.version.as_u8(),
        }
    }
}
