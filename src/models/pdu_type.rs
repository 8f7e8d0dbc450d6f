// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! PDU type codes and error report codes of the RTR protocol
//! (RFC 6810 § 5, RFC 8210 § 5, plus the version-2 ASPA extension).

use core::fmt;

use thiserror::Error;

/// PDU type octet, second byte of the common header.
///
/// Code 5 is unassigned and 255 is reserved; both decode to an error.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PduType {
    SerialNotify = 0,
    SerialQuery = 1,
    ResetQuery = 2,
    CacheResponse = 3,
    Ipv4Prefix = 4,
    Ipv6Prefix = 6,
    EndOfData = 7,
    CacheReset = 8,
    RouterKey = 9,
    ErrorReport = 10,
    Aspa = 11,
}

impl PduType {
    #[inline]
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::SerialNotify,
            1 => Self::SerialQuery,
            2 => Self::ResetQuery,
            3 => Self::CacheResponse,
            4 => Self::Ipv4Prefix,
            6 => Self::Ipv6Prefix,
            7 => Self::EndOfData,
            8 => Self::CacheReset,
            9 => Self::RouterKey,
            10 => Self::ErrorReport,
            11 => Self::Aspa,
            _ => return None,
        })
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Returned when the type octet carries an undefined code.
#[derive(Debug, Error)]
#[error("unknown PDU type: {0}")]
pub struct UnknownPduType(pub u8);

impl TryFrom<u8> for PduType {
    type Error = UnknownPduType;

    fn try_from(v: u8) -> Result<Self, UnknownPduType> {
        Self::from_u8(v).ok_or(UnknownPduType(v))
    }
}

impl fmt::Display for PduType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SerialNotify => "Serial Notify",
            Self::SerialQuery => "Serial Query",
            Self::ResetQuery => "Reset Query",
            Self::CacheResponse => "Cache Response",
            Self::Ipv4Prefix => "IPv4 Prefix",
            Self::Ipv6Prefix => "IPv6 Prefix",
            Self::EndOfData => "End of Data",
            Self::CacheReset => "Cache Reset",
            Self::RouterKey => "Router Key",
            Self::ErrorReport => "Error Report",
            Self::Aspa => "ASPA",
        };
        f.write_str(name)
    }
}

/// Error codes carried in the `mixed` field of an Error Report PDU.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    CorruptData = 0,
    InternalError = 1,
    NoDataAvailable = 2,
    InvalidRequest = 3,
    UnsupportedProtocolVersion = 4,
    UnsupportedPdu = 5,
    UnknownWithdrawal = 6,
    DuplicateAnnouncement = 7,
    UnexpectedProtocolVersion = 8,
    AspaProviderListError = 9,
    Reserved = 255,
}

impl ErrorCode {
    #[inline]
    pub fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            0 => Self::CorruptData,
            1 => Self::InternalError,
            2 => Self::NoDataAvailable,
            3 => Self::InvalidRequest,
            4 => Self::UnsupportedProtocolVersion,
            5 => Self::UnsupportedPdu,
            6 => Self::UnknownWithdrawal,
            7 => Self::DuplicateAnnouncement,
            8 => Self::UnexpectedProtocolVersion,
            9 => Self::AspaProviderListError,
            255 => Self::Reserved,
            _ => return None,
        })
    }

    #[inline]
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Every code except `NoDataAvailable` terminates the session.
    #[inline]
    pub fn is_fatal(self) -> bool {
        self != Self::NoDataAvailable
    }

    /// Canonical text used when an Error Report is generated locally.
    pub fn text(self) -> &'static str {
        match self {
            Self::CorruptData => "Corrupt Data",
            Self::InternalError => "Internal Error",
            Self::NoDataAvailable => "No Data Available",
            Self::InvalidRequest => "Invalid Request",
            Self::UnsupportedProtocolVersion => "Unsupported Protocol Version",
            Self::UnsupportedPdu => "Unsupported PDU",
            Self::UnknownWithdrawal => "Withdrawal of Unknown Record",
            Self::DuplicateAnnouncement => "Duplicate Announcement Received",
            Self::UnexpectedProtocolVersion => "Unexpected Protocol Version",
            Self::AspaProviderListError => "ASPA Provider List Error",
            Self::Reserved => "Reserved",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.text(), self.as_u16())
    }
}
