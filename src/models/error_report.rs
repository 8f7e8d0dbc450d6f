// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Error Report PDU (type 10).
//!
//! Layout after the common header (whose `mixed` field holds the error
//! code): a 32-bit length, the encapsulated erroneous PDU, another
//! 32-bit length and the diagnostic text. Both inner lengths are
//! validated against the remaining bytes before anything is copied out.

use crate::models::{
    common::{COMMON_HEADER_LEN, CommonHeader, PduError, ProtocolVersion},
    pdu_type::{ErrorCode, PduType},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReportPdu {
    pub version: ProtocolVersion,
    /// Raw error code; unknown values survive a round trip.
    pub error_code: u16,
    pub erroneous_pdu: Vec<u8>,
    pub message: Vec<u8>,
}

impl ErrorReportPdu {
    pub fn new(
        version: ProtocolVersion,
        code: ErrorCode,
        erroneous_pdu: Vec<u8>,
        message: &str,
    ) -> Self {
        Self {
            version,
            error_code: code.as_u16(),
            erroneous_pdu,
            message: message.as_bytes().to_vec(),
        }
    }

    /// Typed code, `None` for codes this implementation does not know.
    #[inline]
    pub fn code(&self) -> Option<ErrorCode> {
        ErrorCode::from_u16(self.error_code)
    }

    /// All codes except No Data Available end the session.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.code().is_none_or(ErrorCode::is_fatal)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.message).into_owned()
    }

    pub fn total_len(&self) -> usize {
        COMMON_HEADER_LEN + 4 + self.erroneous_pdu.len() + 4 + self.message.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        use zerocopy::IntoBytes;
        let total = self.total_len();
        let mut out = Vec::with_capacity(total);
        let hdr = CommonHeader::new(
            self.version,
            PduType::ErrorReport,
            self.error_code,
            total as u32,
        );
        out.extend_from_slice(hdr.as_bytes());
        out.extend_from_slice(&(self.erroneous_pdu.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.erroneous_pdu);
        out.extend_from_slice(&(self.message.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.message);
        out
    }

    /// Decode from the full PDU image (header included).
    pub fn decode(buf: &[u8]) -> Result<Self, PduError> {
        let hdr = CommonHeader::decode(buf)?;
        let version = ProtocolVersion::try_from(hdr.version)?;
        let body = &buf[COMMON_HEADER_LEN..];

        let (enc_pdu, rest) = read_block(body, "encapsulated PDU")?;
        let (message, tail) = read_block(rest, "error text")?;
        if !tail.is_empty() {
            return Err(PduError::corrupt(format!(
                "{} trailing bytes after error text",
                tail.len()
            )));
        }

        Ok(Self {
            version,
            error_code: hdr.mixed.get(),
            erroneous_pdu: enc_pdu.to_vec(),
            message: message.to_vec(),
        })
    }
}

/// Read one `length(u32) || payload` block, checking the length against
/// the remaining bytes.
fn read_block<'a>(buf: &'a [u8], what: &str) -> Result<(&'a [u8], &'a [u8]), PduError> {
    if buf.len() < 4 {
        return Err(PduError::corrupt(format!("{what} length field missing")));
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let rest = &buf[4..];
    if len > rest.len() {
        return Err(PduError::corrupt(format!(
            "{what} claims {len} bytes, only {} remain",
            rest.len()
        )));
    }
    Ok((&rest[..len], &rest[len..]))
}
