// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Wireshark-style dump of RTR PDUs, used by the harness console and
//! by verbose session logging.

use std::fmt::Write;

use crate::models::{
    common::PduFlags,
    parse::Pdu,
    pdu_type::ErrorCode,
};

fn flag_note(flags: u8) -> &'static str {
    if PduFlags::from_bits_truncate(flags).is_announcement() {
        "(announcement)"
    } else {
        "(withdrawal)"
    }
}

fn hex_block(out: &mut String, indent: &str, data: &[u8]) {
    for chunk in data.chunks(16) {
        let _ = write!(out, "{indent}");
        for b in chunk {
            let _ = write!(out, "{b:02X} ");
        }
        let _ = writeln!(out);
    }
}

/// Render a decoded PDU as a multi-line description.
pub fn describe_pdu(pdu: &Pdu) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} PDU (version {}):", pdu.pdu_type(), pdu.version_raw());

    match pdu {
        Pdu::SerialNotify(p) => {
            let _ = writeln!(out, "  session id: 0x{:04X}", p.session_id.get());
            let _ = writeln!(out, "  serial:     {}", p.serial.get());
        },
        Pdu::SerialQuery(p) => {
            let _ = writeln!(out, "  session id: 0x{:04X}", p.session_id.get());
            let _ = writeln!(out, "  serial:     {}", p.serial.get());
        },
        Pdu::ResetQuery(_) | Pdu::CacheReset(_) => {},
        Pdu::CacheResponse(p) => {
            let _ = writeln!(out, "  session id: 0x{:04X}", p.session_id.get());
        },
        Pdu::Ipv4Prefix(p) => {
            let _ = writeln!(out, "  flags:      0x{:02X} {}", p.flags, flag_note(p.flags));
            let _ = writeln!(out, "  prefix:     {}-{}", p.prefix(), p.max_len);
            let _ = writeln!(out, "  origin AS:  {}", p.asn.get());
        },
        Pdu::Ipv6Prefix(p) => {
            let _ = writeln!(out, "  flags:      0x{:02X} {}", p.flags, flag_note(p.flags));
            let _ = writeln!(out, "  prefix:     {}-{}", p.prefix(), p.max_len);
            let _ = writeln!(out, "  origin AS:  {}", p.asn.get());
        },
        Pdu::EndOfData(p) => {
            let _ = writeln!(out, "  session id: 0x{:04X}", p.session_id);
            let _ = writeln!(out, "  serial:     {}", p.serial);
            if let (Some(refresh), Some(retry), Some(expire)) = (
                p.refresh_interval,
                p.retry_interval,
                p.expire_interval,
            ) {
                let _ = writeln!(
                    out,
                    "  timers:     refresh {refresh}s, retry {retry}s, expire {expire}s"
                );
            }
        },
        Pdu::RouterKey(p) => {
            let _ = writeln!(
                out,
                "  flags:      0x{:02X} {}",
                p.header.flags,
                flag_note(p.header.flags)
            );
            let _ = writeln!(out, "  SKI:        {}", hex::encode_upper(p.header.ski));
            let _ = writeln!(out, "  AS:         {}", p.header.asn.get());
            let _ = writeln!(out, "  SPKI ({} bytes):", p.spki.len());
            hex_block(&mut out, "    ", &p.spki);
        },
        Pdu::ErrorReport(p) => {
            let code = ErrorCode::from_u16(p.error_code)
                .map(|c| c.text().to_string())
                .unwrap_or_else(|| format!("unknown ({})", p.error_code));
            let _ = writeln!(out, "  error:      {code}");
            if !p.erroneous_pdu.is_empty() {
                let _ = writeln!(out, "  erroneous PDU ({} bytes):", p.erroneous_pdu.len());
                hex_block(&mut out, "    ", &p.erroneous_pdu);
            }
            if !p.message.is_empty() {
                let _ = writeln!(out, "  message:    '{}'", p.text());
            }
        },
        Pdu::Aspa(p) => {
            let afi = if p.is_v6() { "IPv6" } else { "IPv4" };
            let _ = writeln!(
                out,
                "  flags:      0x{:02X} {} (AFI {afi})",
                p.flags.bits(),
                flag_note(p.flags.bits())
            );
            let _ = writeln!(out, "  customer:   {}", p.customer_asn);
            let _ = writeln!(out, "  providers:  {:?}", p.provider_asns);
        },
    }
    out
}

/// Render raw bytes that did not decode, header first.
pub fn describe_raw(bytes: &[u8]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "undecodable PDU ({} bytes):", bytes.len());
    hex_block(&mut out, "  ", bytes);
    out
}
