// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Upstream event surface of the RTR session.
//!
//! `on_prefix` and `on_reset` are the events every consumer must care
//! about; everything else has a reasonable default. Callbacks run on
//! the session's receive task and should return quickly.

use crate::models::{pdu_type::ErrorCode, prefix::Prefix, router_key::SKI_LENGTH};

pub trait RtrEventHandler: Send {
    /// A prefix origin record was announced or withdrawn.
    fn on_prefix(
        &mut self,
        client_id: u32,
        session_id: u16,
        announce: bool,
        prefix: Prefix,
        max_len: u8,
        asn: u32,
    );

    /// The cache asked for a full reload; local data derived from this
    /// cache must be dropped.
    fn on_reset(&mut self, client_id: u32);

    /// A BGPsec router key record was announced or withdrawn.
    fn on_router_key(
        &mut self,
        _client_id: u32,
        _session_id: u16,
        _announce: bool,
        _asn: u32,
        _ski: [u8; SKI_LENGTH],
        _spki: &[u8],
    ) {
    }

    /// An ASPA record was announced or withdrawn (protocol version 2).
    fn on_aspa(
        &mut self,
        _client_id: u32,
        _session_id: u16,
        _announce: bool,
        _v6: bool,
        _customer_asn: u32,
        _provider_asns: &[u32],
    ) {
    }

    /// The cache finished a data exchange at `serial`.
    fn on_end_of_data(&mut self, _client_id: u32, _session_id: u16, _serial: u32) {}

    /// The peer sent an Error Report. Return `true` to keep the session
    /// open; the default keeps it only for No Data Available.
    fn on_error(&mut self, code: u16, _message: &str) -> bool {
        ErrorCode::from_u16(code).is_some_and(|c| !c.is_fatal())
    }

    /// The transport dropped. Return the seconds to wait before a
    /// reconnect, or a negative value to give up.
    fn on_connection_lost(&mut self, _client_id: u32) -> i32 {
        -1
    }

    /// The cache presented a session id different from the one this
    /// session had latched; cached data is now stale.
    fn on_session_id_changed(&mut self, _client_id: u32, _new_session_id: u16) {}

    /// Fired after the reload that follows a session id change has
    /// completed (End of Data received).
    fn on_session_id_established(&mut self, _client_id: u32, _session_id: u16) {}
}
