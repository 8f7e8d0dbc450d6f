// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Client-side RTR session state machine.
//!
//! ```text
//! IDLE --connect--> HANDSHAKE --Reset Query--> WAIT_RESPONSE
//! WAIT_RESPONSE --Cache Response--> RECEIVING
//! WAIT_RESPONSE --Error(version) & downgrade--> HANDSHAKE (lower version)
//! WAIT_RESPONSE --Error(no data)--> retry later
//! RECEIVING --record PDUs--> RECEIVING (events)
//! RECEIVING --Cache Reset--> HANDSHAKE
//! RECEIVING --End of Data--> SYNCED
//! SYNCED --Serial Notify--> Serial Query --> WAIT_RESPONSE
//! ```
//!
//! One [`CacheSession`] covers one connection lifecycle; reconnect
//! policy lives in [`crate::client::client::RtrClient`]. The session id
//! is latched on the first id-bearing PDU and may only move on a Cache
//! Response that answers a Reset Query. The serial number is kept in
//! wire byte order and echoed verbatim.

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use zerocopy::{BigEndian, IntoBytes, U32};

use crate::{
    client::{
        connection::{PduConnection, ReadError},
        events::RtrEventHandler,
    },
    models::{
        common::{CommonHeader, ProtocolVersion},
        parse::Pdu,
        pdu_type::{ErrorCode, PduType},
        query::{ResetQueryPdu, SerialQueryPdu},
    },
};

/// Session id sentinel used before the first Cache Response.
const INITIAL_SESSION_ID: u16 = 0xFFFF;

/// Highest protocol version this client implementation speaks.
const MAX_SUPPORTED_VERSION: ProtocolVersion = ProtocolVersion::V2;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Identifies this client towards the upstream callbacks.
    pub client_id: u32,
    pub version: ProtocolVersion,
    pub allow_downgrade: bool,
    /// Close the session after the first End of Data.
    pub stop_after_end_of_data: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_id: 1,
            version: ProtocolVersion::V1,
            allow_downgrade: true,
            stop_after_end_of_data: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Handshake,
    WaitResponse,
    Receiving,
    Synced,
    Terminated,
}

/// Why [`CacheSession::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// End of Data received with `stop_after_end_of_data` set.
    Done,
    /// The peer reported No Data Available (or the handler elected to
    /// keep going); poll again later.
    RetryLater,
    /// We detected a protocol violation and reported it.
    ProtocolError(ErrorCode),
    /// The peer sent a fatal Error Report.
    PeerError(u16),
    ConnectionLost,
    Cancelled,
}

enum Flow {
    Continue,
    Stop(StopReason),
}

pub struct CacheSession<S, H> {
    conn: PduConnection<S>,
    cfg: SessionConfig,
    pub handler: H,
    state: SessionState,
    version: ProtocolVersion,
    session_id: u16,
    /// Kept in network byte order, exactly as received.
    serial: U32<BigEndian>,
    startup: bool,
    session_id_changed: bool,
    /// A version-conflict handshake retry happened already; a second
    /// one ends the session instead of looping.
    version_retried: bool,
    last_sent: Option<PduType>,
    last_recv: Option<PduType>,
}

impl<S, H> CacheSession<S, H>
where
    S: AsyncRead + AsyncWrite + Send,
    H: RtrEventHandler,
{
    pub fn new(stream: S, cfg: SessionConfig, handler: H) -> Self {
        Self::with_cancel(stream, cfg, handler, CancellationToken::new())
    }

    pub fn with_cancel(
        stream: S,
        cfg: SessionConfig,
        handler: H,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            conn: PduConnection::new(stream, cancel),
            version: cfg.version,
            cfg,
            handler,
            state: SessionState::Idle,
            session_id: INITIAL_SESSION_ID,
            serial: U32::ZERO,
            startup: true,
            session_id_changed: false,
            version_retried: false,
            last_sent: None,
            last_recv: None,
        }
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    #[inline]
    pub fn session_id(&self) -> u16 {
        self.session_id
    }

    #[inline]
    pub fn serial(&self) -> u32 {
        self.serial.get()
    }

    #[inline]
    pub fn session_id_changed(&self) -> bool {
        self.session_id_changed
    }

    /// Type of the most recently processed PDU.
    #[inline]
    pub fn last_received(&self) -> Option<PduType> {
        self.last_recv
    }

    /// Prime the session with state from a previous connection so an
    /// incremental Serial Query can be answered consistently.
    pub fn resume_from(mut self, session_id: u16, serial: u32) -> Self {
        self.session_id = session_id;
        self.serial = serial.into();
        self.startup = false;
        self
    }

    /// Drive one connection lifecycle: Reset Query, then process PDUs
    /// until the session stops or the transport drops.
    pub async fn run(&mut self) -> Result<StopReason> {
        self.state = SessionState::Handshake;
        self.send_reset_query().await?;

        loop {
            match self.conn.read_frame().await {
                Ok(frame) => match self.handle_frame(&frame).await? {
                    Flow::Continue => {},
                    Flow::Stop(reason) => {
                        if !matches!(reason, StopReason::RetryLater) {
                            self.state = SessionState::Terminated;
                        }
                        return Ok(reason);
                    },
                },
                Err(ReadError::Frame { raw_header, err }) => {
                    warn!("dropping session on unusable frame: {err}");
                    let code = err.error_code();
                    self.send_error_report(code, &raw_header, code.text()).await.ok();
                    self.state = SessionState::Terminated;
                    return Ok(StopReason::ProtocolError(code));
                },
                Err(ReadError::Closed) | Err(ReadError::Io(_)) => {
                    self.state = SessionState::Idle;
                    return Ok(StopReason::ConnectionLost);
                },
                Err(ReadError::Cancelled) => {
                    self.state = SessionState::Terminated;
                    return Ok(StopReason::Cancelled);
                },
            }
        }
    }

    async fn handle_frame(&mut self, frame: &[u8]) -> Result<Flow> {
        let hdr = CommonHeader::decode(frame)?;

        if let Err(code) = self.check_version(hdr.version) {
            // A version-conflicting Error Report during the handshake is
            // handled below; everything else is reported and fatal.
            if !(self.startup && hdr.pdu_type == PduType::ErrorReport.as_u8()) {
                return self.protocol_error(code, frame, code.text()).await;
            }
        }

        let pdu = match Pdu::decode(frame) {
            Ok(p) => p,
            Err(e) => {
                let code = e.error_code();
                return self.protocol_error(code, frame, &e.to_string()).await;
            },
        };
        trace!("received\n{}", crate::models::printer::describe_pdu(&pdu));
        self.last_recv = Some(pdu.pdu_type());

        match pdu {
            Pdu::SerialNotify(p) => {
                if !self.check_session_id(p.session_id.get()) {
                    return self
                        .protocol_error(
                            ErrorCode::CorruptData,
                            frame,
                            "serial notify with foreign session id",
                        )
                        .await;
                }
                self.send_serial_query().await?;
                self.state = SessionState::WaitResponse;
                Ok(Flow::Continue)
            },

            Pdu::CacheResponse(p) => {
                let sid = p.session_id.get();
                if !self.check_session_id(sid) {
                    // Only a response to a Reset Query may move the id.
                    if self.last_sent != Some(PduType::ResetQuery) {
                        return self
                            .protocol_error(
                                ErrorCode::CorruptData,
                                frame,
                                "session id changed outside a reset exchange",
                            )
                            .await;
                    }
                    info!(
                        old = self.session_id,
                        new = sid,
                        "cache session id changed, local data is stale"
                    );
                    self.handler.on_session_id_changed(self.cfg.client_id, sid);
                    self.session_id = sid;
                }
                self.state = SessionState::Receiving;
                Ok(Flow::Continue)
            },

            Pdu::Ipv4Prefix(p) => {
                self.handler.on_prefix(
                    self.cfg.client_id,
                    self.session_id,
                    p.is_announcement(),
                    p.prefix(),
                    p.max_len,
                    p.asn.get(),
                );
                Ok(Flow::Continue)
            },

            Pdu::Ipv6Prefix(p) => {
                self.handler.on_prefix(
                    self.cfg.client_id,
                    self.session_id,
                    p.is_announcement(),
                    p.prefix(),
                    p.max_len,
                    p.asn.get(),
                );
                Ok(Flow::Continue)
            },

            Pdu::EndOfData(p) => {
                if !self.check_session_id(p.session_id) {
                    return self
                        .protocol_error(
                            ErrorCode::CorruptData,
                            frame,
                            "end of data with foreign session id",
                        )
                        .await;
                }
                // Keep the serial exactly as it came off the wire.
                self.serial = p.serial.into();
                self.handler
                    .on_end_of_data(self.cfg.client_id, self.session_id, p.serial);
                if self.session_id_changed {
                    self.session_id_changed = false;
                    self.handler
                        .on_session_id_established(self.cfg.client_id, self.session_id);
                }
                self.state = SessionState::Synced;
                if self.cfg.stop_after_end_of_data {
                    Ok(Flow::Stop(StopReason::Done))
                } else {
                    Ok(Flow::Continue)
                }
            },

            Pdu::CacheReset(_) => {
                debug!("cache reset received, reloading");
                self.handler.on_reset(self.cfg.client_id);
                self.state = SessionState::Handshake;
                self.send_reset_query().await?;
                Ok(Flow::Continue)
            },

            Pdu::RouterKey(p) => {
                if self.version == ProtocolVersion::V0 {
                    return self
                        .protocol_error(
                            ErrorCode::UnsupportedPdu,
                            frame,
                            "router key PDU on a version 0 session",
                        )
                        .await;
                }
                self.handler.on_router_key(
                    self.cfg.client_id,
                    self.session_id,
                    p.is_announcement(),
                    p.header.asn.get(),
                    p.header.ski,
                    &p.spki,
                );
                Ok(Flow::Continue)
            },

            Pdu::Aspa(p) => {
                if self.version < ProtocolVersion::V2 {
                    return self
                        .protocol_error(
                            ErrorCode::UnsupportedPdu,
                            frame,
                            "ASPA PDU below protocol version 2",
                        )
                        .await;
                }
                self.handler.on_aspa(
                    self.cfg.client_id,
                    self.session_id,
                    p.is_announcement(),
                    p.is_v6(),
                    p.customer_asn,
                    &p.provider_asns,
                );
                Ok(Flow::Continue)
            },

            Pdu::ErrorReport(p) => self.handle_error_report(p).await,

            Pdu::SerialQuery(_) | Pdu::ResetQuery(_) => {
                self.protocol_error(
                    ErrorCode::UnsupportedPdu,
                    frame,
                    "query PDU received on the client side",
                )
                .await
            },
        }
    }

    async fn handle_error_report(
        &mut self,
        pdu: crate::models::error_report::ErrorReportPdu,
    ) -> Result<Flow> {
        let code = pdu.code();
        debug!(code = pdu.error_code, msg = %pdu.text(), "error report received");

        // Version negotiation: retry the handshake once at the version
        // the cache answered with (check_version already adopted it).
        if self.startup
            && self.cfg.allow_downgrade
            && !self.version_retried
            && matches!(
                code,
                Some(ErrorCode::UnsupportedProtocolVersion)
                    | Some(ErrorCode::UnexpectedProtocolVersion)
            )
        {
            self.version_retried = true;
            info!(version = ?self.version, "retrying handshake after version conflict");
            self.state = SessionState::Handshake;
            self.send_reset_query().await?;
            return Ok(Flow::Continue);
        }

        if self.handler.on_error(pdu.error_code, &pdu.text()) {
            self.state = SessionState::Idle;
            Ok(Flow::Stop(StopReason::RetryLater))
        } else {
            Ok(Flow::Stop(StopReason::PeerError(pdu.error_code)))
        }
    }

    /// Version agreement check for a received PDU. During the startup
    /// handshake a lower peer version is adopted when downgrading is
    /// allowed; any other mismatch produces the appropriate error code.
    fn check_version(&mut self, peer_raw: u8) -> Result<(), ErrorCode> {
        if peer_raw == self.version.as_u8() {
            return Ok(());
        }
        if let Some(peer) = ProtocolVersion::from_u8(peer_raw)
            && self.startup
            && self.cfg.allow_downgrade
            && peer < self.version
        {
            info!(from = ?self.version, to = ?peer, "downgrading protocol version");
            self.version = peer;
            return Ok(());
        }
        Err(
            if peer_raw > MAX_SUPPORTED_VERSION.as_u8()
                || self.version == ProtocolVersion::V0
            {
                ErrorCode::UnsupportedProtocolVersion
            } else {
                ErrorCode::UnexpectedProtocolVersion
            },
        )
    }

    /// Latch the session id on first contact; afterwards flag any
    /// mismatch. Both sides of the comparison are wire-order values.
    fn check_session_id(&mut self, session_id: u16) -> bool {
        if self.startup {
            self.startup = false;
            self.session_id = session_id;
            self.session_id_changed = false;
            return true;
        }
        if self.session_id != session_id {
            self.session_id_changed = true;
            return false;
        }
        true
    }

    async fn protocol_error(
        &mut self,
        code: ErrorCode,
        frame: &[u8],
        msg: &str,
    ) -> Result<Flow> {
        warn!(%code, msg, "terminating session on protocol error");
        self.send_error_report(code, frame, msg).await.ok();
        Ok(Flow::Stop(StopReason::ProtocolError(code)))
    }

    pub async fn send_reset_query(&mut self) -> Result<()> {
        let pdu = ResetQueryPdu::new(self.version);
        self.conn.send(pdu.as_bytes()).await?;
        self.last_sent = Some(PduType::ResetQuery);
        self.state = SessionState::WaitResponse;
        Ok(())
    }

    pub async fn send_serial_query(&mut self) -> Result<()> {
        let pdu = SerialQueryPdu::new(self.version, self.session_id, self.serial.get());
        self.conn.send(pdu.as_bytes()).await?;
        self.last_sent = Some(PduType::SerialQuery);
        Ok(())
    }

    async fn send_error_report(
        &mut self,
        code: ErrorCode,
        erroneous: &[u8],
        msg: &str,
    ) -> Result<()> {
        let pdu = crate::models::error_report::ErrorReportPdu::new(
            self.version,
            code,
            erroneous.to_vec(),
            msg,
        );
        self.conn.send(&pdu.encode()).await?;
        self.last_sent = Some(PduType::ErrorReport);
        Ok(())
    }
}
