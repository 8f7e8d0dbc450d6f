// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! RTR cache server: accepts clients, answers queries out of the cache
//! store and fans out notifications.
//!
//! Every connection gets its own receive task plus a writer task fed
//! through a channel, so a slow client never blocks a broadcast. A
//! service timer (60 s) purges expired records and drains the pending
//! Serial Notify flag; the console can bypass the timer with immediate
//! notify / reset / error broadcasts.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering},
    },
    time::Duration,
};

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::{RwLock, mpsc},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zerocopy::IntoBytes;

use crate::{
    cache::store::{CacheEntry, CacheRecord, CacheStore, Snapshot, unix_now},
    models::{
        common::{COMMON_HEADER_LEN, CommonHeader, PduFlags, ProtocolVersion},
        end_of_data::EndOfDataPdu,
        error_report::ErrorReportPdu,
        notify::{CacheResetPdu, CacheResponsePdu, SerialNotifyPdu},
        pdu_type::{ErrorCode, PduType},
        prefix_pdu::{Ipv4PrefixPdu, Ipv6PrefixPdu},
        router_key::RouterKeyPdu,
    },
};

/// Seconds between two service timer runs.
pub const SERVICE_TIMER_INTERVAL: u64 = 60;

const CLIENT_QUEUE_DEPTH: usize = 64;

#[derive(Debug)]
pub struct ClientHandle {
    pub id: u64,
    pub addr: SocketAddr,
    /// Serial of the last End of Data sent to this client.
    pub last_served_serial: u32,
    tx: mpsc::Sender<Vec<u8>>,
}

/// Shared state between dispatcher, console and timer.
#[derive(Debug)]
pub struct ServerState {
    pub cache: RwLock<CacheStore>,
    pub clients: DashMap<u64, ClientHandle>,
    session_id: AtomicU16,
    notify_pending: AtomicBool,
    next_client_id: AtomicU64,
    /// Protocol version stamped on all emitted PDUs.
    pub version: ProtocolVersion,
}

impl ServerState {
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            cache: RwLock::new(CacheStore::new()),
            clients: DashMap::new(),
            session_id: AtomicU16::new(0),
            notify_pending: AtomicBool::new(false),
            next_client_id: AtomicU64::new(1),
            version,
        }
    }

    #[inline]
    pub fn session_id(&self) -> u16 {
        self.session_id.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_session_id(&self, id: u16) {
        self.session_id.store(id, Ordering::Relaxed);
    }

    /// Ask the service timer to send a Serial Notify on its next run.
    #[inline]
    pub fn schedule_notify(&self) {
        self.notify_pending.store(true, Ordering::Relaxed);
    }

    /// Send a Serial Notify to every connected client right away.
    pub async fn notify_all(&self) {
        self.notify_pending.store(false, Ordering::Relaxed);
        let serial = self.cache.read().await.max_serial();
        let pdu = SerialNotifyPdu::new(self.version, self.session_id(), serial);
        self.broadcast(pdu.as_bytes().to_vec()).await;
    }

    /// Send a Cache Reset to every connected client.
    pub async fn reset_all(&self) {
        let pdu = CacheResetPdu::new(self.version);
        self.broadcast(pdu.as_bytes().to_vec()).await;
    }

    /// Send an Error Report to every connected client.
    pub async fn error_all(&self, code: u16, erroneous_pdu: Vec<u8>, msg: &str) {
        let pdu = ErrorReportPdu {
            version: self.version,
            error_code: code,
            erroneous_pdu,
            message: msg.as_bytes().to_vec(),
        };
        self.broadcast(pdu.encode()).await;
    }

    async fn broadcast(&self, bytes: Vec<u8>) {
        for entry in self.clients.iter() {
            if entry.tx.send(bytes.clone()).await.is_err() {
                debug!(client = entry.id, "broadcast to closing client skipped");
            }
        }
    }
}

pub struct RtrServer {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl RtrServer {
    pub async fn bind(port: u16, version: ProtocolVersion) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("failed to bind RTR server port {port}"))?;
        info!(port, "rtr cache server listening");
        Ok(Self {
            listener,
            state: Arc::new(ServerState::new(version)),
        })
    }

    #[inline]
    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// The locally bound address, useful with an ephemeral port.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients until cancelled. Also runs the service timer.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let timer_state = Arc::clone(&self.state);
        let timer_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut tick =
                tokio::time::interval(Duration::from_secs(SERVICE_TIMER_INTERVAL));
            tick.tick().await; // immediate first tick is a no-op
            loop {
                tokio::select! {
                    _ = timer_cancel.cancelled() => break,
                    _ = tick.tick() => service_tick(&timer_state).await,
                }
            }
        });

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                accepted = self.listener.accept() => {
                    let (stream, addr) = accepted.context("accept failed")?;
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(state, stream, addr).await {
                            debug!(%addr, "client connection ended: {e}");
                        }
                    });
                },
            }
        }
    }
}

/// One service timer run: purge, then drain a pending notify.
pub async fn service_tick(state: &ServerState) {
    let removed = state.cache.write().await.purge_expired(unix_now());
    if removed > 0 {
        info!(removed, "purged expired cache entries");
    }
    if state.notify_pending.swap(false, Ordering::Relaxed) {
        state.notify_all().await;
    }
}

async fn handle_client(
    state: Arc<ServerState>,
    stream: TcpStream,
    addr: SocketAddr,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();

    let id = state.next_client_id.fetch_add(1, Ordering::Relaxed);
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(CLIENT_QUEUE_DEPTH);
    state.clients.insert(
        id,
        ClientHandle {
            id,
            addr,
            last_served_serial: 0,
            tx: tx.clone(),
        },
    );
    info!(client = id, %addr, "client connected");

    let writer_task = tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if writer.write_all(&bytes).await.is_err() {
                break;
            }
            let _ = writer.flush().await;
        }
    });

    let result = client_read_loop(&state, id, &mut reader, &tx).await;

    state.clients.remove(&id);
    drop(tx);
    let _ = writer_task.await;
    info!(client = id, %addr, "client disconnected");
    result
}

async fn client_read_loop(
    state: &ServerState,
    client_id: u64,
    reader: &mut tokio::net::tcp::OwnedReadHalf,
    tx: &mpsc::Sender<Vec<u8>>,
) -> Result<()> {
    let mut header = [0u8; COMMON_HEADER_LEN];
    loop {
        if reader.read_exact(&mut header).await.is_err() {
            return Ok(()); // peer closed
        }
        // The header bound protects against memory exhaustion before
        // any body buffer is allocated.
        let hdr = match CommonHeader::decode(&header) {
            Ok(h) => h,
            Err(e) => {
                warn!("client sent unusable header: {e}");
                return Ok(());
            },
        };
        let body_len = hdr.length.get() as usize - COMMON_HEADER_LEN;
        let mut body = vec![0u8; body_len];
        if body_len > 0 {
            reader
                .read_exact(&mut body)
                .await
                .context("failed to read PDU body")?;
        }

        match PduType::from_u8(hdr.pdu_type) {
            Some(PduType::SerialQuery) => {
                if body_len != 4 {
                    warn!("invalid serial query body of {body_len} bytes");
                    continue;
                }
                let serial = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
                let session_id = hdr.mixed.get();
                debug!(serial, session_id, "serial query");
                match serve_query(state, tx, serial, session_id, false).await {
                    ServeOutcome::Drop => return Ok(()),
                    ServeOutcome::Served(serial) => {
                        if let Some(mut client) = state.clients.get_mut(&client_id) {
                            client.last_served_serial = serial;
                        }
                    },
                    ServeOutcome::Reset => {},
                }
            },
            Some(PduType::ResetQuery) => {
                debug!("reset query");
                let outcome = serve_query(state, tx, 0, state.session_id(), true).await;
                if let ServeOutcome::Served(serial) = outcome
                    && let Some(mut client) = state.clients.get_mut(&client_id)
                {
                    client.last_served_serial = serial;
                }
            },
            Some(PduType::ErrorReport) => {
                log_error_report(hdr.mixed.get(), &body);
            },
            other => {
                warn!(pdu_type = hdr.pdu_type, "unexpected PDU from client: {other:?}");
            },
        }
    }
}

enum ServeOutcome {
    /// Session id mismatch; the connection is dropped.
    Drop,
    /// The serial was unreachable; a Cache Reset went out.
    Reset,
    /// Records plus End of Data at the carried serial went out.
    Served(u32),
}

/// Answer a Serial or Reset Query out of the cache.
async fn serve_query(
    state: &ServerState,
    tx: &mpsc::Sender<Vec<u8>>,
    client_serial: u32,
    client_session_id: u16,
    reset: bool,
) -> ServeOutcome {
    // A direct answer supersedes any pending notify.
    state.notify_pending.store(false, Ordering::Relaxed);
    let session_id = state.session_id();

    let snapshot = {
        let cache = state.cache.read().await;
        cache.snapshot(client_serial, client_session_id, session_id, reset)
    };

    match snapshot {
        Snapshot::DropSession => {
            info!("client session id mismatch, dropping session");
            ServeOutcome::Drop
        },
        Snapshot::CacheReset => {
            let pdu = CacheResetPdu::new(state.version);
            let _ = tx.send(pdu.as_bytes().to_vec()).await;
            ServeOutcome::Reset
        },
        Snapshot::Records { entries, serial } => {
            let response = CacheResponsePdu::new(state.version, session_id);
            if tx.send(response.as_bytes().to_vec()).await.is_err() {
                return ServeOutcome::Served(serial);
            }
            for entry in entries {
                let Some(bytes) = encode_entry(state.version, &entry) else {
                    continue;
                };
                if tx.send(bytes).await.is_err() {
                    return ServeOutcome::Served(serial);
                }
            }
            let eod = EndOfDataPdu::new(state.version, session_id, serial);
            let _ = tx.send(eod.encode()).await;
            ServeOutcome::Served(serial)
        },
    }
}

/// Encode a cache entry for the wire; router keys need protocol
/// version 1 or later and are silently skipped below that.
fn encode_entry(version: ProtocolVersion, entry: &CacheEntry) -> Option<Vec<u8>> {
    let flags = if entry.announce {
        PduFlags::ANNOUNCEMENT
    } else {
        PduFlags::empty()
    };
    match &entry.record {
        CacheRecord::Prefix(p) => {
            if p.prefix.is_v6() {
                Some(
                    Ipv6PrefixPdu::new(version, flags, p.prefix, p.max_len, p.asn)
                        .as_bytes()
                        .to_vec(),
                )
            } else {
                Some(
                    Ipv4PrefixPdu::new(version, flags, p.prefix, p.max_len, p.asn)
                        .as_bytes()
                        .to_vec(),
                )
            }
        },
        CacheRecord::RouterKey(k) => {
            if version == ProtocolVersion::V0 {
                return None;
            }
            Some(RouterKeyPdu::new(version, flags, k.ski, k.asn, k.spki.clone()).encode())
        },
    }
}

/// Pretty-print an incoming Error Report (body without the common
/// header), validating the embedded length fields.
fn log_error_report(code: u16, body: &[u8]) {
    let code_txt = ErrorCode::from_u16(code)
        .map(|c| c.text().to_string())
        .unwrap_or_else(|| format!("code {code}"));

    if body.len() < 4 {
        warn!("error report from client is truncated");
        return;
    }
    let pdu_len = u32::from_be_bytes([body[0], body[1], body[2], body[3]]) as usize;
    if 4 + pdu_len > body.len() {
        warn!(
            "error report claims {pdu_len} PDU bytes, only {} present",
            body.len() - 4
        );
        return;
    }
    if pdu_len > 0 {
        debug!(
            "{}",
            crate::models::printer::describe_raw(&body[4..4 + pdu_len])
        );
    }
    let rest = &body[4 + pdu_len..];
    let msg = if rest.len() >= 4 {
        let msg_len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        if 4 + msg_len <= rest.len() {
            String::from_utf8_lossy(&rest[4..4 + msg_len]).into_owned()
        } else {
            String::from("<truncated>")
        }
    } else {
        String::new()
    };
    info!(code = %code_txt, msg, enc_pdu_len = pdu_len, "error report from client");
}
