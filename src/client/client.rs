// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! TCP runner for an RTR cache session.
//!
//! Owns the reconnect loop around [`CacheSession`]: connect, drive one
//! session lifecycle, then ask the handler whether and when to try
//! again. Session id and serial survive reconnects so the next exchange
//! can continue incrementally; after a session id change the state is
//! reset for a clean handshake.

use std::time::Duration;

use anyhow::Result;
use tokio::{net::TcpStream, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{
    events::RtrEventHandler,
    session::{CacheSession, SessionConfig, StopReason},
};

/// Protocol errors tolerated across reconnects before the client
/// abandons the cache for good.
const MAX_SESSION_ERRORS: u32 = 10;

#[derive(Debug, Clone)]
pub struct RtrClientParams {
    pub host: String,
    pub port: u16,
    pub session: SessionConfig,
}

/// Handle of a running RTR client task.
pub struct RtrClient {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RtrClient {
    /// Connect and keep the session alive in a background task.
    pub async fn connect<H>(params: RtrClientParams, handler: H) -> Result<Self>
    where
        H: RtrEventHandler + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        // Fail fast if the cache is unreachable on the first attempt.
        let stream = TcpStream::connect((params.host.as_str(), params.port)).await?;
        stream.set_nodelay(true)?;

        let handle = tokio::spawn(async move {
            if let Err(e) = manage_connection(params, handler, stream, task_cancel).await
            {
                warn!("rtr client task ended with error: {e}");
            }
        });

        Ok(Self { cancel, handle })
    }

    /// Signal the receive loop to stop; it exits at the next read
    /// boundary or on socket close.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub async fn join(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

async fn manage_connection<H>(
    params: RtrClientParams,
    mut handler: H,
    first_stream: TcpStream,
    cancel: CancellationToken,
) -> Result<()>
where
    H: RtrEventHandler + Send + 'static,
{
    let client_id = params.session.client_id;
    let mut stream = Some(first_stream);
    // Carried across reconnects for incremental resynchronization.
    let mut resume: Option<(u16, u32)> = None;
    let mut err_count: u32 = 0;

    loop {
        let tcp = match stream.take() {
            Some(s) => s,
            None => {
                match TcpStream::connect((params.host.as_str(), params.port)).await {
                    Ok(s) => {
                        let _ = s.set_nodelay(true);
                        s
                    },
                    Err(e) => {
                        warn!("reconnect to {}:{} failed: {e}", params.host, params.port);
                        let delay = handler.on_connection_lost(client_id);
                        if delay < 0 {
                            return Ok(());
                        }
                        sleep(Duration::from_secs(delay as u64)).await;
                        continue;
                    },
                }
            },
        };

        let mut session = CacheSession::with_cancel(
            tcp,
            params.session.clone(),
            handler,
            cancel.clone(),
        );
        if let Some((sid, serial)) = resume {
            session = session.resume_from(sid, serial);
        }

        let reason = session.run().await?;
        resume = Some((session.session_id(), session.serial()));
        if session.session_id_changed() {
            // Force a clean handshake on the next connection.
            resume = None;
        }
        handler = session.handler;

        match reason {
            StopReason::Done | StopReason::Cancelled => {
                info!("rtr session finished: {reason:?}");
                return Ok(());
            },
            StopReason::ProtocolError(_) | StopReason::PeerError(_) => {
                err_count += 1;
                warn!(err_count, "rtr session terminated on error: {reason:?}");
                if err_count >= MAX_SESSION_ERRORS {
                    warn!("giving up after {err_count} session errors");
                    return Ok(());
                }
                let delay = handler.on_connection_lost(client_id);
                if delay < 0 {
                    return Ok(());
                }
                sleep(Duration::from_secs(delay as u64)).await;
            },
            StopReason::RetryLater | StopReason::ConnectionLost => {
                let delay = handler.on_connection_lost(client_id);
                if delay < 0 {
                    debug!("handler declined reconnect");
                    return Ok(());
                }
                sleep(Duration::from_secs(delay as u64)).await;
            },
        }
    }
}
