// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! RTR cache test harness.
//!
//! Usage: `rpkirtr_svr [port] [script]`. Binds the RTR server on the
//! given port (default 50001), optionally executes a command script,
//! then hands control to the interactive console. A logger config can
//! be supplied through the `RTR_LOGGER_CONFIG` environment variable.

use anyhow::{Context, Result};
use bgpsec_rtr_rs::{
    cfg::logger::{init_default_logger, init_logger},
    models::common::ProtocolVersion,
    server::{
        console::{CmdOutcome, Console},
        dispatcher::RtrServer,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::info;

const DEFAULT_PORT: u16 = 50001;

#[tokio::main]
async fn main() -> Result<()> {
    let _logger_guard = match std::env::var("RTR_LOGGER_CONFIG") {
        Ok(path) => init_logger(&path)?,
        Err(_) => init_default_logger()?,
    };

    let mut args = std::env::args().skip(1);
    let port = match args.next() {
        Some(p) => p
            .parse::<u16>()
            .with_context(|| format!("unknown port '{p}'"))?,
        None => {
            println!("Start RPKI-Cache test harness using default port {DEFAULT_PORT}");
            DEFAULT_PORT
        },
    };
    let script = args.next();

    let server = RtrServer::bind(port, ProtocolVersion::V0).await?;
    let state = server.state();

    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let server_task = tokio::spawn(async move { server.run(server_cancel).await });

    let console = Console::new(state);
    let mut outcome = CmdOutcome::Continue;
    if let Some(script) = script {
        outcome = console.run_script(&script).await;
    }
    if outcome != CmdOutcome::Quit {
        console.run_interactive().await?;
    }

    info!("shutting down");
    cancel.cancel();
    let _ = server_task.await;
    Ok(())
}
