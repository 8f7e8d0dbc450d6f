// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! End-to-end exchanges between the cache test harness and the client
//! session over real TCP sockets.

use std::sync::Arc;

use bgpsec_rtr_rs::{
    cache::store::{CacheRecord, PrefixRecord},
    client::session::{CacheSession, SessionConfig, StopReason},
    models::{common::ProtocolVersion, prefix::Prefix},
    server::dispatcher::{RtrServer, ServerState, service_tick},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_util::sync::CancellationToken;

use crate::integration_tests::common::{
    Event, RecordingHandler, event_log, events_of, read_frame, wait_for_event,
};

const SESSION_ID: u16 = 0x1234;

fn prefix_record(s: &str, max_len: u8, asn: u32) -> CacheRecord {
    CacheRecord::Prefix(PrefixRecord {
        prefix: Prefix::parse(s).expect("prefix"),
        max_len,
        asn,
    })
}

async fn start_server() -> (Arc<ServerState>, std::net::SocketAddr, CancellationToken) {
    let server = RtrServer::bind(0, ProtocolVersion::V0)
        .await
        .expect("bind server");
    let addr = server.local_addr().expect("local addr");
    let state = server.state();
    state.set_session_id(SESSION_ID);
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = server.run(run_cancel).await;
    });
    (state, addr, cancel)
}

fn v0_session(stop_after_eod: bool) -> SessionConfig {
    SessionConfig {
        client_id: 1,
        version: ProtocolVersion::V0,
        allow_downgrade: true,
        stop_after_end_of_data: stop_after_eod,
    }
}

#[tokio::test]
#[serial_test::serial]
async fn serves_full_snapshot_over_tcp() {
    let (state, addr, cancel) = start_server().await;
    state
        .cache
        .write()
        .await
        .append(prefix_record("10.0.0.0/24", 24, 65000));

    let stream = TcpStream::connect(addr).await.expect("connect");
    let log = event_log();
    let mut session =
        CacheSession::new(stream, v0_session(true), RecordingHandler::new(log.clone()));
    let reason = session.run().await.expect("run");

    assert_eq!(reason, StopReason::Done);
    assert_eq!(session.session_id(), SESSION_ID);
    assert_eq!(session.serial(), 1);
    assert_eq!(
        events_of(&log),
        vec![
            Event::Prefix {
                session_id: SESSION_ID,
                announce: true,
                prefix: Prefix::parse("10.0.0.0/24").expect("prefix"),
                max_len: 24,
                asn: 65000,
            },
            Event::EndOfData {
                session_id: SESSION_ID,
                serial: 1,
            },
        ]
    );
    cancel.cancel();
}

#[tokio::test]
#[serial_test::serial]
async fn serial_notify_drives_incremental_update() {
    let (state, addr, server_cancel) = start_server().await;
    state
        .cache
        .write()
        .await
        .append(prefix_record("10.0.0.0/24", 24, 65000));

    let stream = TcpStream::connect(addr).await.expect("connect");
    let log = event_log();
    let session_cancel = CancellationToken::new();
    let mut session = CacheSession::with_cancel(
        stream,
        v0_session(false),
        RecordingHandler::new(log.clone()),
        session_cancel.clone(),
    );
    let task = tokio::spawn(async move { session.run().await.expect("run") });

    // First synchronization.
    wait_for_event(&log, |e| matches!(e, Event::EndOfData { serial: 1, .. })).await;

    // Operator adds a prefix and notifies immediately; the client must
    // fetch the increment through a Serial Query.
    state
        .cache
        .write()
        .await
        .append(prefix_record("10.0.1.0/24", 24, 65001));
    state.notify_all().await;

    wait_for_event(&log, |e| matches!(e, Event::EndOfData { serial: 2, .. })).await;
    let events = events_of(&log);
    assert!(events.contains(&Event::Prefix {
        session_id: SESSION_ID,
        announce: true,
        prefix: Prefix::parse("10.0.1.0/24").expect("prefix"),
        max_len: 24,
        asn: 65001,
    }));
    // The increment must not repeat the already known record.
    let first_prefix_count = events
        .iter()
        .filter(|e| {
            matches!(e, Event::Prefix { prefix, .. }
                if *prefix == Prefix::parse("10.0.0.0/24").expect("prefix"))
        })
        .count();
    assert_eq!(first_prefix_count, 1);

    session_cancel.cancel();
    assert_eq!(task.await.expect("join"), StopReason::Cancelled);
    server_cancel.cancel();
}

/// Withdraw, purge, then ask for an incremental update from a stale
/// serial: the server must answer with a Cache Reset.
#[tokio::test]
#[serial_test::serial]
async fn expired_serial_forces_cache_reset() {
    let (state, addr, cancel) = start_server().await;
    {
        let mut cache = state.cache.write().await;
        cache.append(prefix_record("10.0.0.0/24", 24, 65000)); // serial 1
        // Withdraw with a timestamp far in the past so the next
        // service tick finds the entry expired.
        cache.withdraw(1, 1, 0);
    }
    service_tick(&state).await;
    assert_eq!(state.cache.read().await.watermarks(), (1, 2));

    let mut stream = TcpStream::connect(addr).await.expect("connect");
    // Serial Query at serial 0 with the right session id.
    let mut query = vec![0u8, 1];
    query.extend_from_slice(&SESSION_ID.to_be_bytes());
    query.extend_from_slice(&12u32.to_be_bytes());
    query.extend_from_slice(&0u32.to_be_bytes());
    stream.write_all(&query).await.expect("send query");

    let reply = read_frame(&mut stream).await;
    assert_eq!(reply[1], 8, "expected a cache reset, got type {}", reply[1]);
    cancel.cancel();
}

#[tokio::test]
#[serial_test::serial]
async fn session_id_mismatch_drops_connection() {
    let (state, addr, cancel) = start_server().await;
    state
        .cache
        .write()
        .await
        .append(prefix_record("10.0.0.0/24", 24, 65000));

    let mut stream = TcpStream::connect(addr).await.expect("connect");
    // Serial Query with a wrong session id.
    let mut query = vec![0u8, 1];
    query.extend_from_slice(&0x9999u16.to_be_bytes());
    query.extend_from_slice(&12u32.to_be_bytes());
    query.extend_from_slice(&0u32.to_be_bytes());
    stream.write_all(&query).await.expect("send query");

    // The server answers by closing the connection.
    let mut buf = [0u8; 1];
    let n = stream.read(&mut buf).await.expect("read");
    assert_eq!(n, 0, "expected the server to drop the session");
    cancel.cancel();
}
