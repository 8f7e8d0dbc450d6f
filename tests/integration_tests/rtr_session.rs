// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Session state machine scenarios driven over in-memory pipes.

use bgpsec_rtr_rs::{
    client::session::{CacheSession, SessionConfig, StopReason},
    models::{
        common::{PduFlags, ProtocolVersion},
        end_of_data::EndOfDataPdu,
        error_report::ErrorReportPdu,
        notify::{CacheResponsePdu, SerialNotifyPdu},
        pdu_type::ErrorCode,
        prefix::Prefix,
        prefix_pdu::Ipv4PrefixPdu,
    },
};
use tokio::io::{AsyncReadExt, duplex};
use zerocopy::IntoBytes;

use crate::integration_tests::common::{
    Event, RecordingHandler, event_log, events_of, read_frame, send,
};

fn v0_config(stop_after_eod: bool) -> SessionConfig {
    SessionConfig {
        client_id: 1,
        version: ProtocolVersion::V0,
        allow_downgrade: true,
        stop_after_end_of_data: stop_after_eod,
    }
}

/// Reset query round trip: one prefix, one end of data (scenario with
/// literal values from the protocol specification).
#[tokio::test]
async fn reset_query_round_trip() {
    let (client_io, mut cache_io) = duplex(4096);
    let log = event_log();
    let mut session =
        CacheSession::new(client_io, v0_config(true), RecordingHandler::new(log.clone()));

    let task = tokio::spawn(async move {
        let reason = session.run().await.expect("session run");
        (session, reason)
    });

    // The client opens with a version 0 Reset Query.
    let query = read_frame(&mut cache_io).await;
    assert_eq!(query, vec![0, 2, 0, 0, 0, 0, 0, 8]);

    send(
        &mut cache_io,
        CacheResponsePdu::new(ProtocolVersion::V0, 0x1234).as_bytes(),
    )
    .await;
    let prefix = Prefix::parse("10.0.0.0/24").expect("prefix");
    send(
        &mut cache_io,
        Ipv4PrefixPdu::new(
            ProtocolVersion::V0,
            PduFlags::ANNOUNCEMENT,
            prefix,
            24,
            65000,
        )
        .as_bytes(),
    )
    .await;
    send(
        &mut cache_io,
        &EndOfDataPdu::new(ProtocolVersion::V0, 0x1234, 1).encode(),
    )
    .await;

    let (session, reason) = task.await.expect("join");
    assert_eq!(reason, StopReason::Done);
    assert_eq!(session.session_id(), 0x1234);
    assert_eq!(session.serial(), 1);

    assert_eq!(
        events_of(&log),
        vec![
            Event::Prefix {
                session_id: 0x1234,
                announce: true,
                prefix,
                max_len: 24,
                asn: 65000,
            },
            Event::EndOfData {
                session_id: 0x1234,
                serial: 1,
            },
        ]
    );
}

/// Session id change across a reconnect: the old session dies on an
/// error report, the new one latches 0x5678 and announces both the
/// change and, after End of Data, the re-establishment.
#[tokio::test]
async fn session_id_change_after_reconnect() {
    let log = event_log();

    // First connection: synced at (0x1234, serial 7), then the cache
    // answers the next Serial Query with a fatal Corrupt Data report.
    let (client_io, mut cache_io) = duplex(4096);
    let mut session = CacheSession::new(
        client_io,
        v0_config(false),
        RecordingHandler::new(log.clone()),
    )
    .resume_from(0x1234, 7);

    let task = tokio::spawn(async move {
        let reason = session.run().await.expect("session run");
        (session, reason)
    });

    let _reset = read_frame(&mut cache_io).await;
    send(
        &mut cache_io,
        CacheResponsePdu::new(ProtocolVersion::V0, 0x1234).as_bytes(),
    )
    .await;
    send(
        &mut cache_io,
        &EndOfDataPdu::new(ProtocolVersion::V0, 0x1234, 7).encode(),
    )
    .await;
    send(
        &mut cache_io,
        SerialNotifyPdu::new(ProtocolVersion::V0, 0x1234, 8).as_bytes(),
    )
    .await;

    // The notify triggers a Serial Query echoing serial 7.
    let serial_query = read_frame(&mut cache_io).await;
    assert_eq!(serial_query[1], 1);
    assert_eq!(&serial_query[2..4], &[0x12, 0x34]);
    assert_eq!(&serial_query[8..12], &[0, 0, 0, 7]);

    send(
        &mut cache_io,
        &ErrorReportPdu::new(
            ProtocolVersion::V0,
            ErrorCode::CorruptData,
            Vec::new(),
            "corrupt data",
        )
        .encode(),
    )
    .await;

    let (first_session, reason) = task.await.expect("join");
    assert_eq!(reason, StopReason::PeerError(0));

    // Reconnect, carrying the previous session state.
    let (client_io, mut cache_io) = duplex(4096);
    let mut session = CacheSession::new(
        client_io,
        v0_config(false),
        RecordingHandler::new(log.clone()),
    )
    .resume_from(first_session.session_id(), first_session.serial());

    let task = tokio::spawn(async move {
        let reason = session.run().await.expect("session run");
        (session, reason)
    });

    let _reset = read_frame(&mut cache_io).await;
    send(
        &mut cache_io,
        CacheResponsePdu::new(ProtocolVersion::V0, 0x5678).as_bytes(),
    )
    .await;
    send(
        &mut cache_io,
        &EndOfDataPdu::new(ProtocolVersion::V0, 0x5678, 1).encode(),
    )
    .await;
    drop(cache_io);

    let (session, reason) = task.await.expect("join");
    assert_eq!(reason, StopReason::ConnectionLost);
    assert_eq!(session.session_id(), 0x5678);
    assert!(!session.session_id_changed());

    let events = events_of(&log);
    let changes: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, Event::SessionIdChanged(_)))
        .collect();
    assert_eq!(changes, vec![&Event::SessionIdChanged(0x5678)]);
    let established: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, Event::SessionIdEstablished(_)))
        .collect();
    assert_eq!(established, vec![&Event::SessionIdEstablished(0x5678)]);
}

/// Version downgrade during the handshake: a version 2 client accepts
/// a version 1 cache silently.
#[tokio::test]
async fn version_downgrade_during_startup() {
    let (client_io, mut cache_io) = duplex(4096);
    let log = event_log();
    let cfg = SessionConfig {
        client_id: 1,
        version: ProtocolVersion::V2,
        allow_downgrade: true,
        stop_after_end_of_data: true,
    };
    let mut session = CacheSession::new(client_io, cfg, RecordingHandler::new(log.clone()));

    let task = tokio::spawn(async move {
        let reason = session.run().await.expect("session run");
        (session, reason)
    });

    let query = read_frame(&mut cache_io).await;
    assert_eq!(query[0], 2, "client must offer version 2");

    send(
        &mut cache_io,
        CacheResponsePdu::new(ProtocolVersion::V1, 0x0042).as_bytes(),
    )
    .await;
    send(
        &mut cache_io,
        &EndOfDataPdu::new(ProtocolVersion::V1, 0x0042, 3).encode(),
    )
    .await;

    let (session, reason) = task.await.expect("join");
    assert_eq!(reason, StopReason::Done);
    assert_eq!(session.version(), ProtocolVersion::V1);

    // No Error Report was emitted: the pipe holds no further bytes.
    drop(session);
    let mut rest = Vec::new();
    cache_io.read_to_end(&mut rest).await.expect("drain");
    assert!(rest.is_empty(), "unexpected client bytes: {rest:?}");

    assert!(
        events_of(&log)
            .iter()
            .all(|e| !matches!(e, Event::Error { .. }))
    );
}

/// No Data Available keeps the session alive for a later retry.
#[tokio::test]
async fn no_data_available_is_not_fatal() {
    let (client_io, mut cache_io) = duplex(4096);
    let log = event_log();
    let mut session = CacheSession::new(
        client_io,
        v0_config(false),
        RecordingHandler::new(log.clone()),
    );

    let task = tokio::spawn(async move { session.run().await.expect("session run") });

    let _query = read_frame(&mut cache_io).await;
    send(
        &mut cache_io,
        &ErrorReportPdu::new(
            ProtocolVersion::V0,
            ErrorCode::NoDataAvailable,
            Vec::new(),
            "no data yet",
        )
        .encode(),
    )
    .await;

    assert_eq!(task.await.expect("join"), StopReason::RetryLater);
    assert_eq!(events_of(&log), vec![Event::Error { code: 2 }]);
}

/// A header with an impossible length field is answered with a Corrupt
/// Data report before the session dies.
#[tokio::test]
async fn corrupt_length_field_is_reported() {
    let (client_io, mut cache_io) = duplex(4096);
    let log = event_log();
    let mut session =
        CacheSession::new(client_io, v0_config(false), RecordingHandler::new(log));

    let task = tokio::spawn(async move { session.run().await.expect("session run") });

    let _query = read_frame(&mut cache_io).await;
    // length field of 4 is below the header size
    send(&mut cache_io, &[0u8, 3, 0, 0, 0, 0, 0, 4]).await;

    let report = read_frame(&mut cache_io).await;
    assert_eq!(report[1], 10, "expected an error report");
    assert_eq!(&report[2..4], &[0, 0], "expected code 0 (corrupt data)");

    assert_eq!(
        task.await.expect("join"),
        StopReason::ProtocolError(ErrorCode::CorruptData)
    );
}

/// A Cache Reset makes the client drop its data and reload.
#[tokio::test]
async fn cache_reset_triggers_reload() {
    let (client_io, mut cache_io) = duplex(4096);
    let log = event_log();
    let mut session = CacheSession::new(
        client_io,
        v0_config(true),
        RecordingHandler::new(log.clone()),
    )
    .resume_from(0x1234, 5);

    let task = tokio::spawn(async move { session.run().await.expect("session run") });

    let _reset = read_frame(&mut cache_io).await;
    // Answer with a Cache Reset instead of records.
    send(&mut cache_io, &[0u8, 8, 0, 0, 0, 0, 0, 8]).await;

    // The client must fall back to a fresh Reset Query.
    let second_query = read_frame(&mut cache_io).await;
    assert_eq!(second_query[1], 2);

    send(
        &mut cache_io,
        CacheResponsePdu::new(ProtocolVersion::V0, 0x1234).as_bytes(),
    )
    .await;
    send(
        &mut cache_io,
        &EndOfDataPdu::new(ProtocolVersion::V0, 0x1234, 9).encode(),
    )
    .await;

    assert_eq!(task.await.expect("join"), StopReason::Done);
    let events = events_of(&log);
    assert_eq!(events[0], Event::Reset);
}
