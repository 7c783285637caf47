//! End-to-end delivery against an in-process NSCA daemon

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{field_str, refused_channel, refused_port, Behaviour, MockDaemon};
use nsca_protocol::config::{ChannelConfig, PoolConfig};
use nsca_protocol::core::obfuscation::{self, ObfuscationMethod};
use nsca_protocol::core::packet::{
    self, HOST_FIELD_SIZE, HOST_OFFSET, MESSAGE_FIELD_SIZE, MESSAGE_OFFSET, PACKET_SIZE,
    PACKET_VERSION, SERVICE_FIELD_SIZE, SERVICE_OFFSET, SEVERITY_OFFSET, TIMESTAMP_OFFSET,
};
use nsca_protocol::protocol::handshake::{HandshakeInfo, IV_SIZE};
use nsca_protocol::service::delivery::deliver;
use nsca_protocol::transport::{ConnectionState, NscaConnection, CONNECT_ATTEMPTS};
use nsca_protocol::{Alert, Channel, Dispatcher, NscaClient, ProtocolError, Severity, Submission};
use nsca_protocol::utils::Metrics;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

fn be_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

fn be_i32(buf: &[u8], at: usize) -> i32 {
    i32::from_be_bytes(buf[at..at + 4].try_into().unwrap())
}

#[tokio::test]
async fn test_plain_alert_reaches_daemon() {
    let handshake = HandshakeInfo::new([0x5A; IV_SIZE], 1_700_000_000);
    let mut daemon = MockDaemon::start(Behaviour::Normal, handshake).await;
    let channel = Channel::from_config(&daemon.channel_config()).unwrap();

    let dispatcher = Dispatcher::new(PoolConfig {
        core_workers: 2,
        max_workers: 2,
        queue_capacity: 16,
        ..PoolConfig::default()
    })
    .unwrap();
    let client = NscaClient::new(channel, dispatcher.clone());

    assert_eq!(
        client.send(Severity::Ok, "Everything is peachy-keen"),
        Submission::Queued
    );
    let pkt = daemon.next_packet().await;
    dispatcher.shutdown().await;

    assert_eq!(pkt.len(), PACKET_SIZE);
    assert_eq!(be_u16(&pkt, 0), PACKET_VERSION);
    assert!(packet::verify_checksum(&pkt));
    assert_eq!(be_i32(&pkt, TIMESTAMP_OFFSET), 1_700_000_000);
    assert_eq!(be_u16(&pkt, SEVERITY_OFFSET), 0);
    assert_eq!(
        field_str(&pkt[HOST_OFFSET..HOST_OFFSET + HOST_FIELD_SIZE]),
        "app-server-01"
    );
    assert_eq!(
        field_str(&pkt[SERVICE_OFFSET..SERVICE_OFFSET + SERVICE_FIELD_SIZE]),
        "domainBus"
    );
    assert_eq!(
        field_str(&pkt[MESSAGE_OFFSET..MESSAGE_OFFSET + MESSAGE_FIELD_SIZE]),
        "Everything is peachy-keen"
    );

    let snap = dispatcher.metrics().snapshot();
    assert_eq!(snap.delivered, 1);
    assert_eq!(snap.bytes_sent, PACKET_SIZE as u64);
    assert_eq!(snap.connections_active, 0);
}

#[tokio::test]
async fn test_xor_alert_can_be_recovered_by_daemon() {
    let handshake = HandshakeInfo::new([0xAA; IV_SIZE], 42);
    let mut daemon = MockDaemon::start(Behaviour::Normal, handshake).await;
    let channel = Channel::from_config(&ChannelConfig {
        obfuscation_method: 1,
        shared_secret: "asdf".into(),
        ..daemon.channel_config()
    })
    .unwrap();

    let alert = Alert::new(Severity::Critical, "disk full on /var");
    let written = deliver(&channel, &alert, None).await.unwrap();
    assert_eq!(written, PACKET_SIZE);

    let mut pkt = daemon.next_packet().await;
    // obfuscated on the wire
    assert!(!packet::verify_checksum(&pkt));

    obfuscation::transform(ObfuscationMethod::Xor, &mut pkt, &[0xAA; IV_SIZE], b"asdf");
    assert!(packet::verify_checksum(&pkt));
    assert_eq!(be_u16(&pkt, SEVERITY_OFFSET), Severity::Critical.code());
    assert_eq!(be_i32(&pkt, TIMESTAMP_OFFSET), 42);
    assert_eq!(
        field_str(&pkt[MESSAGE_OFFSET..MESSAGE_OFFSET + MESSAGE_FIELD_SIZE]),
        "disk full on /var"
    );
}

#[tokio::test]
async fn test_oversized_message_is_truncated_on_the_wire() {
    let handshake = HandshakeInfo::new([0u8; IV_SIZE], 7);
    let mut daemon = MockDaemon::start(Behaviour::Normal, handshake).await;
    let channel = Channel::from_config(&daemon.channel_config()).unwrap();

    let long = "x".repeat(MESSAGE_FIELD_SIZE + 100);
    deliver(&channel, &Alert::new(Severity::Warning, long), None)
        .await
        .unwrap();

    let pkt = daemon.next_packet().await;
    assert_eq!(pkt.len(), PACKET_SIZE);
    assert!(pkt[MESSAGE_OFFSET..].iter().all(|b| *b == b'x'));
    assert!(packet::verify_checksum(&pkt));
}

#[tokio::test]
async fn test_short_handshake_sends_nothing() {
    let handshake = HandshakeInfo::new([1u8; IV_SIZE], 1);
    let mut daemon = MockDaemon::start(Behaviour::ShortHandshake, handshake).await;
    let channel = Channel::from_config(&daemon.channel_config()).unwrap();

    let result = deliver(&channel, &Alert::new(Severity::Ok, "hello"), None).await;
    assert!(matches!(result, Err(ProtocolError::HandshakeError(_))));

    let nothing = tokio::time::timeout(Duration::from_millis(200), daemon.packets.recv()).await;
    assert!(!matches!(nothing, Ok(Some(_))), "no packet bytes expected");
}

#[tokio::test]
async fn test_silent_daemon_times_out_handshake() {
    let handshake = HandshakeInfo::new([1u8; IV_SIZE], 1);
    let daemon = MockDaemon::start(Behaviour::Silent, handshake).await;
    let channel = Channel::from_config(&ChannelConfig {
        socket_timeout: Duration::from_millis(100),
        ..daemon.channel_config()
    })
    .unwrap();

    let mut conn = NscaConnection::open(&channel).await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Connected);

    let result = conn.read_handshake().await;
    assert!(matches!(result, Err(ProtocolError::HandshakeError(_))));
    assert_eq!(conn.state(), ConnectionState::Failed);
}

#[tokio::test]
async fn test_refused_endpoint_exhausts_attempts() {
    let channel = refused_channel(refused_port().await);
    let metrics = Arc::new(Metrics::new());

    let result = deliver(
        &channel,
        &Alert::new(Severity::Critical, "x"),
        Some(Arc::clone(&metrics)),
    )
    .await;
    match result {
        Err(ProtocolError::ConnectionError { attempts, address, .. }) => {
            assert_eq!(attempts, CONNECT_ATTEMPTS);
            assert_eq!(address, channel.address());
        }
        other => panic!("expected connection error, got {other:?}"),
    }

    let snap = metrics.snapshot();
    assert_eq!(snap.connect_attempts, u64::from(CONNECT_ATTEMPTS));
    assert_eq!(snap.connections_total, 0);
}

#[tokio::test]
async fn test_reachable_endpoint_connects_once() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    let acceptor = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(stream);
        }
    });

    let metrics = Arc::new(Metrics::new());
    let channel = Channel::from_config(&ChannelConfig {
        host: "127.0.0.1".into(),
        port,
        reporting_host: Some("app-server-01".into()),
        ..ChannelConfig::default()
    })
    .unwrap();
    let conn = NscaConnection::open_with_metrics(&channel, Some(Arc::clone(&metrics)))
        .await
        .unwrap();
    conn.close().await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(metrics.snapshot().connect_attempts, 1);
    assert_eq!(metrics.snapshot().connections_active, 0);
    acceptor.abort();
}

#[tokio::test]
async fn test_send_before_handshake_is_out_of_order() {
    let handshake = HandshakeInfo::new([0u8; IV_SIZE], 0);
    let daemon = MockDaemon::start(Behaviour::Normal, handshake).await;
    let channel = Channel::from_config(&daemon.channel_config()).unwrap();

    let mut conn = NscaConnection::open(&channel).await.unwrap();
    let result = conn.send_packet(bytes::Bytes::from(vec![0u8; PACKET_SIZE])).await;
    assert!(matches!(result, Err(ProtocolError::UnexpectedState(_))));
}

#[tokio::test]
async fn test_random_iv_and_secret_round_trip() {
    use rand::Rng;

    let mut rng = rand::rng();
    let mut iv = [0u8; IV_SIZE];
    rng.fill(&mut iv[..]);
    let timestamp: i32 = rng.random();
    let secret: String = (0..rng.random_range(1..40))
        .map(|_| rng.random_range(b'!'..=b'~') as char)
        .collect();

    let mut daemon = MockDaemon::start(Behaviour::Normal, HandshakeInfo::new(iv, timestamp)).await;
    let channel = Channel::from_config(&ChannelConfig {
        obfuscation_method: 1,
        shared_secret: secret.clone(),
        ..daemon.channel_config()
    })
    .unwrap();

    deliver(&channel, &Alert::new(Severity::Unknown, "random check"), None)
        .await
        .unwrap();

    let mut pkt = daemon.next_packet().await;
    obfuscation::transform(ObfuscationMethod::Xor, &mut pkt, &iv, secret.as_bytes());
    assert!(packet::verify_checksum(&pkt));
    assert_eq!(be_i32(&pkt, TIMESTAMP_OFFSET), timestamp);
    assert_eq!(be_u16(&pkt, SEVERITY_OFFSET), 3);
}
