//! UDP Transport Tests (xosc-transport)
//!
//! Tests for the UDP transport implementation including:
//! - Binding and configuration
//! - Senders bound to a remote peer
//! - Receiving through the `TransportReceiver` trait
//! - Packet size limits

use bytes::Bytes;
use std::time::Duration;
use xosc_core::Peer;
use xosc_transport::{
    TransportError, TransportEvent, TransportReceiver, TransportSender, UdpConfig, UdpTransport,
};

// ============================================================================
// Binding Tests
// ============================================================================

#[tokio::test]
async fn test_udp_bind_with_config() {
    let config = UdpConfig {
        recv_buffer_size: 16,
        max_packet_size: 1500,
    };

    let transport = UdpTransport::bind_with_config("127.0.0.1:0", config)
        .await
        .expect("Bind with config should succeed");

    assert!(transport.local_addr().is_ok());
    assert_eq!(transport.config().max_packet_size, 1500);
}

#[tokio::test]
async fn test_udp_bind_invalid_address() {
    let result = UdpTransport::bind("not-an-address").await;
    assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
}

#[test]
fn test_udp_config_defaults() {
    let config = UdpConfig::default();
    assert_eq!(config.max_packet_size, 65_507);
    assert!(config.recv_buffer_size > 0);
}

// ============================================================================
// Send / Receive Tests
// ============================================================================

#[tokio::test]
async fn test_sender_reaches_receiver() {
    let server = UdpTransport::bind("127.0.0.1:0").await.unwrap();
    let client = UdpTransport::bind("127.0.0.1:0").await.unwrap();
    let mut receiver = server.start_receiver();

    let sender = client.sender_to(server.local_addr().unwrap());
    assert_eq!(sender.remote(), server.local_peer().unwrap());

    sender.send(Bytes::from_static(b"/ping\0\0\0,\0\0\0")).await.unwrap();

    let (event, peer) = tokio::time::timeout(Duration::from_secs(2), receiver.recv())
        .await
        .expect("timed out")
        .expect("receiver closed");

    match event {
        TransportEvent::Data(data) => assert_eq!(&data[..], b"/ping\0\0\0,\0\0\0"),
        other => panic!("Expected Data event, got {:?}", other),
    }
    assert_eq!(peer, client.local_peer().unwrap());
    assert_eq!(peer.transport, "udp");
}

#[tokio::test]
async fn test_packets_arrive_in_order_on_loopback() {
    let server = UdpTransport::bind("127.0.0.1:0").await.unwrap();
    let client = UdpTransport::bind("127.0.0.1:0").await.unwrap();
    let mut receiver = server.start_receiver();
    let sender = client.sender_to(server.local_addr().unwrap());

    for i in 0u8..10 {
        sender.send(Bytes::from(vec![i; 4])).await.unwrap();
    }

    for i in 0u8..10 {
        let (event, _) = tokio::time::timeout(Duration::from_secs(2), receiver.recv_from())
            .await
            .expect("timed out")
            .expect("receiver closed");
        match event {
            TransportEvent::Data(data) => assert_eq!(data[0], i),
            other => panic!("Expected Data event, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_close_ends_receivers() {
    let server = UdpTransport::bind("127.0.0.1:0").await.unwrap();
    let mut receiver = server.start_receiver();
    assert!(!server.is_closed());

    server.close();
    assert!(server.is_closed());

    let (event, peer) = tokio::time::timeout(Duration::from_secs(2), receiver.recv())
        .await
        .expect("timed out")
        .expect("receiver closed without an event");
    assert!(matches!(event, TransportEvent::Closed { reason: Some(_) }));
    assert_eq!(peer, server.local_peer().unwrap());
    assert!(receiver.recv().await.is_none());

    // receivers started after closing end right away
    let mut late = server.start_receiver();
    let (event, _) = tokio::time::timeout(Duration::from_secs(2), late.recv_from())
        .await
        .expect("timed out")
        .unwrap();
    assert!(matches!(event, TransportEvent::Closed { .. }));
}

#[tokio::test]
async fn test_dropped_transport_ends_receivers() {
    let server = UdpTransport::bind("127.0.0.1:0").await.unwrap();
    let mut receiver = server.start_receiver();
    drop(server);

    let (event, _) = tokio::time::timeout(Duration::from_secs(2), receiver.recv_from())
        .await
        .expect("timed out")
        .unwrap();
    assert!(matches!(event, TransportEvent::Closed { .. }));
}

#[tokio::test]
async fn test_oversized_send_rejected() {
    let config = UdpConfig {
        max_packet_size: 8,
        ..Default::default()
    };
    let transport = UdpTransport::bind_with_config("127.0.0.1:0", config)
        .await
        .unwrap();
    let target = transport.local_addr().unwrap();

    let result = transport.send_to(&[0u8; 12], target).await;
    assert!(matches!(
        result,
        Err(TransportError::PacketTooLarge { size: 12, max: 8 })
    ));

    let sender = transport.sender_to(target);
    assert!(sender.send(Bytes::from_static(&[0u8; 9])).await.is_err());
    assert!(sender.send(Bytes::from_static(&[0u8; 8])).await.is_ok());
}

#[tokio::test]
async fn test_oversized_datagram_reported() {
    let config = UdpConfig {
        max_packet_size: 8,
        ..Default::default()
    };
    let server = UdpTransport::bind_with_config("127.0.0.1:0", config)
        .await
        .unwrap();
    let client = UdpTransport::bind("127.0.0.1:0").await.unwrap();
    let mut receiver = server.start_receiver();

    client
        .send_to(&[1u8; 16], server.local_addr().unwrap())
        .await
        .unwrap();

    let (event, _) = tokio::time::timeout(Duration::from_secs(2), receiver.recv_from())
        .await
        .expect("timed out")
        .expect("receiver closed");
    assert!(matches!(event, TransportEvent::Error(_)));
}

#[tokio::test]
async fn test_peer_from_socket_addr() {
    let peer = Peer::udp("10.0.0.5:9000".parse().unwrap());
    assert_eq!(peer.hostname, "10.0.0.5");
    assert_eq!(peer.port, 9000);
    assert_eq!(peer.to_string(), "udp://10.0.0.5:9000");
}
