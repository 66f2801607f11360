//! UDP end-to-end tests
//!
//! An `OscOutput` and an `OscInput` talking over loopback, plus rosc as an
//! independent peer on either side.

use rosc::{decoder, encoder, OscMessage, OscPacket, OscType};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use xosc_router::{serve_udp, InputConfig, OscInput, OscOutput, OutputConfig};
use xosc_transport::UdpTransport;

#[tokio::test]
async fn test_output_to_input_over_udp() {
    let server = UdpTransport::bind("127.0.0.1:0").await.unwrap();
    let client = UdpTransport::bind("127.0.0.1:0").await.unwrap();

    let input = Arc::new(OscInput::new(InputConfig::default()));
    let route = input.route::<f32>("/oscillator/4/frequency").unwrap();
    let mut updates = route.subscribe();
    let serving = serve_udp(input.clone(), &server);

    let sender = Arc::new(client.sender_to(server.local_addr().unwrap()));
    let output = OscOutput::new(sender, OutputConfig::default());
    output.route::<f32>("/oscillator/4/frequency").unwrap();
    output.send_async("/oscillator/4/frequency", 440.0f32).await.unwrap();

    let message = timeout(Duration::from_secs(2), updates.recv())
        .await
        .expect("timed out")
        .unwrap();
    assert_eq!(message.value, 440.0);
    assert_eq!(message.peer, client.local_peer().unwrap());

    input.close();
    serving.abort();
}

#[tokio::test]
async fn test_input_accepts_rosc_packets() {
    let server = UdpTransport::bind("127.0.0.1:0").await.unwrap();
    let input = Arc::new(OscInput::default());
    let route = input.route::<Vec<i32>>("/list").unwrap();
    let mut updates = route.subscribe();
    let serving = serve_udp(input.clone(), &server);

    let packet = OscPacket::Message(OscMessage {
        addr: "/list".to_string(),
        args: vec![OscType::Int(1), OscType::Int(2)],
    });
    let bytes = encoder::encode(&packet).unwrap();
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket
        .send_to(&bytes, server.local_addr().unwrap())
        .await
        .unwrap();

    let message = timeout(Duration::from_secs(2), updates.recv())
        .await
        .expect("timed out")
        .unwrap();
    assert_eq!(message.value, vec![1, 2]);

    serving.abort();
}

#[tokio::test]
async fn test_rosc_reads_output_packets() {
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let client = UdpTransport::bind("127.0.0.1:0").await.unwrap();

    let output = OscOutput::new(
        Arc::new(client.sender_to(socket.local_addr().unwrap())),
        OutputConfig::default(),
    );
    output.route::<String>("/name").unwrap();
    output.send_async("/name", "lead".to_string()).await.unwrap();

    let mut buf = [0u8; 1024];
    let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("timed out")
        .unwrap();

    match decoder::decode_udp(&buf[..len]).unwrap().1 {
        OscPacket::Message(m) => {
            assert_eq!(m.addr, "/name");
            assert_eq!(m.args, vec![OscType::String("lead".to_string())]);
        }
        OscPacket::Bundle(_) => panic!("Expected message, got bundle"),
    }
}

#[tokio::test]
async fn test_bundles_do_not_stop_the_loop() {
    let server = UdpTransport::bind("127.0.0.1:0").await.unwrap();
    let input = Arc::new(OscInput::default());
    let route = input.route::<i32>("/after").unwrap();
    let mut updates = route.subscribe();
    let serving = serve_udp(input.clone(), &server);

    let bundle = OscPacket::Bundle(rosc::OscBundle {
        timetag: rosc::OscTime {
            seconds: 0,
            fractional: 1,
        },
        content: vec![],
    });
    let after = OscPacket::Message(OscMessage {
        addr: "/after".to_string(),
        args: vec![OscType::Int(5)],
    });

    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let target = server.local_addr().unwrap();
    socket
        .send_to(&encoder::encode(&bundle).unwrap(), target)
        .await
        .unwrap();
    socket
        .send_to(&encoder::encode(&after).unwrap(), target)
        .await
        .unwrap();

    let message = timeout(Duration::from_secs(2), updates.recv())
        .await
        .expect("timed out")
        .unwrap();
    assert_eq!(message.value, 5);

    serving.abort();
}

#[tokio::test]
async fn test_closing_transport_ends_serving() {
    let server = UdpTransport::bind("127.0.0.1:0").await.unwrap();
    let input = Arc::new(OscInput::default());
    let serving = serve_udp(input.clone(), &server);

    server.close();
    timeout(Duration::from_secs(2), serving)
        .await
        .expect("receive loop still running")
        .unwrap();
    assert!(!input.is_closed());
}
