//! Integration tests exercising the QUIC transport end to end over the
//! loopback interface. These bind real UDP sockets, so they run by
//! default but stay off any shared network.

use std::sync::Arc;

use dep_core::Multiaddr;
use dep_crypto::Identity;
use dep_transport::TransportRegistry;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn quic_dial_and_accept_roundtrip_bytes() {
    let server_identity = Arc::new(Identity::generate());
    let client_identity = Arc::new(Identity::generate());

    let server_addr: Multiaddr = "/ip4/127.0.0.1/udp/0/quic-v1".parse().unwrap();
    let server_registry = TransportRegistry::new(server_identity.clone(), &server_addr)
        .await
        .expect("server bind");
    let bound_addr = server_registry.quic_endpoint().local_addr().unwrap();

    let client_addr: Multiaddr = "/ip4/127.0.0.1/udp/0/quic-v1".parse().unwrap();
    let client_registry = TransportRegistry::new(client_identity.clone(), &client_addr)
        .await
        .expect("client bind");

    let dial_addr: Multiaddr = format!(
        "/ip4/127.0.0.1/udp/{}/quic-v1",
        bound_addr.port()
    )
    .parse()
    .unwrap();

    let expected_client_id = client_identity.node_id();
    let server_task = tokio::spawn(async move {
        let conn = server_registry.accept().await.expect("accept");
        assert_eq!(conn.remote_node_id(), expected_client_id);
        let mut stream = conn.accept_stream().await.expect("accept stream");
        let mut buf = [0u8; 5];
        tokio::io::AsyncReadExt::read_exact(&mut stream, &mut buf)
            .await
            .expect("read");
        assert_eq!(&buf, b"hello");
    });

    let conn = client_registry
        .dial(&dial_addr, server_identity.node_id())
        .await
        .expect("dial");
    let mut stream = conn.open_stream().await.expect("open stream");
    stream.write_all(b"hello").await.expect("write");
    stream.close_write().await.expect("close write");

    server_task.await.expect("server task panicked");
}

#[tokio::test]
async fn dial_to_wrong_peer_identity_is_rejected() {
    let server_identity = Arc::new(Identity::generate());
    let wrong_expected = Identity::generate().node_id();

    let server_addr: Multiaddr = "/ip4/127.0.0.1/udp/0/quic-v1".parse().unwrap();
    let server_registry = TransportRegistry::new(server_identity.clone(), &server_addr)
        .await
        .expect("server bind");
    let bound_addr = server_registry.quic_endpoint().local_addr().unwrap();

    let client_identity = Arc::new(Identity::generate());
    let client_addr: Multiaddr = "/ip4/127.0.0.1/udp/0/quic-v1".parse().unwrap();
    let client_registry = TransportRegistry::new(client_identity, &client_addr)
        .await
        .expect("client bind");

    let dial_addr: Multiaddr = format!("/ip4/127.0.0.1/udp/{}/quic-v1", bound_addr.port())
        .parse()
        .unwrap();

    tokio::spawn(async move {
        let _ = server_registry.accept().await;
    });

    let result = client_registry.dial(&dial_addr, wrong_expected).await;
    assert!(result.is_err());
}
