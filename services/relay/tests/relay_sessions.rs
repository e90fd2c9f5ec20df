
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use harness::{
    closed_port, read_until_closed, relay_config, wait_for, RelayHandle, RemotePeer, TEST_IDLE,
};
use hexrelay::relay::{Identity, Replace};
use hexrelay::{ClosePolicy, Endpoint, Hooks, Listener, RelayError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const WITHIN: Duration = Duration::from_secs(5);

#[tokio::test]
async fn ping_roundtrip_through_echo() {
    let echo = RemotePeer::echo().await.unwrap();
    let relay = RelayHandle::spawn(relay_config(echo.endpoint()), Hooks::default())
        .await
        .unwrap();

    let mut client = TcpStream::connect(relay.listen_addr).await.unwrap();
    client.write_all(b"ping").await.unwrap();

    let reply = read_until_closed(&mut client, WITHIN).await;
    assert_eq!(reply, b"ping");
    assert_eq!(echo.received(), b"ping");

    assert!(wait_for(WITHIN, || relay.sessions_closed() == 1).await);
    assert_eq!(relay.stats.bytes_to_remote.load(Ordering::Relaxed), 4);
    assert_eq!(relay.stats.bytes_to_client.load(Ordering::Relaxed), 4);
}

#[tokio::test]
async fn receive_first_forwards_banner_before_client_speaks() {
    let banner = b"220 relay-test ready\r\n";
    let remote = RemotePeer::banner(banner).await.unwrap();

    let mut config = relay_config(remote.endpoint());
    config.session.receive_first = true;
    let relay = RelayHandle::spawn(config, Hooks::default()).await.unwrap();

    let mut client = TcpStream::connect(relay.listen_addr).await.unwrap();

    // Nothing has been written yet; the banner must arrive on its own.
    let mut got = vec![0u8; banner.len()];
    timeout(WITHIN, client.read_exact(&mut got))
        .await
        .expect("banner not forwarded")
        .unwrap();
    assert_eq!(got, banner);
    assert!(remote.received().is_empty());

    client.write_all(b"USER anonymous\r\n").await.unwrap();
    let rest = read_until_closed(&mut client, WITHIN).await;
    assert_eq!(rest, b"USER anonymous\r\n");
}

#[tokio::test]
async fn receive_first_with_silent_remote_still_relays_client() {
    let sink = RemotePeer::sink().await.unwrap();
    let mut config = relay_config(sink.endpoint());
    config.session.receive_first = true;
    let relay = RelayHandle::spawn(config, Hooks::default()).await.unwrap();

    let mut client = TcpStream::connect(relay.listen_addr).await.unwrap();
    client.write_all(b"USER anonymous\r\n").await.unwrap();

    assert!(read_until_closed(&mut client, WITHIN).await.is_empty());
    assert!(wait_for(WITHIN, || sink.received() == b"USER anonymous\r\n").await);
    assert!(wait_for(WITHIN, || relay.sessions_closed() == 1).await);
    assert_eq!(relay.stats.bytes_to_remote.load(Ordering::Relaxed), 16);
}

#[tokio::test]
async fn remote_reset_ends_session_and_closes_client() {
    let reset = RemotePeer::reset().await.unwrap();
    let relay = RelayHandle::spawn(relay_config(reset.endpoint()), Hooks::default())
        .await
        .unwrap();

    let mut client = TcpStream::connect(relay.listen_addr).await.unwrap();
    client.write_all(b"ping").await.unwrap();

    assert!(read_until_closed(&mut client, WITHIN).await.is_empty());
    assert!(wait_for(WITHIN, || relay.sessions_closed() == 1).await);
    assert_eq!(relay.stats.bytes_to_remote.load(Ordering::Relaxed), 0);
    assert_eq!(relay.dial_failures(), 0);
}

#[tokio::test]
async fn silent_peers_close_both_sides() {
    let sink = RemotePeer::sink().await.unwrap();
    let relay = RelayHandle::spawn(relay_config(sink.endpoint()), Hooks::default())
        .await
        .unwrap();

    let mut client = TcpStream::connect(relay.listen_addr).await.unwrap();

    let started = tokio::time::Instant::now();
    let data = read_until_closed(&mut client, WITHIN).await;
    assert!(data.is_empty());
    // One round: a client drain and a remote drain, each idle.
    assert!(started.elapsed() >= TEST_IDLE);

    assert!(wait_for(WITHIN, || sink.saw_close.load(Ordering::Relaxed)).await);
    assert!(wait_for(WITHIN, || relay.sessions_closed() == 1).await);
    assert_eq!(sink.connection_count(), 1);
    assert!(sink.received().is_empty());
}

#[tokio::test]
async fn dial_failure_does_not_stop_acceptor() {
    let dead = closed_port().await;
    let relay = RelayHandle::spawn(
        relay_config(Endpoint::new(dead.ip().to_string(), dead.port())),
        Hooks::default(),
    )
    .await
    .unwrap();

    let mut first = TcpStream::connect(relay.listen_addr).await.unwrap();
    let mut buf = [0u8; 16];
    let n = timeout(WITHIN, first.read(&mut buf))
        .await
        .expect("client of failed session was not closed")
        .unwrap_or(0);
    assert_eq!(n, 0);
    assert!(wait_for(WITHIN, || relay.dial_failures() == 1).await);

    // The remote comes up; the same listener keeps serving.
    let echo = RemotePeer::echo_on(dead).await.unwrap();

    let mut second = TcpStream::connect(relay.listen_addr).await.unwrap();
    second.write_all(b"ping").await.unwrap();
    assert_eq!(read_until_closed(&mut second, WITHIN).await, b"ping");

    assert_eq!(echo.connection_count(), 1);
    assert!(wait_for(WITHIN, || relay.sessions_closed() == 2).await);
    assert_eq!(relay.stats.sessions_accepted.load(Ordering::Relaxed), 2);
    assert_eq!(relay.dial_failures(), 1);
}

#[tokio::test]
async fn bind_to_port_in_use_fails_without_serving() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let taken_addr = taken.local_addr().unwrap();

    let mut config = relay_config(Endpoint::new("127.0.0.1", 9));
    config.bind = Endpoint::new("127.0.0.1", taken_addr.port());

    match Listener::bind(config, Hooks::default()).await {
        Err(RelayError::Bind { addr, .. }) => assert_eq!(addr.port, taken_addr.port()),
        Err(other) => panic!("expected bind error, got {other}"),
        Ok(_) => panic!("bind to a port in use succeeded"),
    }

    // Connections still land on the original owner, not on a relay.
    let _client = TcpStream::connect(taken_addr).await.unwrap();
    timeout(WITHIN, taken.accept())
        .await
        .expect("original listener did not get the connection")
        .unwrap();
}

#[tokio::test]
async fn request_hook_rewrites_before_forwarding() {
    let echo = RemotePeer::echo().await.unwrap();
    let hooks = Hooks::new(
        Arc::new(Replace::new(Bytes::from_static(b"ping"), Bytes::from_static(b"PING"))),
        Arc::new(Identity),
    );
    let relay = RelayHandle::spawn(relay_config(echo.endpoint()), hooks)
        .await
        .unwrap();

    let mut client = TcpStream::connect(relay.listen_addr).await.unwrap();
    client.write_all(b"ping").await.unwrap();

    assert_eq!(read_until_closed(&mut client, WITHIN).await, b"PING");
    assert_eq!(echo.received(), b"PING");
}

#[tokio::test]
async fn both_silent_policy_keeps_one_sided_session_open() {
    let sink = RemotePeer::sink().await.unwrap();
    let mut config = relay_config(sink.endpoint());
    config.session.idle_timeout = Duration::from_millis(400);
    config.session.close_policy = ClosePolicy::BothSilent;
    let relay = RelayHandle::spawn(config, Hooks::default()).await.unwrap();

    let mut client = TcpStream::connect(relay.listen_addr).await.unwrap();
    client.write_all(b"one").await.unwrap();
    // Round one ends after ~800ms (client drain, then a silent remote drain);
    // this lands in the middle of round two's client drain.
    tokio::time::sleep(Duration::from_millis(1000)).await;
    client.write_all(b"two").await.unwrap();

    let data = read_until_closed(&mut client, WITHIN).await;
    assert!(data.is_empty());
    assert!(wait_for(WITHIN, || sink.received() == b"onetwo").await);
    assert!(wait_for(WITHIN, || relay.sessions_closed() == 1).await);
}
