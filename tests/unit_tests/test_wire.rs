// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! End-to-end checks over a real TCP socket.

use std::time::Duration;

use serial_test::serial;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time::timeout,
};

use super::server;

async fn spawn_server() -> (std::net::SocketAddr, std::sync::Arc<redis_server_rs::server::Server>) {
    let srv = server();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let serving = srv.clone();
    tokio::spawn(async move {
        let _ = serving.serve(listener).await;
    });
    (addr, srv)
}

async fn read_until(stream: &mut TcpStream, expected_len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; 4096];
    let mut got = Vec::new();
    while got.len() < expected_len {
        let n = timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .expect("read timed out")
            .expect("read failed");
        assert!(n > 0, "peer closed early with {got:?}");
        got.extend_from_slice(&buf[..n]);
    }
    got
}

#[tokio::test]
#[serial]
async fn pipelined_commands_reply_in_order() {
    let (addr, srv) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).await.expect("connect");

    // Three commands in one write: replies must come back in order.
    stream
        .write_all(
            b"*1\r\n$4\r\nPING\r\n\
              *3\r\n$3\r\nSET\r\n$1\r\nk\r\n$5\r\nvalue\r\n\
              *2\r\n$3\r\nGET\r\n$1\r\nk\r\n",
        )
        .await
        .expect("write");

    let expected = b"+PONG\r\n+OK\r\n$5\r\nvalue\r\n";
    let got = read_until(&mut stream, expected.len()).await;
    assert_eq!(&got[..], &expected[..]);

    srv.shutdown.cancel();
}

#[tokio::test]
#[serial]
async fn inline_commands_are_accepted() {
    let (addr, srv) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).await.expect("connect");

    stream.write_all(b"PING\r\n").await.expect("write");
    let got = read_until(&mut stream, 7).await;
    assert_eq!(&got[..], b"+PONG\r\n");

    stream.write_all(b"SET inline yes\r\nGET inline\r\n").await.expect("write");
    let got = read_until(&mut stream, 5 + 9).await;
    assert_eq!(&got[..], b"+OK\r\n$3\r\nyes\r\n");

    srv.shutdown.cancel();
}

#[tokio::test]
#[serial]
async fn protocol_error_closes_connection() {
    let (addr, srv) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).await.expect("connect");

    // A negative bulk length other than -1 is malformed.
    stream.write_all(b"$-5\r\n").await.expect("write");

    let mut buf = Vec::new();
    let n = timeout(Duration::from_secs(2), stream.read_to_end(&mut buf))
        .await
        .expect("read timed out");
    // The error reply is flushed, then the server closes.
    assert!(n.is_ok());
    let text = String::from_utf8_lossy(&buf).into_owned();
    assert!(text.starts_with("-ERR Protocol error"), "got {text:?}");

    srv.shutdown.cancel();
}

#[tokio::test]
#[serial]
async fn binary_payloads_survive_the_wire() {
    let (addr, srv) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).await.expect("connect");

    let mut request = Vec::new();
    request.extend_from_slice(b"*3\r\n$3\r\nSET\r\n$3\r\nbin\r\n$4\r\n");
    request.extend_from_slice(&[0x00, 0xff, 0x0d, 0x0a]);
    request.extend_from_slice(b"\r\n*2\r\n$3\r\nGET\r\n$3\r\nbin\r\n");
    stream.write_all(&request).await.expect("write");

    let mut expected = Vec::new();
    expected.extend_from_slice(b"+OK\r\n$4\r\n");
    expected.extend_from_slice(&[0x00, 0xff, 0x0d, 0x0a]);
    expected.extend_from_slice(b"\r\n");
    let got = read_until(&mut stream, expected.len()).await;
    assert_eq!(got, expected);

    srv.shutdown.cancel();
}
