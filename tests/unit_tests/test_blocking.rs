// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use redis_server_rs::resp::Frame;
use tokio::time::{sleep, timeout};

use super::{TestClient, bulk, int, items, server};

#[tokio::test]
async fn blpop_resolved_by_producer() {
    let srv = server();
    let mut producer = TestClient::connect(&srv);

    let waiter = {
        let srv = srv.clone();
        tokio::spawn(async move {
            let mut consumer = TestClient::connect(&srv);
            consumer.cmd(&["BLPOP", "q", "5"]).await
        })
    };
    // Let the consumer park before producing.
    sleep(Duration::from_millis(50)).await;
    assert_eq!(producer.cmd(&["RPUSH", "q", "hello"]).await, int(1));

    let reply = timeout(Duration::from_secs(1), waiter)
        .await
        .expect("unblocked within a second")
        .expect("task join");
    assert_eq!(items(reply), vec![bulk("q"), bulk("hello")]);
    // The popped element is gone.
    assert_eq!(producer.cmd(&["EXISTS", "q"]).await, int(0));
}

#[tokio::test]
async fn blpop_times_out_with_null() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    let started = tokio::time::Instant::now();
    let reply = c.cmd(&["BLPOP", "nothing", "0.1"]).await;
    assert_eq!(reply, Frame::null_array());
    assert!(started.elapsed() >= Duration::from_millis(90));
}

#[tokio::test]
async fn blpop_prefers_immediate_data() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["RPUSH", "q", "ready"]).await;
    let reply = c.cmd(&["BLPOP", "q", "5"]).await;
    assert_eq!(items(reply), vec![bulk("q"), bulk("ready")]);
}

#[tokio::test]
async fn brpop_takes_the_tail() {
    let srv = server();
    let mut producer = TestClient::connect(&srv);
    let waiter = {
        let srv = srv.clone();
        tokio::spawn(async move {
            let mut consumer = TestClient::connect(&srv);
            consumer.cmd(&["BRPOP", "q", "5"]).await
        })
    };
    sleep(Duration::from_millis(50)).await;
    producer.cmd(&["RPUSH", "q", "a", "b"]).await;
    let reply = timeout(Duration::from_secs(1), waiter)
        .await
        .expect("unblocked")
        .expect("join");
    assert_eq!(items(reply), vec![bulk("q"), bulk("b")]);
}

#[tokio::test]
async fn multi_key_wait_first_ready_wins() {
    let srv = server();
    let mut producer = TestClient::connect(&srv);
    let waiter = {
        let srv = srv.clone();
        tokio::spawn(async move {
            let mut consumer = TestClient::connect(&srv);
            consumer.cmd(&["BLPOP", "a", "b", "c", "5"]).await
        })
    };
    sleep(Duration::from_millis(50)).await;
    producer.cmd(&["RPUSH", "b", "via-b"]).await;
    let reply = timeout(Duration::from_secs(1), waiter)
        .await
        .expect("unblocked")
        .expect("join");
    assert_eq!(items(reply), vec![bulk("b"), bulk("via-b")]);
}

#[tokio::test]
async fn fifo_order_across_waiters() {
    let srv = server();
    let mut producer = TestClient::connect(&srv);

    let first = {
        let srv = srv.clone();
        tokio::spawn(async move {
            let mut c = TestClient::connect(&srv);
            c.cmd(&["BLPOP", "q", "5"]).await
        })
    };
    sleep(Duration::from_millis(30)).await;
    let second = {
        let srv = srv.clone();
        tokio::spawn(async move {
            let mut c = TestClient::connect(&srv);
            c.cmd(&["BLPOP", "q", "5"]).await
        })
    };
    sleep(Duration::from_millis(30)).await;

    producer.cmd(&["RPUSH", "q", "one"]).await;
    let got_first = timeout(Duration::from_secs(1), first)
        .await
        .expect("first unblocked")
        .expect("join");
    assert_eq!(items(got_first), vec![bulk("q"), bulk("one")]);

    producer.cmd(&["RPUSH", "q", "two"]).await;
    let got_second = timeout(Duration::from_secs(1), second)
        .await
        .expect("second unblocked")
        .expect("join");
    assert_eq!(items(got_second), vec![bulk("q"), bulk("two")]);
}

#[tokio::test]
async fn bzpopmin_takes_lowest_score() {
    let srv = server();
    let mut producer = TestClient::connect(&srv);
    let waiter = {
        let srv = srv.clone();
        tokio::spawn(async move {
            let mut consumer = TestClient::connect(&srv);
            consumer.cmd(&["BZPOPMIN", "z", "5"]).await
        })
    };
    sleep(Duration::from_millis(50)).await;
    producer.cmd(&["ZADD", "z", "3", "high", "1", "low"]).await;
    let reply = timeout(Duration::from_secs(1), waiter)
        .await
        .expect("unblocked")
        .expect("join");
    assert_eq!(items(reply), vec![bulk("z"), bulk("low"), bulk("1")]);
}

#[tokio::test]
async fn bzpopmax_times_out() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    assert_eq!(
        c.cmd(&["BZPOPMAX", "none", "0.1"]).await,
        Frame::null_array()
    );
}

#[tokio::test]
async fn blmove_blocks_then_transfers() {
    let srv = server();
    let mut producer = TestClient::connect(&srv);
    let waiter = {
        let srv = srv.clone();
        tokio::spawn(async move {
            let mut consumer = TestClient::connect(&srv);
            consumer
                .cmd(&["BLMOVE", "src", "dst", "LEFT", "RIGHT", "5"])
                .await
        })
    };
    sleep(Duration::from_millis(50)).await;
    producer.cmd(&["RPUSH", "src", "elem"]).await;
    let reply = timeout(Duration::from_secs(1), waiter)
        .await
        .expect("unblocked")
        .expect("join");
    assert_eq!(reply, bulk("elem"));
    assert_eq!(
        items(producer.cmd(&["LRANGE", "dst", "0", "-1"]).await),
        vec![bulk("elem")]
    );
}

#[tokio::test]
async fn xread_block_wakes_on_xadd() {
    let srv = server();
    let mut producer = TestClient::connect(&srv);
    producer.cmd(&["XADD", "s", "1-1", "f", "old"]).await;

    let waiter = {
        let srv = srv.clone();
        tokio::spawn(async move {
            let mut consumer = TestClient::connect(&srv);
            consumer
                .cmd(&["XREAD", "BLOCK", "5000", "STREAMS", "s", "$"])
                .await
        })
    };
    sleep(Duration::from_millis(50)).await;
    producer.cmd(&["XADD", "s", "2-2", "f", "new"]).await;

    let reply = timeout(Duration::from_secs(1), waiter)
        .await
        .expect("unblocked")
        .expect("join");
    let streams = items(reply);
    assert_eq!(streams.len(), 1);
    let entry = items(streams[0].clone());
    assert_eq!(entry[0], bulk("s"));
    let entries = items(entry[1].clone());
    assert_eq!(entries.len(), 1);
    let first = items(entries[0].clone());
    // Only the entry appended after the read started is delivered.
    assert_eq!(first[0], bulk("2-2"));
}
