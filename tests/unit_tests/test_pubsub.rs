// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use super::{TestClient, assert_error_contains, bulk, int, items, server, simple};

#[tokio::test]
async fn subscribe_confirms_per_channel() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["SUBSCRIBE", "news", "sports"]).await;
    let first = items(c.next_frame().expect("second confirm"));
    assert_eq!(first[0], bulk("subscribe"));
    assert_eq!(first[1], bulk("sports"));
    assert_eq!(first[2], int(2));
}

#[tokio::test]
async fn publish_reaches_channel_and_pattern() {
    let srv = server();
    let mut publisher = TestClient::connect(&srv);
    let mut direct = TestClient::connect(&srv);
    let mut wildcard = TestClient::connect(&srv);

    direct.cmd(&["SUBSCRIBE", "news.tech"]).await;
    wildcard.cmd(&["PSUBSCRIBE", "news.*"]).await;

    assert_eq!(
        publisher.cmd(&["PUBLISH", "news.tech", "hello"]).await,
        int(2)
    );

    let msg = items(direct.next_frame().expect("message"));
    assert_eq!(msg[0], bulk("message"));
    assert_eq!(msg[1], bulk("news.tech"));
    assert_eq!(msg[2], bulk("hello"));

    let pmsg = items(wildcard.next_frame().expect("pmessage"));
    assert_eq!(pmsg[0], bulk("pmessage"));
    assert_eq!(pmsg[1], bulk("news.*"));
    assert_eq!(pmsg[2], bulk("news.tech"));
    assert_eq!(pmsg[3], bulk("hello"));

    // Nobody listens on an unrelated channel.
    assert_eq!(publisher.cmd(&["PUBLISH", "other", "x"]).await, int(0));
}

#[tokio::test]
async fn subscriber_confinement() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["SUBSCRIBE", "ch"]).await;
    // Writes are rejected while subscribed...
    assert_error_contains(
        &c.cmd(&["SET", "k", "v"]).await,
        "only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT / RESET",
    );
    // ...but PING answers in push shape.
    let pong = items(c.cmd(&["PING"]).await);
    assert_eq!(pong[0], bulk("pong"));
    // Leaving subscribe mode restores the full command set.
    c.cmd(&["UNSUBSCRIBE"]).await;
    assert_eq!(c.cmd(&["SET", "k", "v"]).await, simple("OK"));
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let srv = server();
    let mut publisher = TestClient::connect(&srv);
    let mut sub = TestClient::connect(&srv);
    sub.cmd(&["SUBSCRIBE", "ch"]).await;
    sub.cmd(&["UNSUBSCRIBE", "ch"]).await;
    assert_eq!(publisher.cmd(&["PUBLISH", "ch", "x"]).await, int(0));
    assert!(sub.next_frame().is_none());
}

#[tokio::test]
async fn pubsub_introspection() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    let mut sub = TestClient::connect(&srv);
    sub.cmd(&["SUBSCRIBE", "alpha", "beta"]).await;
    sub.next_frame();
    sub.cmd(&["PSUBSCRIBE", "al*"]).await;

    let channels = items(c.cmd(&["PUBSUB", "CHANNELS"]).await);
    assert_eq!(channels, vec![bulk("alpha"), bulk("beta")]);
    let filtered = items(c.cmd(&["PUBSUB", "CHANNELS", "al*"]).await);
    assert_eq!(filtered, vec![bulk("alpha")]);
    let numsub = items(c.cmd(&["PUBSUB", "NUMSUB", "alpha", "ghost"]).await);
    assert_eq!(numsub, vec![bulk("alpha"), int(1), bulk("ghost"), int(0)]);
    assert_eq!(c.cmd(&["PUBSUB", "NUMPAT"]).await, int(1));
}

#[tokio::test]
async fn reset_leaves_subscribe_mode() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["SUBSCRIBE", "ch"]).await;
    assert_eq!(c.cmd(&["RESET"]).await, simple("RESET"));
    assert_eq!(c.cmd(&["SET", "k", "v"]).await, simple("OK"));
}
