// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use redis_server_rs::resp::Frame;

use super::{TestClient, assert_error_contains, bulk, int, items, server, simple};

#[tokio::test]
async fn multi_exec_collects_replies() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    assert_eq!(c.cmd(&["MULTI"]).await, simple("OK"));
    assert_eq!(c.cmd(&["SET", "k", "v"]).await, simple("QUEUED"));
    assert_eq!(c.cmd(&["INCR", "n"]).await, simple("QUEUED"));
    assert_eq!(c.cmd(&["GET", "k"]).await, simple("QUEUED"));
    let replies = items(c.cmd(&["EXEC"]).await);
    assert_eq!(replies, vec![simple("OK"), int(1), bulk("v")]);
    // State is cleared: a bare EXEC now errors.
    assert_error_contains(&c.cmd(&["EXEC"]).await, "EXEC without MULTI");
}

#[tokio::test]
async fn queue_error_aborts_exec() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["MULTI"]).await;
    assert_error_contains(&c.cmd(&["NOSUCHCMD"]).await, "unknown command");
    assert_eq!(c.cmd(&["SET", "k", "v"]).await, simple("QUEUED"));
    assert_error_contains(&c.cmd(&["EXEC"]).await, "EXECABORT");
    // Nothing executed.
    assert_eq!(c.cmd(&["EXISTS", "k"]).await, int(0));
}

#[tokio::test]
async fn runtime_errors_stay_inline() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["SET", "s", "text"]).await;
    c.cmd(&["MULTI"]).await;
    c.cmd(&["INCR", "s"]).await;
    c.cmd(&["SET", "after", "1"]).await;
    let replies = items(c.cmd(&["EXEC"]).await);
    assert_error_contains(&replies[0], "not an integer");
    assert_eq!(replies[1], simple("OK"));
    // The error did not abort the remaining commands.
    assert_eq!(c.cmd(&["GET", "after"]).await, bulk("1"));
}

#[tokio::test]
async fn discard_drops_the_queue() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["MULTI"]).await;
    c.cmd(&["SET", "k", "v"]).await;
    assert_eq!(c.cmd(&["DISCARD"]).await, simple("OK"));
    assert_eq!(c.cmd(&["EXISTS", "k"]).await, int(0));
    assert_error_contains(&c.cmd(&["DISCARD"]).await, "DISCARD without MULTI");
}

#[tokio::test]
async fn watch_invalidation_aborts_exec() {
    let srv = server();
    let mut alice = TestClient::connect(&srv);
    let mut bob = TestClient::connect(&srv);

    alice.cmd(&["SET", "x", "1"]).await;
    assert_eq!(alice.cmd(&["WATCH", "x"]).await, simple("OK"));
    assert_eq!(alice.cmd(&["MULTI"]).await, simple("OK"));
    assert_eq!(alice.cmd(&["INCR", "x"]).await, simple("QUEUED"));

    // Another client writes the watched key before EXEC.
    assert_eq!(bob.cmd(&["SET", "x", "42"]).await, simple("OK"));

    assert_eq!(alice.cmd(&["EXEC"]).await, Frame::null_array());
    // The queued INCR never ran.
    assert_eq!(alice.cmd(&["GET", "x"]).await, bulk("42"));
}

#[tokio::test]
async fn watch_survives_untouched_keys() {
    let srv = server();
    let mut alice = TestClient::connect(&srv);
    let mut bob = TestClient::connect(&srv);

    alice.cmd(&["SET", "x", "1"]).await;
    alice.cmd(&["WATCH", "x"]).await;
    alice.cmd(&["MULTI"]).await;
    alice.cmd(&["INCR", "x"]).await;
    // Writes to unrelated keys do not invalidate.
    bob.cmd(&["SET", "y", "9"]).await;
    let replies = items(alice.cmd(&["EXEC"]).await);
    assert_eq!(replies, vec![int(2)]);
}

#[tokio::test]
async fn watch_sees_delete_and_recreate() {
    let srv = server();
    let mut alice = TestClient::connect(&srv);
    let mut bob = TestClient::connect(&srv);

    alice.cmd(&["SET", "x", "1"]).await;
    alice.cmd(&["WATCH", "x"]).await;
    alice.cmd(&["MULTI"]).await;
    alice.cmd(&["GET", "x"]).await;
    bob.cmd(&["DEL", "x"]).await;
    bob.cmd(&["SET", "x", "1"]).await;
    assert_eq!(alice.cmd(&["EXEC"]).await, Frame::null_array());
}

#[tokio::test]
async fn unwatch_clears_watches() {
    let srv = server();
    let mut alice = TestClient::connect(&srv);
    let mut bob = TestClient::connect(&srv);

    alice.cmd(&["SET", "x", "1"]).await;
    alice.cmd(&["WATCH", "x"]).await;
    assert_eq!(alice.cmd(&["UNWATCH"]).await, simple("OK"));
    bob.cmd(&["SET", "x", "2"]).await;
    alice.cmd(&["MULTI"]).await;
    alice.cmd(&["INCR", "x"]).await;
    let replies = items(alice.cmd(&["EXEC"]).await);
    assert_eq!(replies, vec![int(3)]);
}

#[tokio::test]
async fn watch_inside_multi_is_rejected() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["MULTI"]).await;
    assert_error_contains(
        &c.cmd(&["WATCH", "x"]).await,
        "WATCH inside MULTI is not allowed",
    );
}

#[tokio::test]
async fn blocking_pop_inside_exec_degrades() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["MULTI"]).await;
    c.cmd(&["BLPOP", "empty", "5"]).await;
    let replies = items(c.cmd(&["EXEC"]).await);
    assert_eq!(replies, vec![Frame::null_array()]);
}
