// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use redis_server_rs::resp::Frame;

use super::{TestClient, assert_error_contains, bulk, int, items, server, simple};

fn entry_id(entry: &Frame) -> Frame {
    items(entry.clone())[0].clone()
}

#[tokio::test]
async fn xadd_xlen_xrange() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    assert_eq!(c.cmd(&["XADD", "s", "1-1", "f", "a"]).await, bulk("1-1"));
    assert_eq!(c.cmd(&["XADD", "s", "1-2", "f", "b"]).await, bulk("1-2"));
    assert_eq!(c.cmd(&["XADD", "s", "2", "f", "c"]).await, bulk("2-0"));
    assert_eq!(c.cmd(&["XLEN", "s"]).await, int(3));

    // Monotonicity is enforced.
    assert_error_contains(
        &c.cmd(&["XADD", "s", "1-1", "f", "late"]).await,
        "equal or smaller",
    );

    let all = items(c.cmd(&["XRANGE", "s", "-", "+"]).await);
    assert_eq!(all.len(), 3);
    assert_eq!(entry_id(&all[0]), bulk("1-1"));
    assert_eq!(entry_id(&all[2]), bulk("2-0"));

    let window = items(c.cmd(&["XRANGE", "s", "1-2", "2-0"]).await);
    assert_eq!(window.len(), 2);
    let capped = items(c.cmd(&["XRANGE", "s", "-", "+", "COUNT", "1"]).await);
    assert_eq!(capped.len(), 1);

    // ms-* continues the sequence within a millisecond.
    assert_eq!(c.cmd(&["XADD", "s", "2-*", "f", "d"]).await, bulk("2-1"));
}

#[tokio::test]
async fn xread_returns_entries_after_id() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["XADD", "s", "1-1", "f", "a"]).await;
    c.cmd(&["XADD", "s", "2-1", "f", "b"]).await;

    let reply = items(c.cmd(&["XREAD", "STREAMS", "s", "1-1"]).await);
    assert_eq!(reply.len(), 1);
    let per_key = items(reply[0].clone());
    assert_eq!(per_key[0], bulk("s"));
    let entries = items(per_key[1].clone());
    assert_eq!(entries.len(), 1);
    assert_eq!(entry_id(&entries[0]), bulk("2-1"));

    // Nothing new: null array.
    assert_eq!(
        c.cmd(&["XREAD", "STREAMS", "s", "2-1"]).await,
        Frame::null_array()
    );
}

#[tokio::test]
async fn group_delivery_ack_pending_cycle() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["XADD", "s", "1-1", "f", "a"]).await;
    c.cmd(&["XADD", "s", "1-2", "f", "b"]).await;
    assert_eq!(c.cmd(&["XGROUP", "CREATE", "s", "g", "0"]).await, simple("OK"));
    assert_error_contains(
        &c.cmd(&["XGROUP", "CREATE", "s", "g", "0"]).await,
        "BUSYGROUP",
    );

    // First read delivers both entries to c1.
    let reply = items(
        c.cmd(&[
            "XREADGROUP", "GROUP", "g", "c1", "COUNT", "10", "STREAMS", "s", ">",
        ])
        .await,
    );
    let entries = items(items(reply[0].clone())[1].clone());
    assert_eq!(entries.len(), 2);

    // Ack one; the summary now shows a single pending entry.
    assert_eq!(c.cmd(&["XACK", "s", "g", "1-1"]).await, int(1));
    assert_eq!(c.cmd(&["XACK", "s", "g", "1-1"]).await, int(0));
    let summary = items(c.cmd(&["XPENDING", "s", "g"]).await);
    assert_eq!(summary[0], int(1));
    assert_eq!(summary[1], bulk("1-2"));
    assert_eq!(summary[2], bulk("1-2"));
    let per_consumer = items(summary[3].clone());
    assert_eq!(items(per_consumer[0].clone())[0], bulk("c1"));

    // Detail rows carry consumer and delivery count.
    let rows = items(c.cmd(&["XPENDING", "s", "g", "-", "+", "10"]).await);
    assert_eq!(rows.len(), 1);
    let row = items(rows[0].clone());
    assert_eq!(row[0], bulk("1-2"));
    assert_eq!(row[1], bulk("c1"));
    assert_eq!(row[3], int(1));
}

#[tokio::test]
async fn xclaim_reassigns_idle_entries() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["XADD", "s", "1-1", "f", "a"]).await;
    c.cmd(&["XGROUP", "CREATE", "s", "g", "0"]).await;
    c.cmd(&["XREADGROUP", "GROUP", "g", "c1", "STREAMS", "s", ">"])
        .await;

    // Zero idle threshold claims immediately.
    let claimed = items(
        c.cmd(&["XCLAIM", "s", "g", "c2", "0", "1-1"]).await,
    );
    assert_eq!(claimed.len(), 1);
    assert_eq!(entry_id(&claimed[0]), bulk("1-1"));

    let rows = items(c.cmd(&["XPENDING", "s", "g", "-", "+", "10"]).await);
    let row = items(rows[0].clone());
    assert_eq!(row[1], bulk("c2"));
    assert_eq!(row[3], int(2));

    // JUSTID answers bare ids.
    let ids = items(
        c.cmd(&["XCLAIM", "s", "g", "c3", "0", "1-1", "JUSTID"]).await,
    );
    assert_eq!(ids, vec![bulk("1-1")]);
}

#[tokio::test]
async fn xreadgroup_replays_own_pending() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["XADD", "s", "1-1", "f", "a"]).await;
    c.cmd(&["XGROUP", "CREATE", "s", "g", "0"]).await;
    c.cmd(&["XREADGROUP", "GROUP", "g", "c1", "STREAMS", "s", ">"])
        .await;

    // Replay from 0 shows the unacked entry again.
    let reply = items(
        c.cmd(&["XREADGROUP", "GROUP", "g", "c1", "STREAMS", "s", "0"])
            .await,
    );
    let entries = items(items(reply[0].clone())[1].clone());
    assert_eq!(entries.len(), 1);
    assert_eq!(entry_id(&entries[0]), bulk("1-1"));

    c.cmd(&["XACK", "s", "g", "1-1"]).await;
    let reply = items(
        c.cmd(&["XREADGROUP", "GROUP", "g", "c1", "STREAMS", "s", "0"])
            .await,
    );
    let entries = items(items(reply[0].clone())[1].clone());
    assert!(entries.is_empty());
}

#[tokio::test]
async fn missing_group_errors() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["XADD", "s", "1-1", "f", "a"]).await;
    assert_error_contains(
        &c.cmd(&["XREADGROUP", "GROUP", "ghost", "c", "STREAMS", "s", ">"])
            .await,
        "NOGROUP",
    );
    assert_error_contains(
        &c.cmd(&["XGROUP", "CREATE", "missing", "g", "0"]).await,
        "requires the key to exist",
    );
    // MKSTREAM creates it on the fly.
    assert_eq!(
        c.cmd(&["XGROUP", "CREATE", "missing", "g", "$", "MKSTREAM"])
            .await,
        simple("OK")
    );
}

#[tokio::test]
async fn xtrim_and_xdel() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    for i in 1..=50 {
        c.cmd(&["XADD", "s", &format!("{i}-1"), "f", "v"]).await;
    }
    assert_eq!(c.cmd(&["XDEL", "s", "1-1", "99-9"]).await, int(1));
    assert_eq!(c.cmd(&["XLEN", "s"]).await, int(49));

    // Exact trim cuts to the requested length, keeping the newest.
    match c.cmd(&["XTRIM", "s", "MAXLEN", "=", "10"]).await {
        Frame::Integer(n) => assert_eq!(n, 39),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(c.cmd(&["XLEN", "s"]).await, int(10));
    let all = items(c.cmd(&["XRANGE", "s", "-", "+"]).await);
    assert_eq!(entry_id(&all[0]), bulk("41-1"));

    // Approximate trim may keep a partial block extra.
    match c.cmd(&["XTRIM", "s", "MAXLEN", "~", "1"]).await {
        Frame::Integer(n) => assert!(n <= 9),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn xinfo_surfaces() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["XADD", "s", "1-1", "f", "a"]).await;
    c.cmd(&["XGROUP", "CREATE", "s", "g", "0"]).await;
    c.cmd(&["XREADGROUP", "GROUP", "g", "c1", "STREAMS", "s", ">"])
        .await;

    let info = items(c.cmd(&["XINFO", "STREAM", "s"]).await);
    let as_pairs: Vec<(String, Frame)> = info
        .chunks_exact(2)
        .map(|pair| {
            let name = match &pair[0] {
                Frame::Bulk(Some(b)) => String::from_utf8_lossy(b).into_owned(),
                other => panic!("bad field name {other:?}"),
            };
            (name, pair[1].clone())
        })
        .collect();
    assert!(as_pairs.iter().any(|(k, v)| k == "length" && *v == int(1)));
    assert!(
        as_pairs
            .iter()
            .any(|(k, v)| k == "groups" && *v == int(1))
    );

    let groups = items(c.cmd(&["XINFO", "GROUPS", "s"]).await);
    assert_eq!(groups.len(), 1);
    let consumers = items(c.cmd(&["XINFO", "CONSUMERS", "s", "g"]).await);
    assert_eq!(consumers.len(), 1);
}

#[tokio::test]
async fn xsetid_moves_the_frontier() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["XADD", "s", "5-5", "f", "a"]).await;
    assert_error_contains(
        &c.cmd(&["XSETID", "s", "1-1"]).await,
        "smaller than the target stream top item",
    );
    assert_eq!(c.cmd(&["XSETID", "s", "100-0"]).await, simple("OK"));
    assert_eq!(c.cmd(&["XADD", "s", "100-*", "f", "b"]).await, bulk("100-1"));
}
