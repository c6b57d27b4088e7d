// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use redis_server_rs::{cluster::key_slot, resp::Frame};

use super::{TestClient, assert_error_contains, cluster_server, int, items, server, simple};

#[tokio::test]
async fn keyslot_requires_cluster_mode() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    assert_error_contains(
        &c.cmd(&["CLUSTER", "KEYSLOT", "x"]).await,
        "cluster support disabled",
    );
    // INFO and MYID still answer.
    match c.cmd(&["CLUSTER", "INFO"]).await {
        Frame::Bulk(Some(info)) => {
            let text = String::from_utf8_lossy(&info).into_owned();
            assert!(text.contains("cluster_enabled:0"));
        },
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn hash_tags_share_slots() {
    let srv = cluster_server();
    let mut c = TestClient::connect(&srv);
    let a = c.cmd(&["CLUSTER", "KEYSLOT", "{user1000}.profile"]).await;
    let b = c.cmd(&["CLUSTER", "KEYSLOT", "{user1000}.following"]).await;
    assert_eq!(a, b);
    assert_eq!(a, int(i64::from(key_slot(b"user1000"))));
}

#[tokio::test]
async fn unserved_slot_is_cluster_down() {
    let srv = cluster_server();
    let mut c = TestClient::connect(&srv);
    assert_error_contains(
        &c.cmd(&["GET", "somekey"]).await,
        "CLUSTERDOWN Hash slot not served",
    );
    // Exempt verbs keep working.
    assert_eq!(c.cmd(&["PING"]).await, simple("PONG"));
}

#[tokio::test]
async fn local_slots_serve_foreign_slots_redirect() {
    let srv = cluster_server();
    let mut c = TestClient::connect(&srv);

    let slot = key_slot(b"mykey");
    assert_eq!(
        c.cmd(&["CLUSTER", "ADDSLOTS", &slot.to_string()]).await,
        simple("OK")
    );
    assert_eq!(c.cmd(&["SET", "mykey", "v"]).await, simple("OK"));

    // A key hashing elsewhere redirects; with a single known node owning
    // only one slot the target slot is unowned, so the reply is
    // CLUSTERDOWN rather than MOVED.
    let foreign = (0..SLOTS_PROBE)
        .map(|i| format!("probe-{i}"))
        .find(|k| key_slot(k.as_bytes()) != slot)
        .expect("a key in another slot");
    assert_error_contains(&c.cmd(&["GET", &foreign]).await, "CLUSTERDOWN");
}

const SLOTS_PROBE: usize = 64;

#[tokio::test]
async fn moved_points_at_the_owner() {
    let srv = cluster_server();
    let mut c = TestClient::connect(&srv);

    // Own everything, then hand one slot to a peer via MEET + SETSLOT.
    assert_eq!(
        c.cmd(&["CLUSTER", "ADDSLOTSRANGE", "0", "16383"]).await,
        simple("OK")
    );
    assert_eq!(
        c.cmd(&["CLUSTER", "MEET", "10.9.9.9", "7009"]).await,
        simple("OK")
    );
    let peer_id = match c.cmd(&["CLUSTER", "NODES"]).await {
        Frame::Bulk(Some(text)) => {
            let text = String::from_utf8_lossy(&text).into_owned();
            text.lines()
                .find(|l| !l.contains("myself"))
                .and_then(|l| l.split(' ').next())
                .expect("peer line")
                .to_string()
        },
        other => panic!("unexpected {other:?}"),
    };
    let slot = key_slot(b"foreign");
    assert_eq!(
        c.cmd(&["CLUSTER", "SETSLOT", &slot.to_string(), "NODE", &peer_id])
            .await,
        simple("OK")
    );

    let reply = c.cmd(&["GET", "foreign"]).await;
    match reply {
        Frame::Error(msg) => {
            assert_eq!(msg, format!("MOVED {slot} 10.9.9.9:7009"));
        },
        other => panic!("expected MOVED, got {other:?}"),
    }
}

#[tokio::test]
async fn cross_slot_multikey_is_rejected() {
    let srv = cluster_server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["CLUSTER", "ADDSLOTSRANGE", "0", "16383"]).await;
    assert_eq!(
        c.cmd(&["MSET", "{tag}a", "1", "{tag}b", "2"]).await,
        simple("OK")
    );
    let k1 = "{tag}a".to_string();
    let mut k2 = String::new();
    for i in 0..SLOTS_PROBE {
        let candidate = format!("probe-{i}");
        if key_slot(candidate.as_bytes()) != key_slot(k1.as_bytes()) {
            k2 = candidate;
            break;
        }
    }
    assert_error_contains(
        &c.cmd(&["MSET", &k1, "1", &k2, "2"]).await,
        "CROSSSLOT",
    );
}

#[tokio::test]
async fn nodes_slots_and_counting() {
    let srv = cluster_server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["CLUSTER", "ADDSLOTSRANGE", "0", "16383"]).await;
    c.cmd(&["SET", "alpha", "1"]).await;
    c.cmd(&["SET", "beta", "2"]).await;

    match c.cmd(&["CLUSTER", "NODES"]).await {
        Frame::Bulk(Some(text)) => {
            let text = String::from_utf8_lossy(&text).into_owned();
            assert!(text.contains("myself,master"));
            assert!(text.contains("0-16383"));
        },
        other => panic!("unexpected {other:?}"),
    }

    let rows = items(c.cmd(&["CLUSTER", "SLOTS"]).await);
    assert_eq!(rows.len(), 1);
    let row = items(rows[0].clone());
    assert_eq!(row[0], int(0));
    assert_eq!(row[1], int(16383));

    let slot = key_slot(b"alpha");
    assert_eq!(
        c.cmd(&["CLUSTER", "COUNTKEYSINSLOT", &slot.to_string()]).await,
        int(1)
    );
    let keys = items(
        c.cmd(&["CLUSTER", "GETKEYSINSLOT", &slot.to_string(), "10"])
            .await,
    );
    assert_eq!(keys.len(), 1);

    match c.cmd(&["CLUSTER", "INFO"]).await {
        Frame::Bulk(Some(info)) => {
            let text = String::from_utf8_lossy(&info).into_owned();
            assert!(text.contains("cluster_enabled:1"));
            assert!(text.contains("cluster_state:ok"));
            assert!(text.contains("cluster_slots_assigned:16384"));
        },
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn select_restricted_in_cluster_mode() {
    let srv = cluster_server();
    let mut c = TestClient::connect(&srv);
    assert_eq!(c.cmd(&["SELECT", "0"]).await, simple("OK"));
    assert_error_contains(
        &c.cmd(&["SELECT", "1"]).await,
        "SELECT is not allowed in cluster mode",
    );
}
