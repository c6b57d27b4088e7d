// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;
use redis_server_rs::resp::Frame;

use super::{TestClient, assert_error_contains, bulk, int, items, server, simple};

#[tokio::test]
async fn ping_echo_and_unknown() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    assert_eq!(c.cmd(&["PING"]).await, simple("PONG"));
    assert_eq!(c.cmd(&["ping", "hey"]).await, bulk("hey"));
    assert_eq!(c.cmd(&["ECHO", "x"]).await, bulk("x"));
    assert_error_contains(&c.cmd(&["NOSUCH"]).await, "unknown command");
    assert_error_contains(&c.cmd(&["GET"]).await, "wrong number of arguments");
}

#[tokio::test]
async fn set_get_binary_exact() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    assert_eq!(c.cmd(&["SET", "k", "v"]).await, simple("OK"));
    assert_eq!(c.cmd(&["GET", "k"]).await, bulk("v"));
    assert_eq!(c.cmd(&["GET", "missing"]).await, Frame::null());
    assert_eq!(c.cmd(&["STRLEN", "k"]).await, int(1));
    assert_eq!(c.cmd(&["TYPE", "k"]).await, simple("string"));
}

#[tokio::test]
async fn set_options() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    assert_eq!(c.cmd(&["SET", "k", "v1", "NX"]).await, simple("OK"));
    assert_eq!(c.cmd(&["SET", "k", "v2", "NX"]).await, Frame::null());
    assert_eq!(c.cmd(&["GET", "k"]).await, bulk("v1"));
    assert_eq!(c.cmd(&["SET", "k", "v2", "XX", "GET"]).await, bulk("v1"));
    assert_eq!(c.cmd(&["SET", "other", "x", "XX"]).await, Frame::null());
    // KEEPTTL preserves a TTL set through EX.
    assert_eq!(
        c.cmd(&["SET", "t", "1", "EX", "100"]).await,
        simple("OK")
    );
    assert_eq!(c.cmd(&["SET", "t", "2", "KEEPTTL"]).await, simple("OK"));
    let ttl = c.cmd(&["TTL", "t"]).await;
    match ttl {
        Frame::Integer(n) => assert!((1..=100).contains(&n), "ttl {n}"),
        other => panic!("unexpected {other:?}"),
    }
    // Plain SET clears it.
    assert_eq!(c.cmd(&["SET", "t", "3"]).await, simple("OK"));
    assert_eq!(c.cmd(&["TTL", "t"]).await, int(-1));
}

#[tokio::test]
async fn incr_family() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    assert_eq!(c.cmd(&["INCR", "n"]).await, int(1));
    assert_eq!(c.cmd(&["INCRBY", "n", "41"]).await, int(42));
    assert_eq!(c.cmd(&["DECR", "n"]).await, int(41));
    assert_eq!(c.cmd(&["DECRBY", "n", "40"]).await, int(1));
    assert_eq!(c.cmd(&["INCRBYFLOAT", "f", "1.5"]).await, bulk("1.5"));
    assert_eq!(c.cmd(&["INCRBYFLOAT", "f", "0.5"]).await, bulk("2"));
    c.cmd(&["SET", "s", "notanumber"]).await;
    assert_error_contains(&c.cmd(&["INCR", "s"]).await, "not an integer");
}

#[tokio::test]
async fn append_ranges() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    assert_eq!(c.cmd(&["APPEND", "k", "Hello "]).await, int(6));
    assert_eq!(c.cmd(&["APPEND", "k", "World"]).await, int(11));
    assert_eq!(c.cmd(&["GETRANGE", "k", "0", "4"]).await, bulk("Hello"));
    assert_eq!(c.cmd(&["GETRANGE", "k", "-5", "-1"]).await, bulk("World"));
    assert_eq!(c.cmd(&["SETRANGE", "k", "6", "Redis"]).await, int(11));
    assert_eq!(c.cmd(&["GET", "k"]).await, bulk("Hello Redis"));
}

#[tokio::test]
async fn key_lifecycle_and_expiry() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["MSET", "a", "1", "b", "2", "c", "3"]).await;
    assert_eq!(c.cmd(&["EXISTS", "a", "b", "zz"]).await, int(2));
    assert_eq!(c.cmd(&["DBSIZE"]).await, int(3));
    assert_eq!(c.cmd(&["DEL", "a", "zz"]).await, int(1));

    // EXPIRE with a past-relative time deletes immediately.
    assert_eq!(c.cmd(&["EXPIRE", "b", "-1"]).await, int(1));
    assert_eq!(c.cmd(&["EXISTS", "b"]).await, int(0));

    assert_eq!(c.cmd(&["EXPIRE", "c", "100"]).await, int(1));
    match c.cmd(&["PTTL", "c"]).await {
        Frame::Integer(n) => assert!((1..=100_000).contains(&n)),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(c.cmd(&["PERSIST", "c"]).await, int(1));
    assert_eq!(c.cmd(&["TTL", "c"]).await, int(-1));
    assert_eq!(c.cmd(&["TTL", "nope"]).await, int(-2));
}

#[tokio::test]
async fn copy_preserves_value_and_ttl() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["SET", "src", "payload"]).await;
    c.cmd(&["EXPIRE", "src", "500"]).await;
    assert_eq!(c.cmd(&["COPY", "src", "dst"]).await, int(1));
    assert_eq!(c.cmd(&["GET", "dst"]).await, bulk("payload"));
    match c.cmd(&["TTL", "dst"]).await {
        Frame::Integer(n) => assert!((1..=500).contains(&n), "ttl {n}"),
        other => panic!("unexpected {other:?}"),
    }
    // Existing destination needs REPLACE.
    c.cmd(&["SET", "dst2", "x"]).await;
    assert_eq!(c.cmd(&["COPY", "src", "dst2"]).await, int(0));
    assert_eq!(c.cmd(&["COPY", "src", "dst2", "REPLACE"]).await, int(1));
}

#[tokio::test]
async fn rename_and_keys() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["SET", "user:1", "a"]).await;
    c.cmd(&["SET", "user:2", "b"]).await;
    c.cmd(&["SET", "other", "c"]).await;
    let found = items(c.cmd(&["KEYS", "user:*"]).await);
    assert_eq!(found, vec![bulk("user:1"), bulk("user:2")]);
    assert_eq!(c.cmd(&["RENAME", "user:1", "user:9"]).await, simple("OK"));
    assert_error_contains(&c.cmd(&["RENAME", "ghost", "x"]).await, "no such key");
    assert_eq!(c.cmd(&["RENAMENX", "user:9", "other"]).await, int(0));
}

#[tokio::test]
async fn scan_covers_all_keys() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    for i in 0..100 {
        c.cmd(&["SET", &format!("key:{i}"), "v"]).await;
    }
    let mut seen = std::collections::HashSet::new();
    let mut cursor = "0".to_string();
    loop {
        let reply = items(c.cmd(&["SCAN", &cursor, "COUNT", "10"]).await);
        let next = match &reply[0] {
            Frame::Bulk(Some(b)) => String::from_utf8_lossy(b).into_owned(),
            other => panic!("bad cursor {other:?}"),
        };
        for item in items(reply[1].clone()) {
            if let Frame::Bulk(Some(k)) = item {
                seen.insert(k);
            }
        }
        if next == "0" {
            break;
        }
        cursor = next;
    }
    assert_eq!(seen.len(), 100);
}

#[tokio::test]
async fn list_round_trips() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    assert_eq!(c.cmd(&["RPUSH", "k", "a", "b", "c"]).await, int(3));
    assert_eq!(
        items(c.cmd(&["LRANGE", "k", "0", "-1"]).await),
        vec![bulk("a"), bulk("b"), bulk("c")]
    );
    assert_eq!(c.cmd(&["LPUSH", "l", "a", "b", "c"]).await, int(3));
    assert_eq!(
        items(c.cmd(&["LRANGE", "l", "0", "-1"]).await),
        vec![bulk("c"), bulk("b"), bulk("a")]
    );
    // Negative indices take the last three elements.
    c.cmd(&["RPUSH", "m", "1", "2", "3", "4", "5"]).await;
    assert_eq!(
        items(c.cmd(&["LRANGE", "m", "-3", "-1"]).await),
        vec![bulk("3"), bulk("4"), bulk("5")]
    );
    assert_eq!(c.cmd(&["LINDEX", "m", "-1"]).await, bulk("5"));
    assert_eq!(c.cmd(&["LSET", "m", "0", "one"]).await, simple("OK"));
    assert_eq!(c.cmd(&["LPOP", "m"]).await, bulk("one"));
    assert_eq!(c.cmd(&["RPOP", "m"]).await, bulk("5"));
    assert_eq!(c.cmd(&["LLEN", "m"]).await, int(3));
    assert_eq!(c.cmd(&["LTRIM", "m", "1", "1"]).await, simple("OK"));
    assert_eq!(
        items(c.cmd(&["LRANGE", "m", "0", "-1"]).await),
        vec![bulk("3")]
    );
    // Popping the last element deletes the key.
    c.cmd(&["LPOP", "m"]).await;
    assert_eq!(c.cmd(&["EXISTS", "m"]).await, int(0));
}

#[tokio::test]
async fn list_wrongtype_checks() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["SET", "s", "x"]).await;
    assert_error_contains(&c.cmd(&["LPUSH", "s", "v"]).await, "WRONGTYPE");
    assert_error_contains(&c.cmd(&["LRANGE", "s", "0", "-1"]).await, "WRONGTYPE");
}

#[tokio::test]
async fn set_operations() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    assert_eq!(c.cmd(&["SADD", "s", "a", "b", "c", "a"]).await, int(3));
    assert_eq!(c.cmd(&["SCARD", "s"]).await, int(3));
    assert_eq!(c.cmd(&["SISMEMBER", "s", "a"]).await, int(1));
    assert_eq!(c.cmd(&["SISMEMBER", "s", "z"]).await, int(0));
    assert_eq!(
        items(c.cmd(&["SMISMEMBER", "s", "a", "z"]).await),
        vec![int(1), int(0)]
    );
    assert_eq!(c.cmd(&["SREM", "s", "a", "z"]).await, int(1));

    c.cmd(&["SADD", "x", "a", "b", "c"]).await;
    c.cmd(&["SADD", "y", "b", "c", "d"]).await;
    assert_eq!(
        items(c.cmd(&["SINTER", "x", "y"]).await),
        vec![bulk("b"), bulk("c")]
    );
    assert_eq!(
        items(c.cmd(&["SUNION", "x", "y"]).await),
        vec![bulk("a"), bulk("b"), bulk("c"), bulk("d")]
    );
    assert_eq!(items(c.cmd(&["SDIFF", "x", "y"]).await), vec![bulk("a")]);
    assert_eq!(c.cmd(&["SINTERCARD", "2", "x", "y"]).await, int(2));
    assert_eq!(
        c.cmd(&["SINTERCARD", "2", "x", "y", "LIMIT", "1"]).await,
        int(1)
    );
    assert_eq!(c.cmd(&["SMOVE", "x", "y", "a"]).await, int(1));
    assert_eq!(c.cmd(&["SISMEMBER", "y", "a"]).await, int(1));
}

#[tokio::test]
async fn zset_order_and_ties() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    assert_eq!(c.cmd(&["ZADD", "z", "1", "c", "1", "a", "1", "b"]).await, int(3));
    assert_eq!(
        items(c.cmd(&["ZRANGE", "z", "0", "-1"]).await),
        vec![bulk("a"), bulk("b"), bulk("c")]
    );
    assert_eq!(
        items(c.cmd(&["ZRANGE", "z", "0", "-1", "WITHSCORES"]).await),
        vec![bulk("a"), bulk("1"), bulk("b"), bulk("1"), bulk("c"), bulk("1")]
    );
    assert_eq!(c.cmd(&["ZRANK", "z", "a"]).await, int(0));
    assert_eq!(c.cmd(&["ZREVRANK", "z", "a"]).await, int(2));
    assert_eq!(c.cmd(&["ZSCORE", "z", "b"]).await, bulk("1"));
    assert_eq!(c.cmd(&["ZCARD", "z"]).await, int(3));
}

#[tokio::test]
async fn zadd_flags_and_ranges() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["ZADD", "z", "5", "m"]).await;
    // NX GT on an existing member with a lower score: no change, 0.
    assert_eq!(c.cmd(&["ZADD", "z", "NX", "GT", "3", "m"]).await, int(0));
    assert_eq!(c.cmd(&["ZSCORE", "z", "m"]).await, bulk("5"));
    assert_eq!(c.cmd(&["ZADD", "z", "GT", "CH", "9", "m"]).await, int(1));
    assert_eq!(c.cmd(&["ZADD", "z", "GT", "CH", "2", "m"]).await, int(0));
    assert_eq!(c.cmd(&["ZINCRBY", "z", "1", "m"]).await, bulk("10"));

    for (score, member) in [("1", "a"), ("2", "b"), ("3", "x")] {
        c.cmd(&["ZADD", "r", score, member]).await;
    }
    assert_eq!(c.cmd(&["ZCOUNT", "r", "1", "2"]).await, int(2));
    assert_eq!(c.cmd(&["ZCOUNT", "r", "(1", "+inf"]).await, int(2));
    assert_eq!(
        items(c.cmd(&["ZRANGEBYSCORE", "r", "2", "+inf"]).await),
        vec![bulk("b"), bulk("x")]
    );
    assert_eq!(
        items(c.cmd(&["ZREVRANGE", "r", "0", "0"]).await),
        vec![bulk("x")]
    );
    assert_eq!(c.cmd(&["ZREMRANGEBYSCORE", "r", "-inf", "1"]).await, int(1));
    assert_eq!(c.cmd(&["ZREMRANGEBYRANK", "r", "0", "0"]).await, int(1));
    let popped = items(c.cmd(&["ZPOPMIN", "r"]).await);
    assert_eq!(popped, vec![bulk("x"), bulk("3")]);
    assert_eq!(c.cmd(&["EXISTS", "r"]).await, int(0));
}

#[tokio::test]
async fn hash_commands_and_field_ttl() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    assert_eq!(c.cmd(&["HSET", "h", "f1", "v1", "f2", "v2"]).await, int(2));
    assert_eq!(c.cmd(&["HGET", "h", "f1"]).await, bulk("v1"));
    assert_eq!(c.cmd(&["HLEN", "h"]).await, int(2));
    assert_eq!(c.cmd(&["HEXISTS", "h", "f2"]).await, int(1));
    assert_eq!(
        items(c.cmd(&["HMGET", "h", "f1", "ghost"]).await),
        vec![bulk("v1"), Frame::null()]
    );
    assert_eq!(c.cmd(&["HSETNX", "h", "f1", "zz"]).await, int(0));
    assert_eq!(c.cmd(&["HINCRBY", "h", "n", "5"]).await, int(5));

    // Field TTLs: arm one, watch it disappear.
    assert_eq!(
        items(c.cmd(&["HEXPIRE", "h", "100", "FIELDS", "1", "f1"]).await),
        vec![int(1)]
    );
    let ttls = items(c.cmd(&["HTTL", "h", "FIELDS", "2", "f1", "f2"]).await);
    match &ttls[0] {
        Frame::Integer(n) => assert!((1..=100).contains(n)),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(ttls[1], int(-1));
    assert_eq!(
        items(c.cmd(&["HPERSIST", "h", "FIELDS", "1", "f1"]).await),
        vec![int(1)]
    );
    // A zero TTL removes the field at once.
    assert_eq!(
        items(c.cmd(&["HEXPIRE", "h", "0", "FIELDS", "1", "f2"]).await),
        vec![int(2)]
    );
    assert_eq!(c.cmd(&["HEXISTS", "h", "f2"]).await, int(0));
    // Deleting every field deletes the key.
    assert_eq!(c.cmd(&["HDEL", "h", "f1", "n"]).await, int(2));
    assert_eq!(c.cmd(&["EXISTS", "h"]).await, int(0));
}

#[tokio::test]
async fn bitmap_commands() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    assert_eq!(c.cmd(&["SETBIT", "b", "7", "1"]).await, int(0));
    assert_eq!(c.cmd(&["GETBIT", "b", "7"]).await, int(1));
    assert_eq!(c.cmd(&["GETBIT", "b", "6"]).await, int(0));
    assert_eq!(c.cmd(&["SETBIT", "b", "0", "1"]).await, int(0));
    assert_eq!(c.cmd(&["BITCOUNT", "b"]).await, int(2));
    assert_eq!(c.cmd(&["GET", "b"]).await, Frame::bulk(Bytes::from(vec![0x81u8])));

    c.cmd(&["SET", "x", "abc"]).await;
    c.cmd(&["SET", "y", "abd"]).await;
    assert_eq!(c.cmd(&["BITOP", "XOR", "dest", "x", "y"]).await, int(3));
    assert_eq!(
        c.cmd(&["GET", "dest"]).await,
        Frame::bulk(Bytes::from(vec![0u8, 0, 7]))
    );
    assert_eq!(c.cmd(&["BITCOUNT", "dest", "0", "-1"]).await, int(3));
}

#[tokio::test]
async fn hll_estimates() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    assert_eq!(c.cmd(&["PFADD", "hll", "a", "b", "c"]).await, int(1));
    assert_eq!(c.cmd(&["PFADD", "hll", "a"]).await, int(0));
    assert_eq!(c.cmd(&["PFCOUNT", "hll"]).await, int(3));

    for i in 0..1000 {
        c.cmd(&["PFADD", "big", &format!("item-{i}")]).await;
    }
    match c.cmd(&["PFCOUNT", "big"]).await {
        Frame::Integer(n) => {
            assert!((950..=1050).contains(&n), "estimate {n} off for 1000")
        },
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(c.cmd(&["PFMERGE", "merged", "hll", "big"]).await, simple("OK"));
    match c.cmd(&["PFCOUNT", "merged"]).await {
        Frame::Integer(n) => assert!((950..=1060).contains(&n)),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn getdel_and_getex() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["SET", "k", "v"]).await;
    assert_eq!(c.cmd(&["GETEX", "k", "EX", "100"]).await, bulk("v"));
    match c.cmd(&["TTL", "k"]).await {
        Frame::Integer(n) => assert!((1..=100).contains(&n)),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(c.cmd(&["GETEX", "k", "PERSIST"]).await, bulk("v"));
    assert_eq!(c.cmd(&["TTL", "k"]).await, int(-1));
    assert_eq!(c.cmd(&["GETDEL", "k"]).await, bulk("v"));
    assert_eq!(c.cmd(&["EXISTS", "k"]).await, int(0));
}

#[tokio::test]
async fn select_bounds_and_isolation() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["SET", "k", "db0"]).await;
    assert_eq!(c.cmd(&["SELECT", "1"]).await, simple("OK"));
    assert_eq!(c.cmd(&["GET", "k"]).await, Frame::null());
    c.cmd(&["SET", "k", "db1"]).await;
    assert_eq!(c.cmd(&["SELECT", "0"]).await, simple("OK"));
    assert_eq!(c.cmd(&["GET", "k"]).await, bulk("db0"));
    assert_error_contains(&c.cmd(&["SELECT", "99"]).await, "out of range");
    // FLUSHALL wipes both.
    c.cmd(&["FLUSHALL"]).await;
    assert_eq!(c.cmd(&["DBSIZE"]).await, int(0));
}

#[tokio::test]
async fn auth_gate() {
    let mut cfg = redis_server_rs::cfg::config::Config::default();
    cfg.requirepass = Some("sekret".to_string());
    let srv = redis_server_rs::server::Server::new(cfg);
    let mut c = TestClient::connect(&srv);
    assert_error_contains(&c.cmd(&["GET", "k"]).await, "NOAUTH");
    assert_error_contains(&c.cmd(&["AUTH", "wrong"]).await, "invalid password");
    assert_eq!(c.cmd(&["AUTH", "sekret"]).await, simple("OK"));
    assert_eq!(c.cmd(&["GET", "k"]).await, Frame::null());
}

#[tokio::test]
async fn slowlog_and_latency_surfaces() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    c.cmd(&["SET", "k", "v"]).await;
    assert_eq!(c.cmd(&["SLOWLOG", "LEN"]).await, int(0));
    assert_eq!(c.cmd(&["SLOWLOG", "RESET"]).await, simple("OK"));
    let latest = items(c.cmd(&["LATENCY", "LATEST"]).await);
    assert!(!latest.is_empty());
    match c.cmd(&["LATENCY", "RESET"]).await {
        Frame::Integer(n) => assert!(n > 0),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn client_and_time_commands() {
    let srv = server();
    let mut c = TestClient::connect(&srv);
    assert_eq!(
        c.cmd(&["CLIENT", "ID"]).await,
        int(c.client_id() as i64)
    );
    assert_eq!(c.cmd(&["CLIENT", "SETNAME", "tester"]).await, simple("OK"));
    assert_eq!(c.cmd(&["CLIENT", "GETNAME"]).await, bulk("tester"));
    match c.cmd(&["CLIENT", "LIST"]).await {
        Frame::Bulk(Some(listing)) => {
            let text = String::from_utf8_lossy(&listing).into_owned();
            assert!(text.contains("name=tester"));
        },
        other => panic!("unexpected {other:?}"),
    }
    let parts = items(c.cmd(&["TIME"]).await);
    assert_eq!(parts.len(), 2);
}
