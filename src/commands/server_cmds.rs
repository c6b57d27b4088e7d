// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Server introspection and administration verbs.

use std::fmt::Write as _;
use std::sync::atomic::Ordering;

use bytes::Bytes;

use crate::{
    commands::{BoxedReply, CommandCtx, HandlerReply, all_specs, parse_i64},
    errors::CommandError,
    resp::Frame,
    storage::now_ms,
};

pub fn info(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let section = argv
        .get(1)
        .map(|s| String::from_utf8_lossy(s).to_lowercase());
    let wants = |name: &str| {
        section.as_deref().is_none_or(|s| s == name || s == "all")
    };

    let now = now_ms();
    let mut out = String::new();
    if wants("server") {
        let _ = writeln!(out, "# Server");
        let _ = writeln!(out, "redis_version:7.4.0");
        let _ = writeln!(out, "redis_mode:{}", {
            let enabled = ctx
                .server
                .cluster
                .read()
                .map(|c| c.is_enabled())
                .unwrap_or(false);
            if enabled { "cluster" } else { "standalone" }
        });
        let _ = writeln!(out, "os:{}", std::env::consts::OS);
        let _ = writeln!(out, "process_id:{}", std::process::id());
        let _ = writeln!(out, "tcp_port:{}", ctx.server.cfg.server.port);
        let _ = writeln!(
            out,
            "uptime_in_seconds:{}",
            now.saturating_sub(ctx.server.start_ms) / 1000
        );
        out.push('\n');
    }
    if wants("clients") {
        let _ = writeln!(out, "# Clients");
        let _ = writeln!(out, "connected_clients:{}", ctx.registry().len());
        let _ = writeln!(
            out,
            "blocked_clients:{}",
            ctx.server.blocking.waiter_count()
        );
        let _ = writeln!(out, "maxclients:{}", ctx.server.cfg.server.maxclients);
        out.push('\n');
    }
    if wants("stats") {
        let stats = &ctx.server.stats;
        let _ = writeln!(out, "# Stats");
        let _ = writeln!(
            out,
            "total_connections_received:{}",
            stats.connections_received.load(Ordering::Relaxed)
        );
        let _ = writeln!(
            out,
            "total_commands_processed:{}",
            stats.commands_processed.load(Ordering::Relaxed)
        );
        let _ = writeln!(
            out,
            "expired_keys:{}",
            stats.expired_keys.load(Ordering::Relaxed)
        );
        out.push('\n');
    }
    if wants("replication") {
        let _ = writeln!(out, "# Replication");
        let _ = writeln!(out, "role:master");
        let _ = writeln!(out, "connected_slaves:0");
        out.push('\n');
    }
    if wants("keyspace") {
        let _ = writeln!(out, "# Keyspace");
        for index in 0..ctx.server.db_count() {
            let len = ctx.server.db(index).len(now);
            if len > 0 {
                let _ = writeln!(out, "db{index}:keys={len},expires=0,avg_ttl=0");
            }
        }
    }
    Ok(Some(Frame::bulk(Bytes::from(out))))
}

pub fn command(_ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    match argv.get(1).map(|s| s.to_ascii_uppercase()) {
        None => {
            let rows = all_specs()
                .into_iter()
                .map(|spec| {
                    Frame::array(vec![
                        Frame::bulk_from_str(spec.name.to_lowercase()),
                        Frame::Integer(i64::from(spec.arity)),
                        Frame::array(vec![Frame::bulk_from_str(
                            if spec.flags.contains(
                                crate::commands::CommandFlags::WRITE,
                            ) {
                                "write"
                            } else {
                                "readonly"
                            },
                        )]),
                        Frame::Integer(spec.first_key as i64),
                        Frame::Integer(i64::from(spec.last_key)),
                        Frame::Integer(spec.key_step as i64),
                    ])
                })
                .collect();
            Ok(Some(Frame::array(rows)))
        },
        Some(sub) if sub.as_slice() == b"COUNT" => Ok(Some(Frame::Integer(
            crate::commands::command_count() as i64,
        ))),
        Some(other) => Err(CommandError::other(format!(
            "Unknown COMMAND subcommand or wrong number of arguments for '{}'",
            String::from_utf8_lossy(&other).to_lowercase()
        ))),
    }
}

/// Values surfaced through CONFIG GET, keyed by their canonical names.
fn config_entries(ctx: &CommandCtx) -> Vec<(String, String)> {
    let cfg = &ctx.server.cfg;
    vec![
        ("bind".into(), cfg.server.bind.clone()),
        ("port".into(), cfg.server.port.to_string()),
        ("databases".into(), cfg.server.databases.to_string()),
        ("maxclients".into(), cfg.server.maxclients.to_string()),
        ("maxmemory".into(), cfg.server.maxmemory.to_string()),
        ("timeout".into(), cfg.server.timeout.as_secs().to_string()),
        ("loglevel".into(), cfg.logging.level.to_string()),
        ("logfile".into(), cfg.logging.file.clone()),
        (
            "slowlog-log-slower-than".into(),
            cfg.slowlog.log_slower_than.to_string(),
        ),
        ("slowlog-max-len".into(), cfg.slowlog.max_len.to_string()),
        (
            "active-expire-cycle-ms".into(),
            cfg.expire.cycle_ms.to_string(),
        ),
        (
            "intset-max-entries".into(),
            cfg.encodings.intset_max_entries.to_string(),
        ),
        (
            "list-max-listpack-size".into(),
            cfg.encodings.list_max_listpack_size.to_string(),
        ),
        (
            "hash-max-listpack-entries".into(),
            cfg.encodings.hash_max_listpack_entries.to_string(),
        ),
        (
            "hash-max-listpack-value".into(),
            cfg.encodings.hash_max_listpack_value.to_string(),
        ),
        ("cluster-enabled".into(), cfg.cluster.enabled.to_string()),
    ]
}

pub fn config(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    match argv[1].to_ascii_uppercase().as_slice() {
        b"GET" => {
            let patterns: Vec<&[u8]> =
                argv[2..].iter().map(|p| p.as_ref()).collect();
            if patterns.is_empty() {
                return Err(CommandError::WrongArity("config|get".into()));
            }
            let mut frames = Vec::new();
            for (name, value) in config_entries(ctx) {
                if patterns
                    .iter()
                    .any(|p| crate::storage::glob::glob_match(p, name.as_bytes()))
                {
                    frames.push(Frame::bulk(Bytes::from(name)));
                    frames.push(Frame::bulk(Bytes::from(value)));
                }
            }
            Ok(Some(Frame::array(frames)))
        },
        // Configuration is fixed at boot; SET acknowledges nothing.
        b"SET" => Err(CommandError::other(
            "CONFIG SET is not supported: configuration is static after boot",
        )),
        b"RESETSTAT" => {
            ctx.server.stats.commands_processed.store(0, Ordering::Relaxed);
            ctx.server
                .stats
                .connections_received
                .store(0, Ordering::Relaxed);
            ctx.server.stats.expired_keys.store(0, Ordering::Relaxed);
            Ok(Some(Frame::ok()))
        },
        other => Err(CommandError::other(format!(
            "Unknown CONFIG subcommand or wrong number of arguments for '{}'",
            String::from_utf8_lossy(other).to_lowercase()
        ))),
    }
}

pub fn debug<'a, 'b>(ctx: &'a mut CommandCtx<'b>, argv: Vec<Bytes>) -> BoxedReply<'a> {
    Box::pin(async move {
        match argv[1].to_ascii_uppercase().as_slice() {
            b"SLEEP" => {
                let secs: f64 = std::str::from_utf8(
                    argv.get(2).ok_or(CommandError::Syntax)?,
                )
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(CommandError::NotFloat)?;
                if secs < 0.0 || !secs.is_finite() {
                    return Err(CommandError::NotFloat);
                }
                tokio::time::sleep(std::time::Duration::from_secs_f64(secs)).await;
                Ok(Some(Frame::ok()))
            },
            b"OBJECT" => {
                let key = argv.get(2).ok_or(CommandError::Syntax)?;
                let now = now_ms();
                let mut db = ctx.server.db(ctx.db_index());
                let Some(value) = db.get(key, now) else {
                    return Err(CommandError::NoSuchKey);
                };
                let line = format!(
                    "Value at:0 refcount:1 encoding:{} serializedlength:0",
                    value.encoding_name()
                );
                Ok(Some(Frame::simple(line)))
            },
            other => Err(CommandError::other(format!(
                "DEBUG subcommand '{}' not supported",
                String::from_utf8_lossy(other).to_lowercase()
            ))),
        }
    })
}

pub fn time(_ctx: &mut CommandCtx, _argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    Ok(Some(Frame::array(vec![
        Frame::bulk(Bytes::from((now / 1000).to_string())),
        Frame::bulk(Bytes::from(((now % 1000) * 1000).to_string())),
    ])))
}

pub fn slowlog(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    match argv[1].to_ascii_uppercase().as_slice() {
        b"GET" => {
            let count = match argv.get(2) {
                Some(raw) => {
                    let n = parse_i64(raw)?;
                    if n < 0 { usize::MAX } else { n as usize }
                },
                None => 10,
            };
            let rows = ctx
                .server
                .slowlog
                .get(count)
                .into_iter()
                .map(|e| {
                    Frame::array(vec![
                        Frame::Integer(e.id as i64),
                        Frame::Integer(e.unix_time_sec as i64),
                        Frame::Integer(e.duration_us as i64),
                        Frame::array(
                            e.argv.into_iter().map(Frame::bulk).collect(),
                        ),
                        Frame::bulk(Bytes::from(e.client_addr)),
                        Frame::bulk(Bytes::from(e.client_name)),
                    ])
                })
                .collect();
            Ok(Some(Frame::array(rows)))
        },
        b"LEN" => Ok(Some(Frame::Integer(ctx.server.slowlog.len() as i64))),
        b"RESET" => {
            ctx.server.slowlog.reset();
            Ok(Some(Frame::ok()))
        },
        other => Err(CommandError::other(format!(
            "Unknown SLOWLOG subcommand or wrong number of arguments for '{}'",
            String::from_utf8_lossy(other).to_lowercase()
        ))),
    }
}

pub fn latency(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    match argv[1].to_ascii_uppercase().as_slice() {
        b"LATEST" => {
            let rows = ctx
                .server
                .latency
                .summaries()
                .into_iter()
                .map(|s| {
                    Frame::array(vec![
                        Frame::bulk(Bytes::from(s.verb)),
                        Frame::Integer(s.last_at_sec as i64),
                        Frame::Integer((s.last_us / 1000) as i64),
                        Frame::Integer((s.max_us / 1000) as i64),
                    ])
                })
                .collect();
            Ok(Some(Frame::array(rows)))
        },
        b"HISTORY" => {
            let verb = argv.get(2).ok_or(CommandError::Syntax)?;
            let verb = String::from_utf8_lossy(verb).to_uppercase();
            let rows = ctx
                .server
                .latency
                .history(&verb)
                .into_iter()
                .map(|(ts, us)| {
                    Frame::array(vec![
                        Frame::Integer(ts as i64),
                        Frame::Integer((us / 1000) as i64),
                    ])
                })
                .collect();
            Ok(Some(Frame::array(rows)))
        },
        b"RESET" => Ok(Some(Frame::Integer(ctx.server.latency.reset() as i64))),
        b"HISTOGRAM" => {
            let filter: Vec<String> = argv[2..]
                .iter()
                .map(|v| String::from_utf8_lossy(v).to_uppercase())
                .collect();
            let mut frames = Vec::new();
            for s in ctx.server.latency.summaries() {
                if !filter.is_empty() && !filter.contains(&s.verb) {
                    continue;
                }
                frames.push(Frame::bulk(Bytes::from(s.verb.clone())));
                frames.push(Frame::array(vec![
                    Frame::bulk_from_str("calls"),
                    Frame::Integer(s.count as i64),
                    Frame::bulk_from_str("p50"),
                    Frame::Integer(s.p50_us as i64),
                    Frame::bulk_from_str("p95"),
                    Frame::Integer(s.p95_us as i64),
                    Frame::bulk_from_str("p99"),
                    Frame::Integer(s.p99_us as i64),
                ]));
            }
            Ok(Some(Frame::array(frames)))
        },
        other => Err(CommandError::other(format!(
            "Unknown LATENCY subcommand or wrong number of arguments for '{}'",
            String::from_utf8_lossy(other).to_lowercase()
        ))),
    }
}

pub fn shutdown(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    for arg in &argv[1..] {
        match arg.to_ascii_uppercase().as_slice() {
            b"NOSAVE" | b"SAVE" => {},
            _ => return Err(CommandError::Syntax),
        }
    }
    tracing::info!("SHUTDOWN requested by client {}", ctx.session.client_id());
    ctx.server.shutdown.cancel();
    ctx.session.should_close = true;
    // A successful shutdown never replies; the socket just closes.
    Ok(None)
}
