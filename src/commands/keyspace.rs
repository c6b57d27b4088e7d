// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Generic keyspace commands: existence, deletion, TTLs, iteration.

use bytes::Bytes;

use crate::{
    commands::{CommandCtx, HandlerReply, bulk_array, parse_i64, parse_u64},
    errors::{CommandError, CommandResult},
    resp::Frame,
    storage::now_ms,
};

pub fn del(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut removed = 0;
    {
        let mut db = ctx.server.db(ctx.db_index());
        for key in &argv[1..] {
            if db.remove(key, now).is_some() {
                removed += 1;
            }
        }
    }
    for key in &argv[1..] {
        ctx.server.notify(ctx.db_index(), key, "del");
    }
    Ok(Some(Frame::Integer(removed)))
}

pub fn exists(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let mut found = 0;
    for key in &argv[1..] {
        if db.exists(key, now) {
            found += 1;
        }
    }
    Ok(Some(Frame::Integer(found)))
}

pub fn type_cmd(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let mut db = ctx.server.db(ctx.db_index());
    let name = db
        .type_of(&argv[1], now_ms())
        .map_or("none", |t| t.as_str());
    Ok(Some(Frame::simple(name)))
}

pub fn keys(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let db = ctx.server.db(ctx.db_index());
    let mut found = db.keys_matching(&argv[1], now_ms());
    found.sort();
    Ok(Some(bulk_array(found)))
}

pub fn scan(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let cursor = parse_u64(&argv[1])?;
    let mut pattern: Option<Bytes> = None;
    let mut type_filter: Option<Bytes> = None;
    let mut count = 10usize;
    let mut i = 2;
    while i < argv.len() {
        match argv[i].to_ascii_uppercase().as_slice() {
            b"MATCH" => {
                i += 1;
                pattern = Some(argv.get(i).ok_or(CommandError::Syntax)?.clone());
            },
            b"COUNT" => {
                i += 1;
                let n = parse_i64(argv.get(i).ok_or(CommandError::Syntax)?)?;
                if n < 1 {
                    return Err(CommandError::Syntax);
                }
                count = n as usize;
            },
            b"TYPE" => {
                i += 1;
                type_filter = Some(argv.get(i).ok_or(CommandError::Syntax)?.clone());
            },
            _ => return Err(CommandError::Syntax),
        }
        i += 1;
    }
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let (next, mut found) = db.scan(cursor, pattern.as_deref(), count, now);
    if let Some(wanted) = type_filter {
        found.retain(|k| {
            db.type_of(k, now)
                .is_some_and(|t| t.as_str().as_bytes() == &wanted[..])
        });
    }
    Ok(Some(scan_reply(next, found)))
}

pub(crate) fn scan_reply(cursor: u64, keys: Vec<Bytes>) -> Frame {
    Frame::array(vec![
        Frame::bulk(Bytes::from(cursor.to_string())),
        bulk_array(keys),
    ])
}

pub fn rename(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    {
        let mut db = ctx.server.db(ctx.db_index());
        db.rename(&argv[1], argv[2].clone(), now)
            .map_err(|_| CommandError::NoSuchKey)?;
    }
    ctx.server.notify(ctx.db_index(), &argv[1], "rename_from");
    ctx.server.notify(ctx.db_index(), &argv[2], "rename_to");
    signal_value_ready(ctx, &argv[2]);
    Ok(Some(Frame::ok()))
}

pub fn renamenx(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    {
        let mut db = ctx.server.db(ctx.db_index());
        if !db.exists(&argv[1], now) {
            return Err(CommandError::NoSuchKey);
        }
        if db.exists(&argv[2], now) {
            return Ok(Some(Frame::Integer(0)));
        }
        db.rename(&argv[1], argv[2].clone(), now)
            .map_err(|_| CommandError::NoSuchKey)?;
    }
    signal_value_ready(ctx, &argv[2]);
    Ok(Some(Frame::Integer(1)))
}

/// Wakes blockers when a rename/copy materialized a ready container.
pub(crate) fn signal_value_ready(ctx: &mut CommandCtx, key: &Bytes) {
    let now = now_ms();
    let info = {
        let mut db = ctx.server.db(ctx.db_index());
        db.get(key, now).map(|v| {
            let tag = v.type_tag();
            let count = match v {
                crate::storage::Value::List(l) => l.len(),
                crate::storage::Value::ZSet(z) => z.len(),
                crate::storage::Value::Stream(s) => s.len(),
                _ => 0,
            };
            (tag, count)
        })
    };
    if let Some((tag, count)) = info {
        ctx.server
            .blocking
            .signal_key_ready(ctx.db_index(), key, tag, count);
    }
}

pub fn randomkey(ctx: &mut CommandCtx, _argv: &[Bytes]) -> HandlerReply {
    let db = ctx.server.db(ctx.db_index());
    Ok(Some(
        db.random_key(now_ms()).map_or(Frame::null(), Frame::bulk),
    ))
}

pub fn dbsize(ctx: &mut CommandCtx, _argv: &[Bytes]) -> HandlerReply {
    let db = ctx.server.db(ctx.db_index());
    Ok(Some(Frame::Integer(db.len(now_ms()) as i64)))
}

pub fn flushdb(ctx: &mut CommandCtx, _argv: &[Bytes]) -> HandlerReply {
    let mut db = ctx.server.db(ctx.db_index());
    let n = db.flush();
    drop(db);
    tracing::info!(db = ctx.db_index(), keys = n, "FLUSHDB");
    Ok(Some(Frame::ok()))
}

pub fn flushall(ctx: &mut CommandCtx, _argv: &[Bytes]) -> HandlerReply {
    let mut total = 0;
    for index in 0..ctx.server.db_count() {
        total += ctx.server.db(index).flush();
    }
    tracing::info!(keys = total, "FLUSHALL");
    Ok(Some(Frame::ok()))
}

/// Absolute-deadline computation shared by the EXPIRE family; `unit_ms`
/// scales the argument, `absolute` skips adding "now".
fn expire_generic(
    ctx: &mut CommandCtx,
    argv: &[Bytes],
    unit_ms: u64,
    absolute: bool,
) -> HandlerReply {
    let now = now_ms();
    let n = parse_i64(&argv[2])?;
    if argv.len() > 3 {
        // NX/XX/GT/LT options exist upstream; they are not part of this
        // command surface.
        return Err(CommandError::Syntax);
    }
    let at_ms = if absolute {
        (n.max(0) as u64).saturating_mul(unit_ms)
    } else if n < 0 {
        // A negative relative TTL deletes immediately.
        0
    } else {
        now.saturating_add((n as u64).saturating_mul(unit_ms))
    };

    let armed = {
        let mut db = ctx.server.db(ctx.db_index());
        let armed = db.set_expire(&argv[1], at_ms, now);
        if armed && at_ms <= now {
            db.remove(&argv[1], now);
        }
        armed
    };
    if armed {
        ctx.server.notify(ctx.db_index(), &argv[1], "expire");
    }
    Ok(Some(Frame::from_bool(armed)))
}

pub fn expire(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    expire_generic(ctx, argv, 1000, false)
}

pub fn pexpire(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    expire_generic(ctx, argv, 1, false)
}

pub fn expireat(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    expire_generic(ctx, argv, 1000, true)
}

pub fn pexpireat(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    expire_generic(ctx, argv, 1, true)
}

/// -2 = missing key, -1 = no TTL, else remaining time in `unit_ms` units.
fn ttl_generic(ctx: &mut CommandCtx, key: &[u8], unit_ms: u64) -> CommandResult<i64> {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    if !db.exists(key, now) {
        return Ok(-2);
    }
    match db.expire_at(key, now) {
        None => Ok(-1),
        Some(at) => {
            let remaining = at.saturating_sub(now);
            Ok(remaining.div_ceil(unit_ms) as i64)
        },
    }
}

pub fn ttl(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    Ok(Some(Frame::Integer(ttl_generic(ctx, &argv[1], 1000)?)))
}

pub fn pttl(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    Ok(Some(Frame::Integer(ttl_generic(ctx, &argv[1], 1)?)))
}

pub fn persist(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let mut db = ctx.server.db(ctx.db_index());
    let dropped = db.persist(&argv[1], now_ms());
    Ok(Some(Frame::from_bool(dropped)))
}

fn expiretime_generic(
    ctx: &mut CommandCtx,
    key: &[u8],
    unit_ms: u64,
) -> CommandResult<i64> {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    if !db.exists(key, now) {
        return Ok(-2);
    }
    match db.expire_at(key, now) {
        None => Ok(-1),
        Some(at) => Ok((at / unit_ms) as i64),
    }
}

pub fn expiretime(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    Ok(Some(Frame::Integer(expiretime_generic(ctx, &argv[1], 1000)?)))
}

pub fn pexpiretime(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    Ok(Some(Frame::Integer(expiretime_generic(ctx, &argv[1], 1)?)))
}

pub fn copy(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let mut replace = false;
    for arg in &argv[3..] {
        match arg.to_ascii_uppercase().as_slice() {
            b"REPLACE" => replace = true,
            // Cross-database COPY (the DB option) is not supported; a
            // cluster-compatible keyspace keeps values inside one database.
            b"DB" => return Err(CommandError::Syntax),
            _ => return Err(CommandError::Syntax),
        }
    }
    let copied = {
        let mut db = ctx.server.db(ctx.db_index());
        match db.copy(&argv[1], argv[2].clone(), replace, now_ms()) {
            Ok(done) => done,
            Err(_) => false,
        }
    };
    if copied {
        ctx.server.notify(ctx.db_index(), &argv[2], "copy_to");
        signal_value_ready(ctx, &argv[2]);
    }
    Ok(Some(Frame::from_bool(copied)))
}

pub fn touch(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    exists(ctx, argv)
}
