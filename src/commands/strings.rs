// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! String commands: plain get/set, numeric increments, byte ranges.

use bytes::Bytes;

use crate::{
    commands::{CommandCtx, HandlerReply, format_f64, parse_i64},
    errors::{CommandError, CommandResult},
    resp::Frame,
    storage::{Db, Value, now_ms},
};

/// Reads a string value, enforcing the type tag. HLL payloads are stored
/// under their own variant and stay invisible to string reads.
pub(crate) fn read_str(
    db: &mut Db,
    key: &[u8],
    now: u64,
) -> CommandResult<Option<Bytes>> {
    match db.get(key, now) {
        None => Ok(None),
        Some(Value::Str(s)) => Ok(Some(s.clone())),
        Some(_) => Err(CommandError::WrongType),
    }
}

#[derive(Default)]
struct SetOptions {
    nx: bool,
    xx: bool,
    keep_ttl: bool,
    get: bool,
    expire_at_ms: Option<u64>,
}

fn parse_set_options(args: &[Bytes], now: u64) -> CommandResult<SetOptions> {
    let mut opts = SetOptions::default();
    let mut i = 0;
    while i < args.len() {
        let tok = args[i].to_ascii_uppercase();
        match tok.as_slice() {
            b"NX" => opts.nx = true,
            b"XX" => opts.xx = true,
            b"GET" => opts.get = true,
            b"KEEPTTL" => opts.keep_ttl = true,
            b"EX" | b"PX" | b"EXAT" | b"PXAT" => {
                i += 1;
                let raw = args.get(i).ok_or(CommandError::Syntax)?;
                let n = parse_i64(raw)?;
                if (tok.as_slice() == b"EX" || tok.as_slice() == b"PX") && n <= 0 {
                    return Err(CommandError::other(
                        "invalid expire time in 'set' command",
                    ));
                }
                let at = match tok.as_slice() {
                    b"EX" => now.saturating_add((n as u64).saturating_mul(1000)),
                    b"PX" => now.saturating_add(n as u64),
                    b"EXAT" => (n.max(0) as u64).saturating_mul(1000),
                    _ => n.max(0) as u64,
                };
                if opts.expire_at_ms.replace(at).is_some() {
                    return Err(CommandError::Syntax);
                }
            },
            _ => return Err(CommandError::Syntax),
        }
        i += 1;
    }
    if opts.nx && opts.xx {
        return Err(CommandError::Syntax);
    }
    if opts.keep_ttl && opts.expire_at_ms.is_some() {
        return Err(CommandError::Syntax);
    }
    Ok(opts)
}

pub fn set(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let opts = parse_set_options(&argv[3..], now)?;
    let key = argv[1].clone();
    let value = argv[2].clone();

    let mut db = ctx.server.db(ctx.db_index());
    let old = match db.get(&key, now) {
        None => None,
        Some(Value::Str(s)) => Some(s.clone()),
        Some(_) if opts.get => return Err(CommandError::WrongType),
        Some(_) => None,
    };
    let exists = db.exists(&key, now);

    if (opts.nx && exists) || (opts.xx && !exists) {
        return Ok(Some(if opts.get {
            old.map_or(Frame::null(), Frame::bulk)
        } else {
            Frame::null()
        }));
    }

    if opts.keep_ttl {
        db.set_keep_ttl(key.clone(), Value::Str(value));
    } else {
        db.set(key.clone(), Value::Str(value));
    }
    if let Some(at) = opts.expire_at_ms {
        db.set_expire(&key, at, now);
    }
    drop(db);
    ctx.server.notify(ctx.db_index(), &key, "set");

    Ok(Some(if opts.get {
        old.map_or(Frame::null(), Frame::bulk)
    } else {
        Frame::ok()
    }))
}

pub fn get(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let mut db = ctx.server.db(ctx.db_index());
    let value = read_str(&mut db, &argv[1], now_ms())?;
    Ok(Some(value.map_or(Frame::null(), Frame::bulk)))
}

pub fn mset(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    if argv.len() % 2 != 1 {
        return Err(CommandError::WrongArity("mset".into()));
    }
    let mut db = ctx.server.db(ctx.db_index());
    for pair in argv[1..].chunks_exact(2) {
        db.set(pair[0].clone(), Value::Str(pair[1].clone()));
    }
    drop(db);
    for pair in argv[1..].chunks_exact(2) {
        ctx.server.notify(ctx.db_index(), &pair[0], "set");
    }
    Ok(Some(Frame::ok()))
}

pub fn mget(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let items = argv[1..]
        .iter()
        .map(|key| match db.get(key, now) {
            Some(Value::Str(s)) => Frame::bulk(s.clone()),
            // Wrong-typed keys read as nil in MGET.
            _ => Frame::null(),
        })
        .collect();
    Ok(Some(Frame::array(items)))
}

pub fn setnx(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    if db.exists(&argv[1], now) {
        return Ok(Some(Frame::Integer(0)));
    }
    db.set(argv[1].clone(), Value::Str(argv[2].clone()));
    drop(db);
    ctx.server.notify(ctx.db_index(), &argv[1], "set");
    Ok(Some(Frame::Integer(1)))
}

fn set_with_ttl(ctx: &mut CommandCtx, argv: &[Bytes], unit_ms: u64) -> HandlerReply {
    let now = now_ms();
    let ttl = parse_i64(&argv[2])?;
    if ttl <= 0 {
        return Err(CommandError::other(format!(
            "invalid expire time in '{}' command",
            if unit_ms == 1000 { "setex" } else { "psetex" }
        )));
    }
    let at = now.saturating_add((ttl as u64).saturating_mul(unit_ms));
    let mut db = ctx.server.db(ctx.db_index());
    db.set(argv[1].clone(), Value::Str(argv[3].clone()));
    db.set_expire(&argv[1], at, now);
    drop(db);
    ctx.server.notify(ctx.db_index(), &argv[1], "set");
    Ok(Some(Frame::ok()))
}

pub fn setex(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    set_with_ttl(ctx, argv, 1000)
}

pub fn psetex(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    set_with_ttl(ctx, argv, 1)
}

pub fn getset(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let old = read_str(&mut db, &argv[1], now)?;
    db.set(argv[1].clone(), Value::Str(argv[2].clone()));
    drop(db);
    ctx.server.notify(ctx.db_index(), &argv[1], "set");
    Ok(Some(old.map_or(Frame::null(), Frame::bulk)))
}

fn incr_by(ctx: &mut CommandCtx, key: &Bytes, delta: i64) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let current = match read_str(&mut db, key, now)? {
        None => 0,
        Some(raw) => std::str::from_utf8(&raw)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or(CommandError::NotInteger)?,
    };
    let next = current
        .checked_add(delta)
        .ok_or_else(|| CommandError::other("increment or decrement would overflow"))?;
    db.set_keep_ttl(key.clone(), Value::Str(Bytes::from(next.to_string())));
    drop(db);
    ctx.server.notify(ctx.db_index(), key, "incrby");
    Ok(Some(Frame::Integer(next)))
}

pub fn incr(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    incr_by(ctx, &argv[1], 1)
}

pub fn decr(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    incr_by(ctx, &argv[1], -1)
}

pub fn incrby(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let delta = parse_i64(&argv[2])?;
    incr_by(ctx, &argv[1], delta)
}

pub fn decrby(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let delta = parse_i64(&argv[2])?;
    incr_by(ctx, &argv[1], delta.checked_neg().ok_or(CommandError::NotInteger)?)
}

pub fn incrbyfloat(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let delta = crate::commands::parse_f64(&argv[2])?;
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let current = match read_str(&mut db, &argv[1], now)? {
        None => 0.0,
        Some(raw) => std::str::from_utf8(&raw)
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or(CommandError::NotFloat)?,
    };
    let next = current + delta;
    if next.is_nan() || next.is_infinite() {
        return Err(CommandError::other("increment would produce NaN or Infinity"));
    }
    let repr = format_f64(next);
    db.set_keep_ttl(argv[1].clone(), Value::Str(Bytes::from(repr.clone())));
    drop(db);
    ctx.server.notify(ctx.db_index(), &argv[1], "incrbyfloat");
    Ok(Some(Frame::bulk(Bytes::from(repr))))
}

pub fn append(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let mut data = read_str(&mut db, &argv[1], now)?
        .map(|b| b.to_vec())
        .unwrap_or_default();
    data.extend_from_slice(&argv[2]);
    let len = data.len();
    db.set_keep_ttl(argv[1].clone(), Value::Str(Bytes::from(data)));
    drop(db);
    ctx.server.notify(ctx.db_index(), &argv[1], "append");
    Ok(Some(Frame::Integer(len as i64)))
}

pub fn strlen(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let mut db = ctx.server.db(ctx.db_index());
    let len = read_str(&mut db, &argv[1], now_ms())?.map_or(0, |s| s.len());
    Ok(Some(Frame::Integer(len as i64)))
}

pub fn getrange(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let start = parse_i64(&argv[2])?;
    let stop = parse_i64(&argv[3])?;
    let mut db = ctx.server.db(ctx.db_index());
    let Some(data) = read_str(&mut db, &argv[1], now_ms())? else {
        return Ok(Some(Frame::bulk(Bytes::new())));
    };
    let slice = match crate::commands::resolve_range(start, stop, data.len()) {
        Some((s, e)) => data.slice(s..=e),
        None => Bytes::new(),
    };
    Ok(Some(Frame::bulk(slice)))
}

pub fn setrange(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let offset = parse_i64(&argv[2])?;
    if offset < 0 {
        return Err(CommandError::OutOfRange("offset is out of range"));
    }
    let offset = offset as usize;
    let patch = &argv[3];
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let mut data = read_str(&mut db, &argv[1], now)?
        .map(|b| b.to_vec())
        .unwrap_or_default();
    if patch.is_empty() {
        let len = data.len();
        return Ok(Some(Frame::Integer(len as i64)));
    }
    if data.len() < offset + patch.len() {
        data.resize(offset + patch.len(), 0);
    }
    data[offset..offset + patch.len()].copy_from_slice(patch);
    let len = data.len();
    db.set_keep_ttl(argv[1].clone(), Value::Str(Bytes::from(data)));
    drop(db);
    ctx.server.notify(ctx.db_index(), &argv[1], "setrange");
    Ok(Some(Frame::Integer(len as i64)))
}

pub fn getdel(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let old = read_str(&mut db, &argv[1], now)?;
    if old.is_some() {
        db.remove(&argv[1], now);
        drop(db);
        ctx.server.notify(ctx.db_index(), &argv[1], "del");
    }
    Ok(Some(old.map_or(Frame::null(), Frame::bulk)))
}

pub fn getex(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut persist = false;
    let mut expire_at: Option<u64> = None;
    let args = &argv[2..];
    let mut i = 0;
    while i < args.len() {
        let tok = args[i].to_ascii_uppercase();
        match tok.as_slice() {
            b"PERSIST" => persist = true,
            b"EX" | b"PX" | b"EXAT" | b"PXAT" => {
                i += 1;
                let n = parse_i64(args.get(i).ok_or(CommandError::Syntax)?)?;
                let at = match tok.as_slice() {
                    b"EX" => now.saturating_add((n.max(0) as u64) * 1000),
                    b"PX" => now.saturating_add(n.max(0) as u64),
                    b"EXAT" => (n.max(0) as u64).saturating_mul(1000),
                    _ => n.max(0) as u64,
                };
                if expire_at.replace(at).is_some() {
                    return Err(CommandError::Syntax);
                }
            },
            _ => return Err(CommandError::Syntax),
        }
        i += 1;
    }
    if persist && expire_at.is_some() {
        return Err(CommandError::Syntax);
    }

    let mut db = ctx.server.db(ctx.db_index());
    let Some(value) = read_str(&mut db, &argv[1], now)? else {
        return Ok(Some(Frame::null()));
    };
    if persist {
        db.persist(&argv[1], now);
    } else if let Some(at) = expire_at {
        db.set_expire(&argv[1], at, now);
    }
    Ok(Some(Frame::bulk(value)))
}
