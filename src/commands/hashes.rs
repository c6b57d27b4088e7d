// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Hash commands, including the per-field TTL family.

use bytes::Bytes;
use rand::RngExt;

use crate::{
    commands::{
        CommandCtx, HandlerReply, bulk_array, format_f64, parse_i64, parse_u64,
    },
    errors::{CommandError, CommandResult},
    resp::Frame,
    storage::{Db, Value, hash::FieldTtl, hash::HashValue, now_ms},
};

fn read_hash<'a>(
    db: &'a mut Db,
    key: &[u8],
    now: u64,
) -> CommandResult<Option<&'a HashValue>> {
    match db.get(key, now) {
        None => Ok(None),
        Some(Value::Hash(h)) => Ok(Some(h)),
        Some(_) => Err(CommandError::WrongType),
    }
}

fn hash_mut<'a>(
    db: &'a mut Db,
    key: &Bytes,
    create: bool,
    cfg_entries: usize,
    cfg_value: usize,
    now: u64,
) -> CommandResult<Option<&'a mut HashValue>> {
    if db.get(key, now).is_none() {
        if !create {
            return Ok(None);
        }
        db.set(key.clone(), Value::Hash(HashValue::new(cfg_entries, cfg_value)));
    }
    match db.get_mut(key, now) {
        Some(Value::Hash(h)) => Ok(Some(h)),
        Some(_) => Err(CommandError::WrongType),
        None => Ok(None),
    }
}

pub fn hset(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    if argv.len() % 2 != 0 {
        return Err(CommandError::WrongArity("hset".into()));
    }
    let now = now_ms();
    let (e, v) = (
        ctx.server.cfg.encodings.hash_max_listpack_entries,
        ctx.server.cfg.encodings.hash_max_listpack_value,
    );
    let mut created = 0;
    {
        let mut db = ctx.server.db(ctx.db_index());
        let Some(hash) = hash_mut(&mut db, &argv[1], true, e, v, now)? else {
            return Err(CommandError::Internal);
        };
        for pair in argv[2..].chunks_exact(2) {
            if hash.set(pair[0].clone(), pair[1].clone(), now) {
                created += 1;
            }
        }
        db.touch(&argv[1]);
    }
    ctx.server.notify(ctx.db_index(), &argv[1], "hset");
    Ok(Some(Frame::Integer(created)))
}

pub fn hmset(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    hset(ctx, argv)?;
    Ok(Some(Frame::ok()))
}

pub fn hget(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let value = read_hash(&mut db, &argv[1], now)?
        .and_then(|h| h.get(&argv[2], now));
    Ok(Some(value.map_or(Frame::null(), Frame::bulk)))
}

pub fn hmget(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let hash = read_hash(&mut db, &argv[1], now)?;
    let items = argv[2..]
        .iter()
        .map(|f| {
            hash.and_then(|h| h.get(f, now))
                .map_or(Frame::null(), Frame::bulk)
        })
        .collect();
    Ok(Some(Frame::array(items)))
}

pub fn hgetall(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let mut items = Vec::new();
    if let Some(hash) = read_hash(&mut db, &argv[1], now)? {
        for (f, v) in hash.items(now) {
            items.push(Frame::bulk(f));
            items.push(Frame::bulk(v));
        }
    }
    Ok(Some(Frame::array(items)))
}

pub fn hdel(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut removed = 0;
    {
        let mut db = ctx.server.db(ctx.db_index());
        let (e, v) = (
            ctx.server.cfg.encodings.hash_max_listpack_entries,
            ctx.server.cfg.encodings.hash_max_listpack_value,
        );
        if let Some(hash) = hash_mut(&mut db, &argv[1], false, e, v, now)? {
            for field in &argv[2..] {
                if hash.remove(field, now) {
                    removed += 1;
                }
            }
            db.touch(&argv[1]);
            db.drop_if_drained(&argv[1], now);
        }
    }
    if removed > 0 {
        ctx.server.notify(ctx.db_index(), &argv[1], "hdel");
    }
    Ok(Some(Frame::Integer(removed)))
}

pub fn hexists(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let found = read_hash(&mut db, &argv[1], now)?
        .is_some_and(|h| h.contains(&argv[2], now));
    Ok(Some(Frame::from_bool(found)))
}

pub fn hlen(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let len = read_hash(&mut db, &argv[1], now)?.map_or(0, |h| h.len(now));
    Ok(Some(Frame::Integer(len as i64)))
}

pub fn hkeys(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let fields: Vec<Bytes> = read_hash(&mut db, &argv[1], now)?
        .map(|h| h.items(now).into_iter().map(|(f, _)| f).collect())
        .unwrap_or_default();
    Ok(Some(bulk_array(fields)))
}

pub fn hvals(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let values: Vec<Bytes> = read_hash(&mut db, &argv[1], now)?
        .map(|h| h.items(now).into_iter().map(|(_, v)| v).collect())
        .unwrap_or_default();
    Ok(Some(bulk_array(values)))
}

pub fn hincrby(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let delta = parse_i64(&argv[3])?;
    let now = now_ms();
    let next = {
        let (e, v) = (
            ctx.server.cfg.encodings.hash_max_listpack_entries,
            ctx.server.cfg.encodings.hash_max_listpack_value,
        );
        let mut db = ctx.server.db(ctx.db_index());
        let Some(hash) = hash_mut(&mut db, &argv[1], true, e, v, now)? else {
            return Err(CommandError::Internal);
        };
        let current = match hash.get(&argv[2], now) {
            None => 0,
            Some(raw) => std::str::from_utf8(&raw)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| {
                    CommandError::other("hash value is not an integer")
                })?,
        };
        let next = current.checked_add(delta).ok_or_else(|| {
            CommandError::other("increment or decrement would overflow")
        })?;
        hash.set(argv[2].clone(), Bytes::from(next.to_string()), now);
        db.touch(&argv[1]);
        next
    };
    ctx.server.notify(ctx.db_index(), &argv[1], "hincrby");
    Ok(Some(Frame::Integer(next)))
}

pub fn hincrbyfloat(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let delta = crate::commands::parse_f64(&argv[3])?;
    let now = now_ms();
    let repr = {
        let (e, v) = (
            ctx.server.cfg.encodings.hash_max_listpack_entries,
            ctx.server.cfg.encodings.hash_max_listpack_value,
        );
        let mut db = ctx.server.db(ctx.db_index());
        let Some(hash) = hash_mut(&mut db, &argv[1], true, e, v, now)? else {
            return Err(CommandError::Internal);
        };
        let current = match hash.get(&argv[2], now) {
            None => 0.0,
            Some(raw) => std::str::from_utf8(&raw)
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| CommandError::other("hash value is not a float"))?,
        };
        let next = current + delta;
        if next.is_nan() || next.is_infinite() {
            return Err(CommandError::other(
                "increment would produce NaN or Infinity",
            ));
        }
        let repr = format_f64(next);
        hash.set(argv[2].clone(), Bytes::from(repr.clone()), now);
        db.touch(&argv[1]);
        repr
    };
    ctx.server.notify(ctx.db_index(), &argv[1], "hincrbyfloat");
    Ok(Some(Frame::bulk(Bytes::from(repr))))
}

pub fn hsetnx(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let created = {
        let (e, v) = (
            ctx.server.cfg.encodings.hash_max_listpack_entries,
            ctx.server.cfg.encodings.hash_max_listpack_value,
        );
        let mut db = ctx.server.db(ctx.db_index());
        let Some(hash) = hash_mut(&mut db, &argv[1], true, e, v, now)? else {
            return Err(CommandError::Internal);
        };
        if hash.contains(&argv[2], now) {
            false
        } else {
            hash.set(argv[2].clone(), argv[3].clone(), now);
            db.touch(&argv[1]);
            true
        }
    };
    if created {
        ctx.server.notify(ctx.db_index(), &argv[1], "hset");
    }
    Ok(Some(Frame::from_bool(created)))
}

pub fn hrandfield(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let with_values = argv
        .get(3)
        .is_some_and(|a| a.eq_ignore_ascii_case(b"WITHVALUES"));
    if argv.len() > 4 || (argv.len() == 4 && !with_values) {
        return Err(CommandError::Syntax);
    }
    let count = match argv.get(2) {
        Some(raw) => Some(parse_i64(raw)?),
        None => None,
    };

    let mut db = ctx.server.db(ctx.db_index());
    let items = read_hash(&mut db, &argv[1], now)?
        .map(|h| h.items(now))
        .unwrap_or_default();

    let Some(count) = count else {
        // Single random field, nil on missing key.
        if items.is_empty() {
            return Ok(Some(Frame::null()));
        }
        let pick = &items[rand::rng().random_range(0..items.len())];
        return Ok(Some(Frame::bulk(pick.0.clone())));
    };

    let mut out = Vec::new();
    if count >= 0 {
        // Distinct fields, order unspecified.
        let mut pool = items;
        let mut rng = rand::rng();
        let take = (count as usize).min(pool.len());
        for _ in 0..take {
            let idx = rng.random_range(0..pool.len());
            out.push(pool.swap_remove(idx));
        }
    } else if !items.is_empty() {
        // Negative count allows repeats.
        let mut rng = rand::rng();
        for _ in 0..count.unsigned_abs() {
            out.push(items[rng.random_range(0..items.len())].clone());
        }
    }

    let mut frames = Vec::new();
    for (f, v) in out {
        frames.push(Frame::bulk(f));
        if with_values {
            frames.push(Frame::bulk(v));
        }
    }
    Ok(Some(Frame::array(frames)))
}

pub fn hscan(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let _cursor = parse_u64(&argv[2])?;
    let (pattern, novalues) = scan_options(&argv[3..])?;
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let mut frames = Vec::new();
    if let Some(hash) = read_hash(&mut db, &argv[1], now)? {
        for (f, v) in hash.items(now) {
            if let Some(p) = &pattern
                && !crate::storage::glob::glob_match(p, &f)
            {
                continue;
            }
            frames.push(Frame::bulk(f));
            if !novalues {
                frames.push(Frame::bulk(v));
            }
        }
    }
    // Container scans answer in one pass: cursor 0 ends the traversal.
    Ok(Some(Frame::array(vec![
        Frame::bulk_from_str("0"),
        Frame::array(frames),
    ])))
}

/// MATCH/COUNT/NOVALUES options shared by the container SCAN variants;
/// COUNT is accepted and ignored because container scans are single-pass.
pub(crate) fn scan_options(args: &[Bytes]) -> CommandResult<(Option<Bytes>, bool)> {
    let mut pattern = None;
    let mut novalues = false;
    let mut i = 0;
    while i < args.len() {
        match args[i].to_ascii_uppercase().as_slice() {
            b"MATCH" => {
                i += 1;
                pattern = Some(args.get(i).ok_or(CommandError::Syntax)?.clone());
            },
            b"COUNT" => {
                i += 1;
                parse_u64(args.get(i).ok_or(CommandError::Syntax)?)?;
            },
            b"NOVALUES" => novalues = true,
            _ => return Err(CommandError::Syntax),
        }
        i += 1;
    }
    Ok((pattern, novalues))
}

// ── per-field TTL family ──────────────────────────────────────────────

/// Parses `... FIELDS <numfields> field [field ...]` used by HEXPIRE and
/// friends; returns the fields slice.
fn parse_fields_clause<'a>(args: &'a [Bytes]) -> CommandResult<&'a [Bytes]> {
    let Some(first) = args.first() else {
        return Err(CommandError::Syntax);
    };
    if !first.eq_ignore_ascii_case(b"FIELDS") {
        return Err(CommandError::Syntax);
    }
    let n = parse_i64(args.get(1).ok_or(CommandError::Syntax)?)?;
    let fields = &args[2..];
    if n <= 0 || fields.len() != n as usize {
        return Err(CommandError::other(
            "Parameter `numFields` should be greater than 0",
        ));
    }
    Ok(fields)
}

/// Reply codes for the field-TTL commands: -2 no field, 0 condition
/// failed, 1 applied, 2 deleted immediately.
fn hexpire_generic(
    ctx: &mut CommandCtx,
    argv: &[Bytes],
    unit_ms: u64,
) -> HandlerReply {
    let ttl = parse_i64(&argv[2])?;
    let fields = parse_fields_clause(&argv[3..])?;
    let now = now_ms();

    let mut codes = Vec::with_capacity(fields.len());
    {
        let (e, v) = (
            ctx.server.cfg.encodings.hash_max_listpack_entries,
            ctx.server.cfg.encodings.hash_max_listpack_value,
        );
        let mut db = ctx.server.db(ctx.db_index());
        let Some(hash) = hash_mut(&mut db, &argv[1], false, e, v, now)? else {
            return Ok(Some(Frame::array(
                fields.iter().map(|_| Frame::Integer(-2)).collect(),
            )));
        };
        for field in fields {
            if !hash.contains(field, now) {
                codes.push(-2);
                continue;
            }
            if ttl <= 0 {
                hash.remove(field, now);
                codes.push(2);
                continue;
            }
            let at = now.saturating_add((ttl as u64).saturating_mul(unit_ms));
            hash.set_expire(field, at, now);
            codes.push(1);
        }
        db.touch(&argv[1]);
        db.drop_if_drained(&argv[1], now);
    }
    ctx.server.notify(ctx.db_index(), &argv[1], "hexpire");
    Ok(Some(Frame::array(
        codes.into_iter().map(Frame::Integer).collect(),
    )))
}

pub fn hexpire(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    hexpire_generic(ctx, argv, 1000)
}

pub fn hpexpire(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    hexpire_generic(ctx, argv, 1)
}

/// -2 no field, -1 no TTL, else remaining time.
fn httl_generic(ctx: &mut CommandCtx, argv: &[Bytes], unit_ms: u64) -> HandlerReply {
    let fields = parse_fields_clause(&argv[2..])?;
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let hash = read_hash(&mut db, &argv[1], now)?;
    let codes: Vec<Frame> = fields
        .iter()
        .map(|field| {
            let code = match hash.map_or(FieldTtl::NoField, |h| h.ttl(field, now)) {
                FieldTtl::NoField => -2,
                FieldTtl::NoTtl => -1,
                FieldTtl::ExpiresAtMs(at) => {
                    at.saturating_sub(now).div_ceil(unit_ms) as i64
                },
            };
            Frame::Integer(code)
        })
        .collect();
    Ok(Some(Frame::array(codes)))
}

pub fn httl(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    httl_generic(ctx, argv, 1000)
}

pub fn hpttl(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    httl_generic(ctx, argv, 1)
}

/// -2 no field, -1 field had no TTL, 1 TTL removed.
pub fn hpersist(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let fields = parse_fields_clause(&argv[2..])?;
    let now = now_ms();
    let (e, v) = (
        ctx.server.cfg.encodings.hash_max_listpack_entries,
        ctx.server.cfg.encodings.hash_max_listpack_value,
    );
    let mut db = ctx.server.db(ctx.db_index());
    let Some(hash) = hash_mut(&mut db, &argv[1], false, e, v, now)? else {
        return Ok(Some(Frame::array(
            fields.iter().map(|_| Frame::Integer(-2)).collect(),
        )));
    };
    let codes: Vec<Frame> = fields
        .iter()
        .map(|field| {
            let code = if !hash.contains(field, now) {
                -2
            } else if hash.persist(field, now) {
                1
            } else {
                -1
            };
            Frame::Integer(code)
        })
        .collect();
    db.touch(&argv[1]);
    Ok(Some(Frame::array(codes)))
}
