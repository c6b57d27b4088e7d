// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! List commands, including the blocking pop family.
//!
//! A blocking pop first tries an immediate pop under the database lock.
//! Only when every watched key is empty does it park on the coordinator;
//! on wakeup it re-runs the pop, so the element it reports always
//! reflects post-write ordering. Losing the race to another client just
//! parks it again until the deadline.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::{
    commands::{
        BoxedReply, CommandCtx, HandlerReply, bulk_array, parse_i64,
    },
    errors::{CommandError, CommandResult},
    resp::Frame,
    server::client::ClientFlags,
    storage::{Db, TypeTag, Value, now_ms, quicklist::QuickList},
};

fn read_list<'a>(
    db: &'a mut Db,
    key: &[u8],
    now: u64,
) -> CommandResult<Option<&'a QuickList>> {
    match db.get(key, now) {
        None => Ok(None),
        Some(Value::List(l)) => Ok(Some(l)),
        Some(_) => Err(CommandError::WrongType),
    }
}

fn list_mut<'a>(
    ctx: &CommandCtx,
    db: &'a mut Db,
    key: &Bytes,
    create: bool,
    now: u64,
) -> CommandResult<Option<&'a mut QuickList>> {
    if db.get(key, now).is_none() {
        if !create {
            return Ok(None);
        }
        let ql = QuickList::new(
            ctx.server.cfg.list_node_byte_cap(),
            ctx.server.cfg.list_node_entry_cap(),
        );
        db.set(key.clone(), Value::List(ql));
    }
    match db.get_mut(key, now) {
        Some(Value::List(l)) => Ok(Some(l)),
        Some(_) => Err(CommandError::WrongType),
        None => Ok(None),
    }
}

fn push(ctx: &mut CommandCtx, argv: &[Bytes], left: bool) -> HandlerReply {
    let now = now_ms();
    let len = {
        let mut db = ctx.server.db(ctx.db_index());
        let Some(list) = list_mut(ctx, &mut db, &argv[1], true, now)? else {
            return Err(CommandError::Internal);
        };
        for elem in &argv[2..] {
            if left {
                list.push_front(elem);
            } else {
                list.push_back(elem);
            }
        }
        let len = list.len();
        db.touch(&argv[1]);
        len
    };
    let event = if left { "lpush" } else { "rpush" };
    ctx.server.notify(ctx.db_index(), &argv[1], event);
    ctx.server.blocking.signal_key_ready(
        ctx.db_index(),
        &argv[1],
        TypeTag::List,
        argv.len() - 2,
    );
    Ok(Some(Frame::Integer(len as i64)))
}

pub fn lpush(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    push(ctx, argv, true)
}

pub fn rpush(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    push(ctx, argv, false)
}

fn pop(ctx: &mut CommandCtx, argv: &[Bytes], left: bool) -> HandlerReply {
    let count = match argv.get(2) {
        Some(raw) => {
            let n = parse_i64(raw)?;
            if n < 0 {
                return Err(CommandError::OutOfRange("value is out of range, must be positive"));
            }
            Some(n as usize)
        },
        None => None,
    };
    let now = now_ms();
    let popped = {
        let mut db = ctx.server.db(ctx.db_index());
        let Some(list) = list_mut(ctx, &mut db, &argv[1], false, now)? else {
            return Ok(Some(match count {
                Some(_) => Frame::null_array(),
                None => Frame::null(),
            }));
        };
        let take = count.unwrap_or(1).min(list.len());
        let mut popped = Vec::with_capacity(take);
        for _ in 0..take {
            let elem = if left { list.pop_front() } else { list.pop_back() };
            match elem {
                Some(e) => popped.push(Bytes::from(e)),
                None => break,
            }
        }
        db.touch(&argv[1]);
        db.drop_if_drained(&argv[1], now);
        popped
    };
    if !popped.is_empty() {
        let event = if left { "lpop" } else { "rpop" };
        ctx.server.notify(ctx.db_index(), &argv[1], event);
    }
    Ok(Some(match count {
        Some(_) => bulk_array(popped),
        None => popped
            .into_iter()
            .next()
            .map_or(Frame::null(), Frame::bulk),
    }))
}

pub fn lpop(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    pop(ctx, argv, true)
}

pub fn rpop(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    pop(ctx, argv, false)
}

pub fn lrange(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let start = parse_i64(&argv[2])?;
    let stop = parse_i64(&argv[3])?;
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let Some(list) = read_list(&mut db, &argv[1], now)? else {
        return Ok(Some(Frame::array(Vec::new())));
    };
    let items = match crate::commands::resolve_range(start, stop, list.len()) {
        Some((s, e)) => list.range(s, e),
        None => Vec::new(),
    };
    Ok(Some(bulk_array(items.into_iter().map(Bytes::from))))
}

pub fn lindex(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let index = parse_i64(&argv[2])?;
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let Some(list) = read_list(&mut db, &argv[1], now)? else {
        return Ok(Some(Frame::null()));
    };
    let resolved = if index < 0 {
        list.len() as i64 + index
    } else {
        index
    };
    if resolved < 0 {
        return Ok(Some(Frame::null()));
    }
    Ok(Some(
        list.get(resolved as usize)
            .map_or(Frame::null(), |e| Frame::bulk(Bytes::from(e))),
    ))
}

pub fn lset(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let index = parse_i64(&argv[2])?;
    let now = now_ms();
    {
        let mut db = ctx.server.db(ctx.db_index());
        let Some(list) = list_mut(ctx, &mut db, &argv[1], false, now)? else {
            return Err(CommandError::NoSuchKey);
        };
        let resolved = if index < 0 {
            list.len() as i64 + index
        } else {
            index
        };
        if resolved < 0 || !list.set_at(resolved as usize, &argv[3]) {
            return Err(CommandError::OutOfRange("index out of range"));
        }
        db.touch(&argv[1]);
    }
    ctx.server.notify(ctx.db_index(), &argv[1], "lset");
    Ok(Some(Frame::ok()))
}

pub fn llen(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let len = read_list(&mut db, &argv[1], now)?.map_or(0, QuickList::len);
    Ok(Some(Frame::Integer(len as i64)))
}

pub fn ltrim(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let start = parse_i64(&argv[2])?;
    let stop = parse_i64(&argv[3])?;
    let now = now_ms();
    {
        let mut db = ctx.server.db(ctx.db_index());
        let Some(list) = list_mut(ctx, &mut db, &argv[1], false, now)? else {
            return Ok(Some(Frame::ok()));
        };
        match crate::commands::resolve_range(start, stop, list.len()) {
            Some((s, e)) => list.trim(s, e),
            None => list.trim(1, 0),
        }
        db.touch(&argv[1]);
        db.drop_if_drained(&argv[1], now);
    }
    ctx.server.notify(ctx.db_index(), &argv[1], "ltrim");
    Ok(Some(Frame::ok()))
}

pub fn lpos(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let mut rank = 1i64;
    let mut count: Option<usize> = None;
    let mut maxlen = 0usize;
    let mut i = 3;
    while i < argv.len() {
        match argv[i].to_ascii_uppercase().as_slice() {
            b"RANK" => {
                i += 1;
                rank = parse_i64(argv.get(i).ok_or(CommandError::Syntax)?)?;
                if rank == 0 {
                    return Err(CommandError::other(
                        "RANK can't be zero. Use 1 to start searching from the first matching element, or the negative number to search backwards.",
                    ));
                }
            },
            b"COUNT" => {
                i += 1;
                let n = parse_i64(argv.get(i).ok_or(CommandError::Syntax)?)?;
                if n < 0 {
                    return Err(CommandError::OutOfRange("COUNT can't be negative"));
                }
                count = Some(if n == 0 { usize::MAX } else { n as usize });
            },
            b"MAXLEN" => {
                i += 1;
                let n = parse_i64(argv.get(i).ok_or(CommandError::Syntax)?)?;
                if n < 0 {
                    return Err(CommandError::OutOfRange("MAXLEN can't be negative"));
                }
                maxlen = n as usize;
            },
            _ => return Err(CommandError::Syntax),
        }
        i += 1;
    }

    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let Some(list) = read_list(&mut db, &argv[1], now)? else {
        return Ok(Some(match count {
            Some(_) => Frame::array(Vec::new()),
            None => Frame::null(),
        }));
    };
    let matches = list.position(&argv[2], rank, count.unwrap_or(1), maxlen);
    Ok(Some(match count {
        Some(_) => Frame::array(
            matches.into_iter().map(|i| Frame::Integer(i as i64)).collect(),
        ),
        None => matches
            .first()
            .map_or(Frame::null(), |&i| Frame::Integer(i as i64)),
    }))
}

pub fn lrem(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let count = parse_i64(&argv[2])?;
    let now = now_ms();
    let removed = {
        let mut db = ctx.server.db(ctx.db_index());
        let Some(list) = list_mut(ctx, &mut db, &argv[1], false, now)? else {
            return Ok(Some(Frame::Integer(0)));
        };
        let removed = list.remove_matching(&argv[3], count);
        db.touch(&argv[1]);
        db.drop_if_drained(&argv[1], now);
        removed
    };
    if removed > 0 {
        ctx.server.notify(ctx.db_index(), &argv[1], "lrem");
    }
    Ok(Some(Frame::Integer(removed as i64)))
}

#[derive(Clone, Copy, PartialEq)]
enum Side {
    Left,
    Right,
}

fn parse_side(arg: &[u8]) -> CommandResult<Side> {
    match arg.to_ascii_uppercase().as_slice() {
        b"LEFT" => Ok(Side::Left),
        b"RIGHT" => Ok(Side::Right),
        _ => Err(CommandError::Syntax),
    }
}

/// One atomic element transfer; the core of LMOVE/RPOPLPUSH/BLMOVE.
fn move_element(
    ctx: &mut CommandCtx,
    src: &Bytes,
    dst: &Bytes,
    from: Side,
    to: Side,
) -> CommandResult<Option<Bytes>> {
    let now = now_ms();
    let moved = {
        let mut db = ctx.server.db(ctx.db_index());
        let Some(source) = list_mut(ctx, &mut db, src, false, now)? else {
            return Ok(None);
        };
        let elem = match from {
            Side::Left => source.pop_front(),
            Side::Right => source.pop_back(),
        };
        let Some(elem) = elem else {
            return Ok(None);
        };
        db.touch(src);
        db.drop_if_drained(src, now);
        let Some(dest) = list_mut(ctx, &mut db, dst, true, now)? else {
            return Err(CommandError::Internal);
        };
        match to {
            Side::Left => dest.push_front(&elem),
            Side::Right => dest.push_back(&elem),
        }
        db.touch(dst);
        Bytes::from(elem)
    };
    ctx.server.notify(ctx.db_index(), src, "lpop");
    ctx.server.notify(ctx.db_index(), dst, "lpush");
    ctx.server
        .blocking
        .signal_key_ready(ctx.db_index(), dst, TypeTag::List, 1);
    Ok(Some(moved))
}

pub fn lmove(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let from = parse_side(&argv[3])?;
    let to = parse_side(&argv[4])?;
    let moved = move_element(ctx, &argv[1], &argv[2], from, to)?;
    Ok(Some(moved.map_or(Frame::null(), Frame::bulk)))
}

pub fn rpoplpush(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let moved = move_element(ctx, &argv[1], &argv[2], Side::Right, Side::Left)?;
    Ok(Some(moved.map_or(Frame::null(), Frame::bulk)))
}

// ── blocking variants ─────────────────────────────────────────────────

/// BLPOP-style timeout: seconds as a float, 0 = forever.
pub(crate) fn parse_block_timeout(arg: &[u8]) -> CommandResult<Option<Duration>> {
    let secs: f64 = std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| CommandError::other("timeout is not a float or out of range"))?;
    if secs < 0.0 || !secs.is_finite() {
        return Err(CommandError::other("timeout is negative"));
    }
    if secs == 0.0 {
        Ok(None)
    } else {
        Ok(Some(Duration::from_secs_f64(secs)))
    }
}

fn try_pop_first(
    ctx: &mut CommandCtx,
    keys: &[Bytes],
    left: bool,
) -> CommandResult<Option<(Bytes, Bytes)>> {
    let now = now_ms();
    for key in keys {
        let popped = {
            let mut db = ctx.server.db(ctx.db_index());
            let Some(list) = list_mut(ctx, &mut db, key, false, now)? else {
                continue;
            };
            let elem = if left { list.pop_front() } else { list.pop_back() };
            let Some(elem) = elem else { continue };
            db.touch(key);
            db.drop_if_drained(key, now);
            Bytes::from(elem)
        };
        ctx.server
            .notify(ctx.db_index(), key, if left { "lpop" } else { "rpop" });
        return Ok(Some((key.clone(), popped)));
    }
    Ok(None)
}

async fn block_pop(
    ctx: &mut CommandCtx<'_>,
    argv: Vec<Bytes>,
    left: bool,
) -> HandlerReply {
    let timeout = parse_block_timeout(&argv[argv.len() - 1])?;
    let keys: Vec<Bytes> = argv[1..argv.len() - 1].to_vec();
    let deadline = timeout.map(|d| Instant::now() + d);

    loop {
        if let Some((key, elem)) = try_pop_first(ctx, &keys, left)? {
            return Ok(Some(Frame::array(vec![
                Frame::bulk(key),
                Frame::bulk(elem),
            ])));
        }
        if !ctx.allow_block {
            return Ok(Some(Frame::null_array()));
        }
        let remaining = match deadline {
            Some(at) => {
                let left_dur = at.saturating_duration_since(Instant::now());
                if left_dur.is_zero() {
                    return Ok(Some(Frame::null_array()));
                }
                Some(left_dur)
            },
            None => None,
        };
        ctx.session.shared.set_flag(ClientFlags::BLOCKED, true);
        let woke = ctx
            .server
            .blocking
            .wait_ready(
                ctx.db_index(),
                &keys,
                TypeTag::List,
                ctx.session.client_id(),
                remaining,
            )
            .await;
        ctx.session.shared.set_flag(ClientFlags::BLOCKED, false);
        if !woke {
            return Ok(Some(Frame::null_array()));
        }
    }
}

pub fn blpop<'a, 'b>(ctx: &'a mut CommandCtx<'b>, argv: Vec<Bytes>) -> BoxedReply<'a> {
    Box::pin(block_pop(ctx, argv, true))
}

pub fn brpop<'a, 'b>(ctx: &'a mut CommandCtx<'b>, argv: Vec<Bytes>) -> BoxedReply<'a> {
    Box::pin(block_pop(ctx, argv, false))
}

pub fn blmove<'a, 'b>(
    ctx: &'a mut CommandCtx<'b>,
    argv: Vec<Bytes>,
) -> BoxedReply<'a> {
    Box::pin(async move {
        let from = parse_side(&argv[3])?;
        let to = parse_side(&argv[4])?;
        let timeout = parse_block_timeout(&argv[5])?;
        let deadline = timeout.map(|d| Instant::now() + d);
        let src = argv[1].clone();
        let dst = argv[2].clone();
        let keys = [src.clone()];

        loop {
            if let Some(moved) = move_element(ctx, &src, &dst, from, to)? {
                return Ok(Some(Frame::bulk(moved)));
            }
            if !ctx.allow_block {
                return Ok(Some(Frame::null()));
            }
            let remaining = match deadline {
                Some(at) => {
                    let left_dur = at.saturating_duration_since(Instant::now());
                    if left_dur.is_zero() {
                        return Ok(Some(Frame::null()));
                    }
                    Some(left_dur)
                },
                None => None,
            };
            ctx.session.shared.set_flag(ClientFlags::BLOCKED, true);
            let woke = ctx
                .server
                .blocking
                .wait_ready(
                    ctx.db_index(),
                    &keys,
                    TypeTag::List,
                    ctx.session.client_id(),
                    remaining,
                )
                .await;
            ctx.session.shared.set_flag(ClientFlags::BLOCKED, false);
            if !woke {
                return Ok(Some(Frame::null()));
            }
        }
    })
}
