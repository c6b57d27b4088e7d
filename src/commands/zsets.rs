// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Sorted-set commands, including the blocking pops.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::{
    commands::{
        BoxedReply, CommandCtx, HandlerReply, format_f64, lists::parse_block_timeout,
        parse_f64, parse_i64,
    },
    errors::{CommandError, CommandResult},
    resp::Frame,
    server::client::ClientFlags,
    storage::{
        Db, TypeTag, Value, now_ms,
        skiplist::ScoreBound,
        zset::{AddFlags, AddOutcome, SortedSet},
    },
};

fn read_zset<'a>(
    db: &'a mut Db,
    key: &[u8],
    now: u64,
) -> CommandResult<Option<&'a SortedSet>> {
    match db.get(key, now) {
        None => Ok(None),
        Some(Value::ZSet(z)) => Ok(Some(z)),
        Some(_) => Err(CommandError::WrongType),
    }
}

fn zset_mut<'a>(
    db: &'a mut Db,
    key: &Bytes,
    create: bool,
    now: u64,
) -> CommandResult<Option<&'a mut SortedSet>> {
    if db.get(key, now).is_none() {
        if !create {
            return Ok(None);
        }
        db.set(key.clone(), Value::ZSet(SortedSet::new()));
    }
    match db.get_mut(key, now) {
        Some(Value::ZSet(z)) => Ok(Some(z)),
        Some(_) => Err(CommandError::WrongType),
        None => Ok(None),
    }
}

/// `(5`, `5`, `+inf`, `-inf` → a score bound.
fn parse_score_bound(arg: &[u8]) -> CommandResult<ScoreBound> {
    if let Some(rest) = arg.strip_prefix(b"(") {
        Ok(ScoreBound { value: parse_f64(rest)?, exclusive: true })
    } else {
        Ok(ScoreBound { value: parse_f64(arg)?, exclusive: false })
    }
}

pub fn zadd(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let mut flags = AddFlags::default();
    let mut ch = false;
    let mut incr = false;
    let mut i = 2;
    while i < argv.len() {
        match argv[i].to_ascii_uppercase().as_slice() {
            b"NX" => flags.nx = true,
            b"XX" => flags.xx = true,
            b"GT" => flags.gt = true,
            b"LT" => flags.lt = true,
            b"CH" => ch = true,
            b"INCR" => incr = true,
            _ => break,
        }
        i += 1;
    }
    // NX with GT/LT is allowed and simply never updates an existing
    // member; NX+XX and GT+LT contradict outright.
    if (flags.nx && flags.xx) || (flags.gt && flags.lt) {
        return Err(CommandError::other(
            "XX and NX options at the same time are not compatible",
        ));
    }
    let pairs = &argv[i..];
    if pairs.is_empty() || pairs.len() % 2 != 0 {
        return Err(CommandError::Syntax);
    }
    if incr && pairs.len() != 2 {
        return Err(CommandError::other(
            "INCR option supports a single increment-element pair",
        ));
    }
    // Validate every score before touching the value.
    let mut scored = Vec::with_capacity(pairs.len() / 2);
    for pair in pairs.chunks_exact(2) {
        scored.push((parse_f64(&pair[0])?, pair[1].clone()));
    }

    let now = now_ms();
    let reply = {
        let mut db = ctx.server.db(ctx.db_index());
        let Some(zset) = zset_mut(&mut db, &argv[1], !flags.xx, now)? else {
            // XX against a missing key mutates nothing.
            return Ok(Some(if incr { Frame::null() } else { Frame::Integer(0) }));
        };

        if incr {
            let (delta, member) = &scored[0];
            let existed = zset.contains(member);
            if (flags.nx && existed) || (flags.xx && !existed) {
                Frame::null()
            } else {
                match zset.incr_by(member.clone(), *delta) {
                    Some(score) => {
                        db.touch(&argv[1]);
                        Frame::bulk(Bytes::from(format_f64(score)))
                    },
                    None => {
                        return Err(CommandError::other(
                            "resulting score is not a number (NaN)",
                        ));
                    },
                }
            }
        } else {
            let mut added = 0i64;
            let mut changed = 0i64;
            for (score, member) in scored {
                match zset.add(member, score, flags) {
                    AddOutcome::Added => {
                        added += 1;
                        changed += 1;
                    },
                    AddOutcome::Updated => changed += 1,
                    AddOutcome::Unchanged => {},
                }
            }
            db.touch(&argv[1]);
            db.drop_if_drained(&argv[1], now);
            Frame::Integer(if ch { changed } else { added })
        }
    };
    ctx.server.notify(ctx.db_index(), &argv[1], "zadd");
    ctx.server.blocking.signal_key_ready(
        ctx.db_index(),
        &argv[1],
        TypeTag::ZSet,
        (argv.len() - i) / 2,
    );
    Ok(Some(reply))
}

pub fn zrem(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let removed = {
        let mut db = ctx.server.db(ctx.db_index());
        let Some(zset) = zset_mut(&mut db, &argv[1], false, now)? else {
            return Ok(Some(Frame::Integer(0)));
        };
        let mut removed = 0;
        for member in &argv[2..] {
            if zset.remove(member) {
                removed += 1;
            }
        }
        db.touch(&argv[1]);
        db.drop_if_drained(&argv[1], now);
        removed
    };
    if removed > 0 {
        ctx.server.notify(ctx.db_index(), &argv[1], "zrem");
    }
    Ok(Some(Frame::Integer(removed)))
}

pub fn zscore(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let score = read_zset(&mut db, &argv[1], now)?.and_then(|z| z.score(&argv[2]));
    Ok(Some(score.map_or(Frame::null(), |s| {
        Frame::bulk(Bytes::from(format_f64(s)))
    })))
}

pub fn zmscore(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let zset = read_zset(&mut db, &argv[1], now)?;
    let scores = argv[2..]
        .iter()
        .map(|m| {
            zset.and_then(|z| z.score(m)).map_or(Frame::null(), |s| {
                Frame::bulk(Bytes::from(format_f64(s)))
            })
        })
        .collect();
    Ok(Some(Frame::array(scores)))
}

pub fn zrank(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let rank = read_zset(&mut db, &argv[1], now)?.and_then(|z| z.rank(&argv[2]));
    Ok(Some(rank.map_or(Frame::null(), |r| Frame::Integer(r as i64))))
}

pub fn zrevrank(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let rank = read_zset(&mut db, &argv[1], now)?.and_then(|z| z.rev_rank(&argv[2]));
    Ok(Some(rank.map_or(Frame::null(), |r| Frame::Integer(r as i64))))
}

fn reply_scored(items: Vec<(Bytes, f64)>, with_scores: bool) -> Frame {
    let mut frames = Vec::with_capacity(items.len() * if with_scores { 2 } else { 1 });
    for (member, score) in items {
        frames.push(Frame::bulk(member));
        if with_scores {
            frames.push(Frame::bulk(Bytes::from(format_f64(score))));
        }
    }
    Frame::array(frames)
}

fn range_by_rank(
    ctx: &mut CommandCtx,
    argv: &[Bytes],
    reverse: bool,
) -> HandlerReply {
    let start = parse_i64(&argv[2])?;
    let stop = parse_i64(&argv[3])?;
    let mut with_scores = false;
    let mut rev = reverse;
    for arg in &argv[4..] {
        match arg.to_ascii_uppercase().as_slice() {
            b"WITHSCORES" => with_scores = true,
            b"REV" => rev = true,
            _ => return Err(CommandError::Syntax),
        }
    }
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let Some(zset) = read_zset(&mut db, &argv[1], now)? else {
        return Ok(Some(Frame::array(Vec::new())));
    };
    let items = match crate::commands::resolve_range(start, stop, zset.len()) {
        Some((s, e)) => {
            if rev {
                // Reverse ranks index from the high end.
                let len = zset.len();
                let (rs, re) = (len - 1 - e, len - 1 - s);
                zset.range_by_rank(rs, re, true)
            } else {
                zset.range_by_rank(s, e, false)
            }
        },
        None => Vec::new(),
    };
    Ok(Some(reply_scored(items, with_scores)))
}

pub fn zrange(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    range_by_rank(ctx, argv, false)
}

pub fn zrevrange(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    range_by_rank(ctx, argv, true)
}

pub fn zincrby(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let delta = parse_f64(&argv[2])?;
    let now = now_ms();
    let score = {
        let mut db = ctx.server.db(ctx.db_index());
        let Some(zset) = zset_mut(&mut db, &argv[1], true, now)? else {
            return Err(CommandError::Internal);
        };
        let Some(score) = zset.incr_by(argv[3].clone(), delta) else {
            return Err(CommandError::other("resulting score is not a number (NaN)"));
        };
        db.touch(&argv[1]);
        score
    };
    ctx.server.notify(ctx.db_index(), &argv[1], "zincr");
    ctx.server
        .blocking
        .signal_key_ready(ctx.db_index(), &argv[1], TypeTag::ZSet, 1);
    Ok(Some(Frame::bulk(Bytes::from(format_f64(score)))))
}

pub fn zcard(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let len = read_zset(&mut db, &argv[1], now)?.map_or(0, SortedSet::len);
    Ok(Some(Frame::Integer(len as i64)))
}

pub fn zcount(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let min = parse_score_bound(&argv[2])?;
    let max = parse_score_bound(&argv[3])?;
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let count = read_zset(&mut db, &argv[1], now)?
        .map_or(0, |z| z.count_by_score(min, max));
    Ok(Some(Frame::Integer(count as i64)))
}

pub fn zrangebyscore(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let min = parse_score_bound(&argv[2])?;
    let max = parse_score_bound(&argv[3])?;
    let mut with_scores = false;
    let mut offset = 0usize;
    let mut count = usize::MAX;
    let mut i = 4;
    while i < argv.len() {
        match argv[i].to_ascii_uppercase().as_slice() {
            b"WITHSCORES" => with_scores = true,
            b"LIMIT" => {
                let off = parse_i64(argv.get(i + 1).ok_or(CommandError::Syntax)?)?;
                let cnt = parse_i64(argv.get(i + 2).ok_or(CommandError::Syntax)?)?;
                i += 2;
                offset = off.max(0) as usize;
                count = if cnt < 0 { usize::MAX } else { cnt as usize };
            },
            _ => return Err(CommandError::Syntax),
        }
        i += 1;
    }
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let items = read_zset(&mut db, &argv[1], now)?
        .map(|z| z.range_by_score(min, max, offset, count))
        .unwrap_or_default();
    Ok(Some(reply_scored(items, with_scores)))
}

fn zpop(ctx: &mut CommandCtx, argv: &[Bytes], min: bool) -> HandlerReply {
    let count = match argv.get(2) {
        Some(raw) => {
            let n = parse_i64(raw)?;
            if n < 0 {
                return Err(CommandError::OutOfRange(
                    "value is out of range, must be positive",
                ));
            }
            n as usize
        },
        None => 1,
    };
    let now = now_ms();
    let popped = {
        let mut db = ctx.server.db(ctx.db_index());
        let Some(zset) = zset_mut(&mut db, &argv[1], false, now)? else {
            return Ok(Some(Frame::array(Vec::new())));
        };
        let mut popped = Vec::new();
        for _ in 0..count {
            let item = if min { zset.pop_min() } else { zset.pop_max() };
            match item {
                Some(entry) => popped.push(entry),
                None => break,
            }
        }
        db.touch(&argv[1]);
        db.drop_if_drained(&argv[1], now);
        popped
    };
    if !popped.is_empty() {
        let event = if min { "zpopmin" } else { "zpopmax" };
        ctx.server.notify(ctx.db_index(), &argv[1], event);
    }
    Ok(Some(reply_scored(popped, true)))
}

pub fn zpopmin(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    zpop(ctx, argv, true)
}

pub fn zpopmax(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    zpop(ctx, argv, false)
}

pub fn zremrangebyrank(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let start = parse_i64(&argv[2])?;
    let stop = parse_i64(&argv[3])?;
    let now = now_ms();
    let removed = {
        let mut db = ctx.server.db(ctx.db_index());
        let Some(zset) = zset_mut(&mut db, &argv[1], false, now)? else {
            return Ok(Some(Frame::Integer(0)));
        };
        let removed = match crate::commands::resolve_range(start, stop, zset.len()) {
            Some((s, e)) => zset.remove_range_by_rank(s, e),
            None => 0,
        };
        db.touch(&argv[1]);
        db.drop_if_drained(&argv[1], now);
        removed
    };
    Ok(Some(Frame::Integer(removed as i64)))
}

pub fn zremrangebyscore(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let min = parse_score_bound(&argv[2])?;
    let max = parse_score_bound(&argv[3])?;
    let now = now_ms();
    let removed = {
        let mut db = ctx.server.db(ctx.db_index());
        let Some(zset) = zset_mut(&mut db, &argv[1], false, now)? else {
            return Ok(Some(Frame::Integer(0)));
        };
        let removed = zset.remove_range_by_score(min, max);
        db.touch(&argv[1]);
        db.drop_if_drained(&argv[1], now);
        removed
    };
    Ok(Some(Frame::Integer(removed as i64)))
}

pub fn zscan(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let _cursor = crate::commands::parse_u64(&argv[2])?;
    let (pattern, _) = crate::commands::hashes::scan_options(&argv[3..])?;
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let mut frames = Vec::new();
    if let Some(zset) = read_zset(&mut db, &argv[1], now)? {
        for (member, score) in zset.iter() {
            if let Some(p) = &pattern
                && !crate::storage::glob::glob_match(p, member)
            {
                continue;
            }
            frames.push(Frame::bulk(member.clone()));
            frames.push(Frame::bulk(Bytes::from(format_f64(score))));
        }
    }
    Ok(Some(Frame::array(vec![
        Frame::bulk_from_str("0"),
        Frame::array(frames),
    ])))
}

// ── blocking pops ─────────────────────────────────────────────────────

fn try_zpop_first(
    ctx: &mut CommandCtx,
    keys: &[Bytes],
    min: bool,
) -> CommandResult<Option<(Bytes, Bytes, f64)>> {
    let now = now_ms();
    for key in keys {
        let popped = {
            let mut db = ctx.server.db(ctx.db_index());
            let Some(zset) = zset_mut(&mut db, key, false, now)? else {
                continue;
            };
            let item = if min { zset.pop_min() } else { zset.pop_max() };
            let Some((member, score)) = item else { continue };
            db.touch(key);
            db.drop_if_drained(key, now);
            (member, score)
        };
        ctx.server
            .notify(ctx.db_index(), key, if min { "zpopmin" } else { "zpopmax" });
        return Ok(Some((key.clone(), popped.0, popped.1)));
    }
    Ok(None)
}

async fn block_zpop(
    ctx: &mut CommandCtx<'_>,
    argv: Vec<Bytes>,
    min: bool,
) -> HandlerReply {
    let timeout: Option<Duration> = parse_block_timeout(&argv[argv.len() - 1])?;
    let keys: Vec<Bytes> = argv[1..argv.len() - 1].to_vec();
    let deadline = timeout.map(|d| Instant::now() + d);

    loop {
        if let Some((key, member, score)) = try_zpop_first(ctx, &keys, min)? {
            return Ok(Some(Frame::array(vec![
                Frame::bulk(key),
                Frame::bulk(member),
                Frame::bulk(Bytes::from(format_f64(score))),
            ])));
        }
        if !ctx.allow_block {
            return Ok(Some(Frame::null_array()));
        }
        let remaining = match deadline {
            Some(at) => {
                let left = at.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return Ok(Some(Frame::null_array()));
                }
                Some(left)
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
                TypeTag::ZSet,
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

pub fn bzpopmin<'a, 'b>(
    ctx: &'a mut CommandCtx<'b>,
    argv: Vec<Bytes>,
) -> BoxedReply<'a> {
    Box::pin(block_zpop(ctx, argv, true))
}

pub fn bzpopmax<'a, 'b>(
    ctx: &'a mut CommandCtx<'b>,
    argv: Vec<Bytes>,
) -> BoxedReply<'a> {
    Box::pin(block_zpop(ctx, argv, false))
}
