// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Set commands.

use std::collections::HashSet;

use bytes::Bytes;

use crate::{
    commands::{CommandCtx, HandlerReply, bulk_array, parse_i64},
    errors::{CommandError, CommandResult},
    resp::Frame,
    storage::{Db, Value, now_ms, set::SetValue},
};

fn read_set<'a>(
    db: &'a mut Db,
    key: &[u8],
    now: u64,
) -> CommandResult<Option<&'a SetValue>> {
    match db.get(key, now) {
        None => Ok(None),
        Some(Value::Set(s)) => Ok(Some(s)),
        Some(_) => Err(CommandError::WrongType),
    }
}

fn set_mut<'a>(
    ctx: &CommandCtx,
    db: &'a mut Db,
    key: &Bytes,
    create: bool,
    now: u64,
) -> CommandResult<Option<&'a mut SetValue>> {
    if db.get(key, now).is_none() {
        if !create {
            return Ok(None);
        }
        let max = ctx.server.cfg.encodings.intset_max_entries;
        db.set(key.clone(), Value::Set(SetValue::new(max)));
    }
    match db.get_mut(key, now) {
        Some(Value::Set(s)) => Ok(Some(s)),
        Some(_) => Err(CommandError::WrongType),
        None => Ok(None),
    }
}

pub fn sadd(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let added = {
        let mut db = ctx.server.db(ctx.db_index());
        let Some(set) = set_mut(ctx, &mut db, &argv[1], true, now)? else {
            return Err(CommandError::Internal);
        };
        let mut added = 0;
        for member in &argv[2..] {
            if set.insert(member) {
                added += 1;
            }
        }
        db.touch(&argv[1]);
        added
    };
    if added > 0 {
        ctx.server.notify(ctx.db_index(), &argv[1], "sadd");
    }
    Ok(Some(Frame::Integer(added)))
}

pub fn srem(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let removed = {
        let mut db = ctx.server.db(ctx.db_index());
        let Some(set) = set_mut(ctx, &mut db, &argv[1], false, now)? else {
            return Ok(Some(Frame::Integer(0)));
        };
        let mut removed = 0;
        for member in &argv[2..] {
            if set.remove(member) {
                removed += 1;
            }
        }
        db.touch(&argv[1]);
        db.drop_if_drained(&argv[1], now);
        removed
    };
    if removed > 0 {
        ctx.server.notify(ctx.db_index(), &argv[1], "srem");
    }
    Ok(Some(Frame::Integer(removed)))
}

pub fn smembers(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let members = read_set(&mut db, &argv[1], now)?
        .map(SetValue::members)
        .unwrap_or_default();
    Ok(Some(bulk_array(members)))
}

pub fn sismember(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let found = read_set(&mut db, &argv[1], now)?
        .is_some_and(|s| s.contains(&argv[2]));
    Ok(Some(Frame::from_bool(found)))
}

pub fn smismember(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let set = read_set(&mut db, &argv[1], now)?;
    let flags = argv[2..]
        .iter()
        .map(|m| Frame::from_bool(set.is_some_and(|s| s.contains(m))))
        .collect();
    Ok(Some(Frame::array(flags)))
}

pub fn scard(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let len = read_set(&mut db, &argv[1], now)?.map_or(0, SetValue::len);
    Ok(Some(Frame::Integer(len as i64)))
}

pub fn spop(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let count = match argv.get(2) {
        Some(raw) => {
            let n = parse_i64(raw)?;
            if n < 0 {
                return Err(CommandError::OutOfRange(
                    "value is out of range, must be positive",
                ));
            }
            Some(n as usize)
        },
        None => None,
    };
    let now = now_ms();
    let popped = {
        let mut db = ctx.server.db(ctx.db_index());
        let Some(set) = set_mut(ctx, &mut db, &argv[1], false, now)? else {
            return Ok(Some(match count {
                Some(_) => Frame::array(Vec::new()),
                None => Frame::null(),
            }));
        };
        let popped = set.pop(count.unwrap_or(1));
        db.touch(&argv[1]);
        db.drop_if_drained(&argv[1], now);
        popped
    };
    if !popped.is_empty() {
        ctx.server.notify(ctx.db_index(), &argv[1], "spop");
    }
    Ok(Some(match count {
        Some(_) => bulk_array(popped),
        None => popped
            .into_iter()
            .next()
            .map_or(Frame::null(), Frame::bulk),
    }))
}

pub fn srandmember(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let count = match argv.get(2) {
        Some(raw) => Some(parse_i64(raw)?),
        None => None,
    };
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let set = read_set(&mut db, &argv[1], now)?;
    Ok(Some(match count {
        None => set
            .and_then(SetValue::random_member)
            .map_or(Frame::null(), Frame::bulk),
        Some(n) => {
            let members = set
                .map(|s| s.random_members(n.unsigned_abs() as usize, n < 0))
                .unwrap_or_default();
            bulk_array(members)
        },
    }))
}

pub fn smove(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let moved = {
        let mut db = ctx.server.db(ctx.db_index());
        // Type-check the destination before popping the member out.
        if let Some(v) = db.get(&argv[2], now)
            && !matches!(v, Value::Set(_))
        {
            return Err(CommandError::WrongType);
        }
        let Some(src) = set_mut(ctx, &mut db, &argv[1], false, now)? else {
            return Ok(Some(Frame::Integer(0)));
        };
        if !src.remove(&argv[3]) {
            return Ok(Some(Frame::Integer(0)));
        }
        db.touch(&argv[1]);
        db.drop_if_drained(&argv[1], now);
        let Some(dst) = set_mut(ctx, &mut db, &argv[2], true, now)? else {
            return Err(CommandError::Internal);
        };
        dst.insert(&argv[3]);
        db.touch(&argv[2]);
        true
    };
    if moved {
        ctx.server.notify(ctx.db_index(), &argv[1], "srem");
        ctx.server.notify(ctx.db_index(), &argv[2], "sadd");
    }
    Ok(Some(Frame::from_bool(moved)))
}

fn collect_sets(
    ctx: &mut CommandCtx,
    keys: &[Bytes],
) -> CommandResult<Vec<HashSet<Bytes>>> {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    keys.iter()
        .map(|key| {
            Ok(read_set(&mut db, key, now)?
                .map(|s| s.members().into_iter().collect::<HashSet<_>>())
                .unwrap_or_default())
        })
        .collect()
}

fn sorted(mut members: Vec<Bytes>) -> Vec<Bytes> {
    members.sort();
    members
}

pub fn sunion(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let sets = collect_sets(ctx, &argv[1..])?;
    let mut union = HashSet::new();
    for set in sets {
        union.extend(set);
    }
    Ok(Some(bulk_array(sorted(union.into_iter().collect()))))
}

pub fn sinter(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let mut sets = collect_sets(ctx, &argv[1..])?;
    let Some(mut acc) = sets.pop() else {
        return Ok(Some(Frame::array(Vec::new())));
    };
    for set in &sets {
        acc.retain(|m| set.contains(m));
    }
    Ok(Some(bulk_array(sorted(acc.into_iter().collect()))))
}

pub fn sdiff(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let sets = collect_sets(ctx, &argv[1..])?;
    let mut iter = sets.into_iter();
    let Some(mut acc) = iter.next() else {
        return Ok(Some(Frame::array(Vec::new())));
    };
    for set in iter {
        acc.retain(|m| !set.contains(m));
    }
    Ok(Some(bulk_array(sorted(acc.into_iter().collect()))))
}

pub fn sintercard(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let numkeys = parse_i64(&argv[1])?;
    if numkeys <= 0 {
        return Err(CommandError::other(
            "numkeys should be greater than 0",
        ));
    }
    let numkeys = numkeys as usize;
    if argv.len() < 2 + numkeys {
        return Err(CommandError::Syntax);
    }
    let keys = &argv[2..2 + numkeys];
    let rest = &argv[2 + numkeys..];
    let mut limit = usize::MAX;
    match rest {
        [] => {},
        [tok, n] if tok.eq_ignore_ascii_case(b"LIMIT") => {
            let v = parse_i64(n)?;
            if v < 0 {
                return Err(CommandError::other("LIMIT can't be negative"));
            }
            if v > 0 {
                limit = v as usize;
            }
        },
        _ => return Err(CommandError::Syntax),
    }

    let mut sets = collect_sets(ctx, keys)?;
    let Some(mut acc) = sets.pop() else {
        return Ok(Some(Frame::Integer(0)));
    };
    for set in &sets {
        acc.retain(|m| set.contains(m));
    }
    Ok(Some(Frame::Integer(acc.len().min(limit) as i64)))
}

pub fn sscan(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let _cursor = crate::commands::parse_u64(&argv[2])?;
    let (pattern, _) = crate::commands::hashes::scan_options(&argv[3..])?;
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let mut members = read_set(&mut db, &argv[1], now)?
        .map(SetValue::members)
        .unwrap_or_default();
    if let Some(p) = pattern {
        members.retain(|m| crate::storage::glob::glob_match(&p, m));
    }
    Ok(Some(Frame::array(vec![
        Frame::bulk_from_str("0"),
        bulk_array(members),
    ])))
}
