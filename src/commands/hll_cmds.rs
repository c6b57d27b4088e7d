// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! PFADD/PFCOUNT/PFMERGE over the dense HyperLogLog value.

use bytes::Bytes;

use crate::{
    commands::{CommandCtx, HandlerReply},
    errors::{CommandError, CommandResult},
    resp::Frame,
    storage::{Db, Value, hll::HyperLogLog, now_ms},
};

fn read_hll<'a>(
    db: &'a mut Db,
    key: &[u8],
    now: u64,
) -> CommandResult<Option<&'a HyperLogLog>> {
    match db.get(key, now) {
        None => Ok(None),
        Some(Value::Hll(h)) => Ok(Some(h)),
        Some(_) => Err(CommandError::WrongType),
    }
}

fn hll_mut<'a>(
    db: &'a mut Db,
    key: &Bytes,
    now: u64,
) -> CommandResult<&'a mut HyperLogLog> {
    if db.get(key, now).is_none() {
        db.set(key.clone(), Value::Hll(HyperLogLog::new()));
    }
    match db.get_mut(key, now) {
        Some(Value::Hll(h)) => Ok(h),
        Some(_) => Err(CommandError::WrongType),
        None => Err(CommandError::Internal),
    }
}

pub fn pfadd(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let changed = {
        let mut db = ctx.server.db(ctx.db_index());
        let existed = db.exists(&argv[1], now);
        let hll = hll_mut(&mut db, &argv[1], now)?;
        let mut changed = !existed;
        for element in &argv[2..] {
            if hll.add(element) {
                changed = true;
            }
        }
        db.touch(&argv[1]);
        changed
    };
    if changed {
        ctx.server.notify(ctx.db_index(), &argv[1], "pfadd");
    }
    Ok(Some(Frame::from_bool(changed)))
}

pub fn pfcount(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    if argv.len() == 2 {
        let count = read_hll(&mut db, &argv[1], now)?.map_or(0, HyperLogLog::count);
        return Ok(Some(Frame::Integer(count as i64)));
    }
    // Multi-key PFCOUNT merges into a scratch register file.
    let mut merged = HyperLogLog::new();
    for key in &argv[1..] {
        if let Some(hll) = read_hll(&mut db, key, now)? {
            merged.merge(hll);
        }
    }
    Ok(Some(Frame::Integer(merged.count() as i64)))
}

pub fn pfmerge(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    {
        let mut db = ctx.server.db(ctx.db_index());
        let mut merged = HyperLogLog::new();
        if let Some(dst) = read_hll(&mut db, &argv[1], now)? {
            merged.merge(dst);
        }
        for key in &argv[2..] {
            if let Some(hll) = read_hll(&mut db, key, now)? {
                merged.merge(hll);
            }
        }
        db.set_keep_ttl(argv[1].clone(), Value::Hll(merged));
    }
    ctx.server.notify(ctx.db_index(), &argv[1], "pfadd");
    Ok(Some(Frame::ok()))
}
