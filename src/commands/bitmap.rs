// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Bit-level access to string values.

use bytes::Bytes;

use crate::{
    commands::{CommandCtx, HandlerReply, parse_i64, strings::read_str},
    errors::CommandError,
    resp::Frame,
    storage::{Value, now_ms},
};

const MAX_BIT_OFFSET: i64 = 4 * 1024 * 1024 * 1024 * 8 - 1;

pub fn setbit(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let offset = parse_i64(&argv[2])?;
    if !(0..=MAX_BIT_OFFSET).contains(&offset) {
        return Err(CommandError::OutOfRange(
            "bit offset is not an integer or out of range",
        ));
    }
    let bit = match parse_i64(&argv[3])? {
        0 => 0u8,
        1 => 1u8,
        _ => {
            return Err(CommandError::OutOfRange(
                "bit is not an integer or out of range",
            ));
        },
    };
    let byte = (offset / 8) as usize;
    let shift = 7 - (offset % 8) as u32;

    let now = now_ms();
    let old = {
        let mut db = ctx.server.db(ctx.db_index());
        let mut data = read_str(&mut db, &argv[1], now)?
            .map(|b| b.to_vec())
            .unwrap_or_default();
        if data.len() <= byte {
            data.resize(byte + 1, 0);
        }
        let old = (data[byte] >> shift) & 1;
        if bit == 1 {
            data[byte] |= 1 << shift;
        } else {
            data[byte] &= !(1 << shift);
        }
        db.set_keep_ttl(argv[1].clone(), Value::Str(Bytes::from(data)));
        old
    };
    ctx.server.notify(ctx.db_index(), &argv[1], "setbit");
    Ok(Some(Frame::Integer(i64::from(old))))
}

pub fn getbit(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let offset = parse_i64(&argv[2])?;
    if !(0..=MAX_BIT_OFFSET).contains(&offset) {
        return Err(CommandError::OutOfRange(
            "bit offset is not an integer or out of range",
        ));
    }
    let byte = (offset / 8) as usize;
    let shift = 7 - (offset % 8) as u32;
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let bit = read_str(&mut db, &argv[1], now)?
        .map_or(0, |data| {
            data.get(byte).map_or(0, |b| (b >> shift) & 1)
        });
    Ok(Some(Frame::Integer(i64::from(bit))))
}

pub fn bitcount(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let Some(data) = read_str(&mut db, &argv[1], now)? else {
        return Ok(Some(Frame::Integer(0)));
    };
    drop(db);

    let (start, stop, bit_granularity) = match argv.len() {
        2 => (0i64, -1i64, false),
        4 | 5 => {
            let start = parse_i64(&argv[2])?;
            let stop = parse_i64(&argv[3])?;
            let bits = match argv.get(4) {
                None => false,
                Some(u) => match u.to_ascii_uppercase().as_slice() {
                    b"BYTE" => false,
                    b"BIT" => true,
                    _ => return Err(CommandError::Syntax),
                },
            };
            (start, stop, bits)
        },
        _ => return Err(CommandError::Syntax),
    };

    let count = if bit_granularity {
        let total_bits = data.len() as i64 * 8;
        let Some((s, e)) = crate::commands::resolve_range(start, stop, total_bits as usize)
        else {
            return Ok(Some(Frame::Integer(0)));
        };
        let mut n = 0i64;
        for bit in s..=e {
            let byte = bit / 8;
            let shift = 7 - (bit % 8) as u32;
            n += i64::from((data[byte] >> shift) & 1);
        }
        n
    } else {
        match crate::commands::resolve_range(start, stop, data.len()) {
            Some((s, e)) => data[s..=e]
                .iter()
                .map(|b| i64::from(b.count_ones()))
                .sum(),
            None => 0,
        }
    };
    Ok(Some(Frame::Integer(count)))
}

pub fn bitop(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let op = argv[1].to_ascii_uppercase();
    let dest = &argv[2];
    let sources = &argv[3..];
    if op.as_slice() == b"NOT" && sources.len() != 1 {
        return Err(CommandError::other(
            "BITOP NOT must be called with a single source key.",
        ));
    }

    let now = now_ms();
    let result_len = {
        let mut db = ctx.server.db(ctx.db_index());
        let mut operands = Vec::with_capacity(sources.len());
        for key in sources {
            operands.push(read_str(&mut db, key, now)?.unwrap_or_default());
        }
        let width = operands.iter().map(Bytes::len).max().unwrap_or(0);

        let result: Vec<u8> = match op.as_slice() {
            b"NOT" => operands[0].iter().map(|b| !b).collect(),
            b"AND" | b"OR" | b"XOR" => {
                let mut out = vec![0u8; width];
                for (i, slot) in out.iter_mut().enumerate() {
                    let mut acc: Option<u8> = None;
                    for operand in &operands {
                        // Shorter operands read as zero-padded.
                        let byte = operand.get(i).copied().unwrap_or(0);
                        acc = Some(match (acc, op.as_slice()) {
                            (None, _) => byte,
                            (Some(a), b"AND") => a & byte,
                            (Some(a), b"OR") => a | byte,
                            (Some(a), _) => a ^ byte,
                        });
                    }
                    *slot = acc.unwrap_or(0);
                }
                out
            },
            _ => return Err(CommandError::Syntax),
        };

        let len = result.len();
        if len == 0 {
            db.remove(dest, now);
        } else {
            db.set(dest.clone(), Value::Str(Bytes::from(result)));
        }
        len
    };
    ctx.server.notify(ctx.db_index(), dest, "set");
    Ok(Some(Frame::Integer(result_len as i64)))
}
