// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! MULTI/EXEC/DISCARD/WATCH/UNWATCH.
//!
//! WATCH records the key's write version; EXEC aborts when any recorded
//! version moved, which is exactly "some other client wrote the key in
//! between". Queue-time errors poison the transaction and surface as
//! EXECABORT.

use bytes::Bytes;

use crate::{
    commands::{BoxedReply, CommandCtx, HandlerReply, run_command},
    errors::CommandError,
    resp::Frame,
};

pub fn multi(ctx: &mut CommandCtx, _argv: &[Bytes]) -> HandlerReply {
    if ctx.session.in_multi {
        return Err(CommandError::other("MULTI calls can not be nested"));
    }
    ctx.session.begin_multi();
    Ok(Some(Frame::ok()))
}

pub fn discard(ctx: &mut CommandCtx, _argv: &[Bytes]) -> HandlerReply {
    if !ctx.session.in_multi {
        return Err(CommandError::other("DISCARD without MULTI"));
    }
    ctx.session.end_multi();
    Ok(Some(Frame::ok()))
}

pub fn watch(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    if ctx.session.in_multi {
        return Err(CommandError::other("WATCH inside MULTI is not allowed"));
    }
    let db_index = ctx.db_index();
    let db = ctx.server.db(db_index);
    for key in &argv[1..] {
        let version = db.version(key);
        ctx.session.watched.push((db_index, key.clone(), version));
    }
    Ok(Some(Frame::ok()))
}

pub fn unwatch(ctx: &mut CommandCtx, _argv: &[Bytes]) -> HandlerReply {
    ctx.session.watched.clear();
    Ok(Some(Frame::ok()))
}

pub fn exec<'a, 'b>(ctx: &'a mut CommandCtx<'b>, _argv: Vec<Bytes>) -> BoxedReply<'a> {
    Box::pin(async move {
        if !ctx.session.in_multi {
            return Err(CommandError::other("EXEC without MULTI"));
        }
        if ctx.session.dirty_exec {
            ctx.session.end_multi();
            return Err(CommandError::ExecAbort);
        }

        // Watch invalidation: any recorded version that moved aborts.
        let invalidated = ctx.session.watched.iter().any(|(db_index, key, seen)| {
            ctx.server.db(*db_index).version(key) != *seen
        });
        let queued = std::mem::take(&mut ctx.session.queued);
        ctx.session.end_multi();
        if invalidated {
            return Ok(Some(Frame::null_array()));
        }

        // Queued commands run back to back on this session; errors become
        // inline replies and never abort the rest. Blocking verbs degrade
        // to their immediate form.
        let mut replies = Vec::with_capacity(queued.len());
        ctx.allow_block = false;
        for argv in queued {
            let verb = match std::str::from_utf8(&argv[0]) {
                Ok(v) => v.to_ascii_uppercase(),
                Err(_) => {
                    replies.push(Frame::error("ERR unknown command"));
                    continue;
                },
            };
            match run_command(ctx, &verb, argv).await {
                Ok(Some(frame)) => replies.push(frame),
                Ok(None) => replies.push(Frame::ok()),
                Err(e) => replies.push(Frame::error(e.to_string())),
            }
        }
        ctx.allow_block = true;

        Ok(Some(Frame::array(replies)))
    })
}
