// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! SUBSCRIBE family and PUBLISH.
//!
//! Subscribe confirmations are pushed one frame per channel, matching the
//! wire shape clients expect; the session mirror of the registration set
//! makes disconnect cleanup a local walk.

use bytes::Bytes;

use crate::{
    commands::{CommandCtx, HandlerReply},
    errors::CommandError,
    resp::Frame,
};

fn sub_reply(kind: &str, channel: &Bytes, count: usize) -> Frame {
    Frame::array(vec![
        Frame::bulk_from_str(kind),
        Frame::bulk(channel.clone()),
        Frame::Integer(count as i64),
    ])
}

fn unsub_reply(kind: &str, channel: Option<&Bytes>, count: usize) -> Frame {
    Frame::array(vec![
        Frame::bulk_from_str(kind),
        channel.map_or(Frame::null(), |c| Frame::bulk(c.clone())),
        Frame::Integer(count as i64),
    ])
}

pub fn subscribe(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let id = ctx.session.client_id();
    for channel in &argv[1..] {
        ctx.server.pubsub.subscribe(channel.clone(), id);
        ctx.session.subs.channels.insert(channel.clone());
        ctx.send(sub_reply("subscribe", channel, ctx.session.subs.count()));
    }
    ctx.session.update_sub_flag();
    Ok(None)
}

pub fn psubscribe(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let id = ctx.session.client_id();
    for pattern in &argv[1..] {
        ctx.server.pubsub.psubscribe(pattern.clone(), id);
        ctx.session.subs.patterns.insert(pattern.clone());
        ctx.send(sub_reply("psubscribe", pattern, ctx.session.subs.count()));
    }
    ctx.session.update_sub_flag();
    Ok(None)
}

pub fn unsubscribe(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let id = ctx.session.client_id();
    let targets: Vec<Bytes> = if argv.len() > 1 {
        argv[1..].to_vec()
    } else {
        ctx.session.subs.channels.iter().cloned().collect()
    };
    if targets.is_empty() {
        ctx.send(unsub_reply("unsubscribe", None, ctx.session.subs.count()));
    }
    for channel in targets {
        ctx.server.pubsub.unsubscribe(&channel, id);
        ctx.session.subs.channels.remove(&channel);
        ctx.send(unsub_reply(
            "unsubscribe",
            Some(&channel),
            ctx.session.subs.count(),
        ));
    }
    ctx.session.update_sub_flag();
    Ok(None)
}

pub fn punsubscribe(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let id = ctx.session.client_id();
    let targets: Vec<Bytes> = if argv.len() > 1 {
        argv[1..].to_vec()
    } else {
        ctx.session.subs.patterns.iter().cloned().collect()
    };
    if targets.is_empty() {
        ctx.send(unsub_reply("punsubscribe", None, ctx.session.subs.count()));
    }
    for pattern in targets {
        ctx.server.pubsub.punsubscribe(&pattern, id);
        ctx.session.subs.patterns.remove(&pattern);
        ctx.send(unsub_reply(
            "punsubscribe",
            Some(&pattern),
            ctx.session.subs.count(),
        ));
    }
    ctx.session.update_sub_flag();
    Ok(None)
}

pub fn publish(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let receivers = ctx
        .server
        .pubsub
        .publish(ctx.registry(), &argv[1], &argv[2]);
    Ok(Some(Frame::Integer(receivers as i64)))
}

pub fn pubsub(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    match argv[1].to_ascii_uppercase().as_slice() {
        b"CHANNELS" => {
            let pattern = argv.get(2).map(|p| p.as_ref());
            let channels = ctx.server.pubsub.active_channels(pattern);
            Ok(Some(crate::commands::bulk_array(channels)))
        },
        b"NUMSUB" => {
            let counts = ctx.server.pubsub.subscriber_counts(&argv[2..]);
            let mut frames = Vec::with_capacity(counts.len() * 2);
            for (channel, n) in counts {
                frames.push(Frame::bulk(channel));
                frames.push(Frame::Integer(n as i64));
            }
            Ok(Some(Frame::array(frames)))
        },
        b"NUMPAT" => Ok(Some(Frame::Integer(
            ctx.server.pubsub.pattern_count() as i64,
        ))),
        other => Err(CommandError::other(format!(
            "Unknown PUBSUB subcommand or wrong number of arguments for '{}'",
            String::from_utf8_lossy(other).to_lowercase()
        ))),
    }
}
