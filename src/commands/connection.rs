// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Connection-scoped verbs: PING, ECHO, SELECT, AUTH, CLIENT, RESET.

use std::fmt::Write as _;
use std::sync::atomic::Ordering;

use bytes::Bytes;

use crate::{
    commands::{CommandCtx, HandlerReply, parse_i64},
    errors::CommandError,
    resp::Frame,
    server::client::{ClientFlags, ClientRegistry},
    storage::now_ms,
};

pub fn ping(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    if argv.len() > 2 {
        return Err(CommandError::WrongArity("ping".into()));
    }
    let payload = argv.get(1).cloned();
    if ctx.session.subs.is_subscribed() {
        // Inside subscribe mode PING answers as a push-shaped array.
        return Ok(Some(Frame::array(vec![
            Frame::bulk_from_str("pong"),
            payload.map_or_else(|| Frame::bulk(Bytes::new()), Frame::bulk),
        ])));
    }
    Ok(Some(match payload {
        Some(msg) => Frame::bulk(msg),
        None => Frame::simple("PONG"),
    }))
}

pub fn echo(_ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    Ok(Some(Frame::bulk(argv[1].clone())))
}

pub fn select(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let index = parse_i64(&argv[1])?;
    if index < 0 || index as usize >= ctx.server.db_count() {
        return Err(CommandError::other("DB index is out of range"));
    }
    let cluster_enabled = ctx
        .server
        .cluster
        .read()
        .map(|c| c.is_enabled())
        .unwrap_or(false);
    if cluster_enabled && index != 0 {
        return Err(CommandError::other(
            "SELECT is not allowed in cluster mode",
        ));
    }
    ctx.session.db_index = index as usize;
    ctx.session
        .shared
        .db_index
        .store(index as usize, Ordering::Relaxed);
    Ok(Some(Frame::ok()))
}

pub fn quit(ctx: &mut CommandCtx, _argv: &[Bytes]) -> HandlerReply {
    ctx.session.should_close = true;
    Ok(Some(Frame::ok()))
}

pub fn auth(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let Some(expected) = &ctx.server.cfg.requirepass else {
        return Err(CommandError::other(
            "Client sent AUTH, but no password is set. Did you mean AUTH <username> <password>?",
        ));
    };
    if expected.as_bytes() == &argv[1][..] {
        ctx.session.authenticated = true;
        Ok(Some(Frame::ok()))
    } else {
        Err(CommandError::other("invalid password"))
    }
}

pub fn reset(ctx: &mut CommandCtx, _argv: &[Bytes]) -> HandlerReply {
    let id = ctx.session.client_id();
    ctx.server.pubsub.drop_client(id, &ctx.session.subs);
    ctx.session.subs.channels.clear();
    ctx.session.subs.patterns.clear();
    ctx.session.update_sub_flag();
    ctx.session.end_multi();
    ctx.session.db_index = 0;
    ctx.session.authenticated = ctx.server.cfg.requirepass.is_none();
    Ok(Some(Frame::simple("RESET")))
}

fn flags_char(flags: ClientFlags) -> String {
    let mut out = String::new();
    if flags.contains(ClientFlags::BLOCKED) {
        out.push('b');
    }
    if flags.contains(ClientFlags::IN_MULTI) {
        out.push('x');
    }
    if flags.contains(ClientFlags::SUBSCRIBED) {
        out.push('P');
    }
    if out.is_empty() {
        out.push('N');
    }
    out
}

pub fn client(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    match argv[1].to_ascii_uppercase().as_slice() {
        b"ID" => Ok(Some(Frame::Integer(ctx.session.client_id() as i64))),
        b"GETNAME" => {
            let name = ClientRegistry::name_of(&ctx.session.shared);
            Ok(Some(Frame::bulk(Bytes::from(name))))
        },
        b"SETNAME" => {
            let raw = argv.get(2).ok_or(CommandError::Syntax)?;
            let name = std::str::from_utf8(raw)
                .map_err(|_| {
                    CommandError::other(
                        "Client names cannot contain spaces, newlines or special characters.",
                    )
                })?
                .to_string();
            if name.contains([' ', '\n', '\r']) {
                return Err(CommandError::other(
                    "Client names cannot contain spaces, newlines or special characters.",
                ));
            }
            if let Ok(mut slot) = ctx.session.shared.name.lock() {
                *slot = name;
            }
            Ok(Some(Frame::ok()))
        },
        b"LIST" => {
            let now = now_ms();
            let mut out = String::new();
            for client in ctx.registry().iter_snapshot() {
                let flags = client
                    .flags
                    .lock()
                    .map(|f| *f)
                    .unwrap_or(ClientFlags::empty());
                let _ = writeln!(
                    out,
                    "id={} addr={} name={} age={} idle={} flags={} db={} multi={}",
                    client.id,
                    client.addr,
                    ClientRegistry::name_of(&client),
                    now.saturating_sub(client.connected_at_ms) / 1000,
                    now.saturating_sub(
                        client.last_interaction_ms.load(Ordering::Relaxed)
                    ) / 1000,
                    flags_char(flags),
                    client.db_index.load(Ordering::Relaxed),
                    if flags.contains(ClientFlags::IN_MULTI) { 0 } else { -1 },
                );
            }
            Ok(Some(Frame::bulk(Bytes::from(out))))
        },
        b"KILL" => {
            // Legacy form: CLIENT KILL addr:port. Filter form: ID <id> /
            // ADDR <addr>.
            let killed = match argv.len() {
                3 => {
                    let addr = String::from_utf8_lossy(&argv[2]).into_owned();
                    let n = ctx.registry().kill_matching(Some(&addr), None);
                    if n == 0 {
                        return Err(CommandError::other("No such client"));
                    }
                    return Ok(Some(Frame::ok()));
                },
                4 => match argv[2].to_ascii_uppercase().as_slice() {
                    b"ID" => {
                        let id = parse_i64(&argv[3])?;
                        ctx.registry().kill_matching(None, Some(id.max(0) as u64))
                    },
                    b"ADDR" => {
                        let addr = String::from_utf8_lossy(&argv[3]).into_owned();
                        ctx.registry().kill_matching(Some(&addr), None)
                    },
                    _ => return Err(CommandError::Syntax),
                },
                _ => return Err(CommandError::Syntax),
            };
            Ok(Some(Frame::Integer(killed as i64)))
        },
        other => Err(CommandError::other(format!(
            "Unknown CLIENT subcommand or wrong number of arguments for '{}'",
            String::from_utf8_lossy(other).to_lowercase()
        ))),
    }
}
