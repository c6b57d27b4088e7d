// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Stream commands: append, range reads, consumer groups, claims.

use bytes::Bytes;
use tokio::time::Instant;

use crate::{
    commands::{BoxedReply, CommandCtx, HandlerReply, parse_i64, parse_u64},
    errors::{CommandError, CommandResult},
    resp::Frame,
    server::client::ClientFlags,
    storage::{
        Db, TypeTag, Value, now_ms,
        stream::{EntryFields, Stream, StreamId},
    },
};

fn read_stream<'a>(
    db: &'a mut Db,
    key: &[u8],
    now: u64,
) -> CommandResult<Option<&'a Stream>> {
    match db.get(key, now) {
        None => Ok(None),
        Some(Value::Stream(s)) => Ok(Some(s)),
        Some(_) => Err(CommandError::WrongType),
    }
}

fn stream_mut<'a>(
    db: &'a mut Db,
    key: &Bytes,
    create: bool,
    now: u64,
) -> CommandResult<Option<&'a mut Stream>> {
    if db.get(key, now).is_none() {
        if !create {
            return Ok(None);
        }
        db.set(key.clone(), Value::Stream(Stream::new()));
    }
    match db.get_mut(key, now) {
        Some(Value::Stream(s)) => Ok(Some(s)),
        Some(_) => Err(CommandError::WrongType),
        None => Ok(None),
    }
}

fn bad_id() -> CommandError {
    CommandError::other("Invalid stream ID specified as stream command argument")
}

/// Full or ms-only id; `default_seq` fills a missing sequence part.
fn parse_id(arg: &[u8], default_seq: u64) -> CommandResult<StreamId> {
    let s = std::str::from_utf8(arg).map_err(|_| bad_id())?;
    match s.split_once('-') {
        None => {
            let ms = s.parse::<u64>().map_err(|_| bad_id())?;
            Ok(StreamId::new(ms, default_seq))
        },
        Some((ms, seq)) => {
            let ms = ms.parse::<u64>().map_err(|_| bad_id())?;
            let seq = seq.parse::<u64>().map_err(|_| bad_id())?;
            Ok(StreamId::new(ms, seq))
        },
    }
}

/// Range edge with `-`/`+` wildcards.
fn parse_range_id(arg: &[u8], default_seq: u64) -> CommandResult<StreamId> {
    match arg {
        b"-" => Ok(StreamId::MIN),
        b"+" => Ok(StreamId::MAX),
        other => parse_id(other, default_seq),
    }
}

fn id_frame(id: StreamId) -> Frame {
    Frame::bulk(Bytes::from(id.to_string()))
}

fn entry_frame(id: StreamId, fields: &EntryFields) -> Frame {
    let mut flat = Vec::with_capacity(fields.len() * 2);
    for (f, v) in fields {
        flat.push(Frame::bulk(f.clone()));
        flat.push(Frame::bulk(v.clone()));
    }
    Frame::array(vec![id_frame(id), Frame::array(flat)])
}

fn entries_frame(entries: &[(StreamId, EntryFields)]) -> Frame {
    Frame::array(
        entries
            .iter()
            .map(|(id, fields)| entry_frame(*id, fields))
            .collect(),
    )
}

struct TrimSpec {
    maxlen: usize,
    approximate: bool,
}

/// `MAXLEN [~|=] n`; returns the spec and how many args were consumed.
fn parse_trim(args: &[Bytes]) -> CommandResult<(TrimSpec, usize)> {
    let mut used = 1;
    let mut approximate = false;
    let mut idx = 1;
    match args.get(idx).map(|a| a.as_ref()) {
        Some(b"~") => {
            approximate = true;
            idx += 1;
            used += 1;
        },
        Some(b"=") => {
            idx += 1;
            used += 1;
        },
        _ => {},
    }
    let n = parse_i64(args.get(idx).ok_or(CommandError::Syntax)?)?;
    if n < 0 {
        return Err(CommandError::other("MAXLEN argument must be >= 0"));
    }
    used += 1;
    Ok((TrimSpec { maxlen: n as usize, approximate }, used))
}

pub fn xadd(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let mut i = 2;
    let mut nomkstream = false;
    let mut trim: Option<TrimSpec> = None;
    loop {
        let Some(arg) = argv.get(i) else {
            return Err(CommandError::WrongArity("xadd".into()));
        };
        match arg.to_ascii_uppercase().as_slice() {
            b"NOMKSTREAM" => {
                nomkstream = true;
                i += 1;
            },
            b"MAXLEN" => {
                let (spec, used) = parse_trim(&argv[i..])?;
                trim = Some(spec);
                i += used;
            },
            _ => break,
        }
    }

    let id_arg = &argv[i];
    let id_hint: Option<(u64, Option<u64>)> = if id_arg.as_ref() == b"*" {
        None
    } else if let Some(ms_part) = id_arg.strip_suffix(b"-*") {
        let ms = std::str::from_utf8(ms_part)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(bad_id)?;
        Some((ms, None))
    } else {
        let id = parse_id(id_arg, 0)?;
        Some((id.ms, Some(id.seq)))
    };
    i += 1;

    let field_args = &argv[i..];
    if field_args.is_empty() || field_args.len() % 2 != 0 {
        return Err(CommandError::WrongArity("xadd".into()));
    }
    let fields: EntryFields = field_args
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect();

    let now = now_ms();
    let id = {
        let mut db = ctx.server.db(ctx.db_index());
        let Some(stream) = stream_mut(&mut db, &argv[1], !nomkstream, now)? else {
            return Ok(Some(Frame::null()));
        };
        let id = stream.add(id_hint, fields, now).map_err(|_| {
            CommandError::other(
                "The ID specified in XADD is equal or smaller than the target stream top item",
            )
        })?;
        if let Some(spec) = trim {
            stream.trim_maxlen(spec.maxlen, spec.approximate);
        }
        db.touch(&argv[1]);
        id
    };
    ctx.server.notify(ctx.db_index(), &argv[1], "xadd");
    ctx.server
        .blocking
        .signal_key_ready(ctx.db_index(), &argv[1], TypeTag::Stream, 1);
    Ok(Some(id_frame(id)))
}

pub fn xrange(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let start = parse_range_id(&argv[2], 0)?;
    let end = parse_range_id(&argv[3], u64::MAX)?;
    let count = match argv.get(4) {
        Some(tok) if tok.eq_ignore_ascii_case(b"COUNT") => {
            parse_u64(argv.get(5).ok_or(CommandError::Syntax)?)? as usize
        },
        Some(_) => return Err(CommandError::Syntax),
        None => usize::MAX,
    };
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let entries = read_stream(&mut db, &argv[1], now)?
        .map(|s| s.range(start, end, count))
        .unwrap_or_default();
    Ok(Some(entries_frame(&entries)))
}

pub fn xlen(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let len = read_stream(&mut db, &argv[1], now)?.map_or(0, Stream::len);
    Ok(Some(Frame::Integer(len as i64)))
}

pub fn xdel(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let ids = argv[2..]
        .iter()
        .map(|a| parse_id(a, 0))
        .collect::<CommandResult<Vec<_>>>()?;
    let now = now_ms();
    let removed = {
        let mut db = ctx.server.db(ctx.db_index());
        let Some(stream) = stream_mut(&mut db, &argv[1], false, now)? else {
            return Ok(Some(Frame::Integer(0)));
        };
        let removed = stream.delete(&ids);
        db.touch(&argv[1]);
        removed
    };
    Ok(Some(Frame::Integer(removed as i64)))
}

pub fn xtrim(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    if !argv[2].eq_ignore_ascii_case(b"MAXLEN") {
        return Err(CommandError::Syntax);
    }
    let (spec, used) = parse_trim(&argv[2..])?;
    if 2 + used != argv.len() {
        return Err(CommandError::Syntax);
    }
    let now = now_ms();
    let removed = {
        let mut db = ctx.server.db(ctx.db_index());
        let Some(stream) = stream_mut(&mut db, &argv[1], false, now)? else {
            return Ok(Some(Frame::Integer(0)));
        };
        let removed = stream.trim_maxlen(spec.maxlen, spec.approximate);
        db.touch(&argv[1]);
        removed
    };
    Ok(Some(Frame::Integer(removed as i64)))
}

pub fn xsetid(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let id = parse_id(&argv[2], 0)?;
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let Some(stream) = stream_mut(&mut db, &argv[1], false, now)? else {
        return Err(CommandError::other(
            "The XSETID command requires the key to exist.",
        ));
    };
    if !stream.set_last_id(id) {
        return Err(CommandError::other(
            "The ID specified in XSETID is smaller than the target stream top item",
        ));
    }
    db.touch(&argv[1]);
    Ok(Some(Frame::ok()))
}

// ── XREAD ─────────────────────────────────────────────────────────────

struct ReadSpec {
    count: usize,
    block_ms: Option<u64>,
    keys: Vec<Bytes>,
    ids: Vec<Bytes>,
}

fn parse_read_spec(argv: &[Bytes], start_at: usize) -> CommandResult<ReadSpec> {
    let mut count = usize::MAX;
    let mut block_ms = None;
    let mut i = start_at;
    loop {
        let Some(arg) = argv.get(i) else {
            return Err(CommandError::Syntax);
        };
        match arg.to_ascii_uppercase().as_slice() {
            b"COUNT" => {
                i += 1;
                count = parse_u64(argv.get(i).ok_or(CommandError::Syntax)?)? as usize;
                i += 1;
            },
            b"BLOCK" => {
                i += 1;
                block_ms =
                    Some(parse_u64(argv.get(i).ok_or(CommandError::Syntax)?)?);
                i += 1;
            },
            b"STREAMS" => {
                i += 1;
                break;
            },
            _ => return Err(CommandError::Syntax),
        }
    }
    let rest = &argv[i..];
    if rest.is_empty() || rest.len() % 2 != 0 {
        return Err(CommandError::other(
            "Unbalanced XREAD list of streams: for each stream key an ID or '$' must be specified.",
        ));
    }
    let half = rest.len() / 2;
    Ok(ReadSpec {
        count,
        block_ms,
        keys: rest[..half].to_vec(),
        ids: rest[half..].to_vec(),
    })
}

/// Resolves `$` against the stream's current last id, so a blocking read
/// only sees entries appended after the call.
fn resolve_read_ids(
    ctx: &mut CommandCtx,
    spec: &ReadSpec,
) -> CommandResult<Vec<StreamId>> {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    spec.keys
        .iter()
        .zip(&spec.ids)
        .map(|(key, id)| {
            if id.as_ref() == b"$" {
                Ok(read_stream(&mut db, key, now)?
                    .map_or(StreamId::MIN, |s| s.last_id))
            } else {
                parse_id(id, 0)
            }
        })
        .collect()
}

type KeyedEntries = Vec<(Bytes, Vec<(StreamId, EntryFields)>)>;

fn collect_reads(
    ctx: &mut CommandCtx,
    keys: &[Bytes],
    after: &[StreamId],
    count: usize,
) -> CommandResult<KeyedEntries> {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let mut out = Vec::new();
    for (key, &from) in keys.iter().zip(after) {
        if let Some(stream) = read_stream(&mut db, key, now)? {
            let entries = stream.read_after(from, count);
            if !entries.is_empty() {
                out.push((key.clone(), entries));
            }
        }
    }
    Ok(out)
}

fn reads_frame(reads: KeyedEntries) -> Frame {
    Frame::array(
        reads
            .into_iter()
            .map(|(key, entries)| {
                Frame::array(vec![Frame::bulk(key), entries_frame(&entries)])
            })
            .collect(),
    )
}

pub fn xread<'a, 'b>(ctx: &'a mut CommandCtx<'b>, argv: Vec<Bytes>) -> BoxedReply<'a> {
    Box::pin(async move {
        let spec = parse_read_spec(&argv, 1)?;
        let after = resolve_read_ids(ctx, &spec)?;
        let deadline = spec.block_ms.map(|ms| {
            (ms == 0, Instant::now() + std::time::Duration::from_millis(ms))
        });

        loop {
            let reads = collect_reads(ctx, &spec.keys, &after, spec.count)?;
            if !reads.is_empty() {
                return Ok(Some(reads_frame(reads)));
            }
            let Some((forever, at)) = deadline else {
                return Ok(Some(Frame::null_array()));
            };
            if !ctx.allow_block {
                return Ok(Some(Frame::null_array()));
            }
            let remaining = if forever {
                None
            } else {
                let left = at.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return Ok(Some(Frame::null_array()));
                }
                Some(left)
            };
            ctx.session.shared.set_flag(ClientFlags::BLOCKED, true);
            let woke = ctx
                .server
                .blocking
                .wait_ready(
                    ctx.db_index(),
                    &spec.keys,
                    TypeTag::Stream,
                    ctx.session.client_id(),
                    remaining,
                )
                .await;
            ctx.session.shared.set_flag(ClientFlags::BLOCKED, false);
            if !woke {
                return Ok(Some(Frame::null_array()));
            }
        }
    })
}

// ── consumer groups ───────────────────────────────────────────────────

pub fn xgroup(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let sub = argv[1].to_ascii_uppercase();
    let now = now_ms();
    match sub.as_slice() {
        b"CREATE" => {
            if argv.len() < 5 {
                return Err(CommandError::WrongArity("xgroup".into()));
            }
            let mkstream = argv
                .get(5)
                .is_some_and(|a| a.eq_ignore_ascii_case(b"MKSTREAM"));
            let mut db = ctx.server.db(ctx.db_index());
            let Some(stream) = stream_mut(&mut db, &argv[2], mkstream, now)? else {
                return Err(CommandError::other(
                    "The XGROUP subcommand requires the key to exist. Note that for CREATE you may want to use the MKSTREAM option to create an empty stream automatically.",
                ));
            };
            let start = if argv[4].as_ref() == b"$" {
                stream.last_id
            } else {
                parse_id(&argv[4], 0)?
            };
            if !stream.create_group(argv[3].clone(), start) {
                return Err(CommandError::BusyGroup);
            }
            db.touch(&argv[2]);
            Ok(Some(Frame::ok()))
        },
        b"DESTROY" => {
            if argv.len() != 4 {
                return Err(CommandError::WrongArity("xgroup".into()));
            }
            let mut db = ctx.server.db(ctx.db_index());
            let Some(stream) = stream_mut(&mut db, &argv[2], false, now)? else {
                return Ok(Some(Frame::Integer(0)));
            };
            let destroyed = stream.destroy_group(&argv[3]);
            db.touch(&argv[2]);
            Ok(Some(Frame::from_bool(destroyed)))
        },
        other => Err(CommandError::other(format!(
            "Unknown XGROUP subcommand or wrong number of arguments for '{}'",
            String::from_utf8_lossy(other).to_lowercase()
        ))),
    }
}

pub fn xreadgroup(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    if !argv[1].eq_ignore_ascii_case(b"GROUP") {
        return Err(CommandError::Syntax);
    }
    let group = argv[2].clone();
    let consumer = argv[3].clone();
    let spec = parse_read_spec(argv, 4)?;
    let now = now_ms();

    let mut out = Vec::new();
    {
        let mut db = ctx.server.db(ctx.db_index());
        for (key, id) in spec.keys.iter().zip(&spec.ids) {
            let Some(stream) = stream_mut(&mut db, key, false, now)? else {
                return Err(CommandError::NoGroup {
                    group: String::from_utf8_lossy(&group).into_owned(),
                    key: String::from_utf8_lossy(key).into_owned(),
                });
            };
            if id.as_ref() == b">" {
                let Some(entries) =
                    stream.read_group(&group, &consumer, spec.count, now)
                else {
                    return Err(CommandError::NoGroup {
                        group: String::from_utf8_lossy(&group).into_owned(),
                        key: String::from_utf8_lossy(key).into_owned(),
                    });
                };
                if !entries.is_empty() {
                    out.push((key.clone(), entries));
                }
            } else {
                // Replay this consumer's pending entries after the id.
                let from = parse_id(id, 0)?;
                let Some(g) = stream.group(&group) else {
                    return Err(CommandError::NoGroup {
                        group: String::from_utf8_lossy(&group).into_owned(),
                        key: String::from_utf8_lossy(key).into_owned(),
                    });
                };
                let ids: Vec<StreamId> = g
                    .consumers
                    .get(&consumer)
                    .map(|c| {
                        c.ids
                            .iter()
                            .filter(|&&i| i >= from)
                            .take(spec.count)
                            .copied()
                            .collect()
                    })
                    .unwrap_or_default();
                let entries: Vec<(StreamId, EntryFields)> = ids
                    .into_iter()
                    .map(|i| {
                        (i, stream.get(i).cloned().unwrap_or_default())
                    })
                    .collect();
                out.push((key.clone(), entries));
            }
            db.touch(key);
        }
    }
    if out.is_empty() {
        return Ok(Some(Frame::null_array()));
    }
    Ok(Some(reads_frame(out)))
}

pub fn xack(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let ids = argv[3..]
        .iter()
        .map(|a| parse_id(a, 0))
        .collect::<CommandResult<Vec<_>>>()?;
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let Some(stream) = stream_mut(&mut db, &argv[1], false, now)? else {
        return Ok(Some(Frame::Integer(0)));
    };
    let acked = stream.ack(&argv[2], &ids).unwrap_or(0);
    db.touch(&argv[1]);
    Ok(Some(Frame::Integer(acked as i64)))
}

pub fn xclaim(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let group = argv[2].clone();
    let consumer = argv[3].clone();
    let min_idle = parse_u64(&argv[4])?;
    let mut ids = Vec::new();
    let mut justid = false;
    for arg in &argv[5..] {
        if arg.eq_ignore_ascii_case(b"JUSTID") {
            justid = true;
        } else {
            ids.push(parse_id(arg, 0)?);
        }
    }
    if ids.is_empty() {
        return Err(CommandError::Syntax);
    }

    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let Some(stream) = stream_mut(&mut db, &argv[1], false, now)? else {
        return Err(CommandError::NoGroup {
            group: String::from_utf8_lossy(&group).into_owned(),
            key: String::from_utf8_lossy(&argv[1]).into_owned(),
        });
    };
    let Some(claimed) = stream.claim(&group, &consumer, &ids, min_idle, now) else {
        return Err(CommandError::NoGroup {
            group: String::from_utf8_lossy(&group).into_owned(),
            key: String::from_utf8_lossy(&argv[1]).into_owned(),
        });
    };
    let reply = if justid {
        Frame::array(claimed.into_iter().map(id_frame).collect())
    } else {
        let entries: Vec<(StreamId, EntryFields)> = claimed
            .into_iter()
            .filter_map(|id| stream.get(id).map(|f| (id, f.clone())))
            .collect();
        entries_frame(&entries)
    };
    db.touch(&argv[1]);
    Ok(Some(reply))
}

pub fn xpending(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let Some(stream) = read_stream(&mut db, &argv[1], now)? else {
        return Err(CommandError::NoGroup {
            group: String::from_utf8_lossy(&argv[2]).into_owned(),
            key: String::from_utf8_lossy(&argv[1]).into_owned(),
        });
    };

    if argv.len() == 3 {
        // Summary form.
        let Some((total, min, max, per_consumer)) = stream.pending_summary(&argv[2])
        else {
            return Err(CommandError::NoGroup {
                group: String::from_utf8_lossy(&argv[2]).into_owned(),
                key: String::from_utf8_lossy(&argv[1]).into_owned(),
            });
        };
        let consumers = Frame::array(
            per_consumer
                .into_iter()
                .map(|(name, n)| {
                    Frame::array(vec![
                        Frame::bulk(name),
                        Frame::bulk(Bytes::from(n.to_string())),
                    ])
                })
                .collect(),
        );
        return Ok(Some(Frame::array(vec![
            Frame::Integer(total as i64),
            min.map_or(Frame::null(), id_frame),
            max.map_or(Frame::null(), id_frame),
            consumers,
        ])));
    }

    // Detail form: start end count [consumer].
    if argv.len() < 6 {
        return Err(CommandError::Syntax);
    }
    let start = parse_range_id(&argv[3], 0)?;
    let end = parse_range_id(&argv[4], u64::MAX)?;
    let count = parse_u64(&argv[5])? as usize;
    let consumer = argv.get(6).map(|c| c.as_ref());
    let Some(rows) =
        stream.pending_detail(&argv[2], start, end, count, consumer, now)
    else {
        return Err(CommandError::NoGroup {
            group: String::from_utf8_lossy(&argv[2]).into_owned(),
            key: String::from_utf8_lossy(&argv[1]).into_owned(),
        });
    };
    Ok(Some(Frame::array(
        rows.into_iter()
            .map(|(id, owner, idle, deliveries)| {
                Frame::array(vec![
                    id_frame(id),
                    Frame::bulk(owner),
                    Frame::Integer(idle as i64),
                    Frame::Integer(deliveries as i64),
                ])
            })
            .collect(),
    )))
}

pub fn xinfo(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let sub = argv[1].to_ascii_uppercase();
    let key = argv.get(2).ok_or(CommandError::Syntax)?;
    let now = now_ms();
    let mut db = ctx.server.db(ctx.db_index());
    let Some(stream) = read_stream(&mut db, key, now)? else {
        return Err(CommandError::NoSuchKey);
    };
    match sub.as_slice() {
        b"STREAM" => {
            let first = stream.first_id().map(|id| {
                stream
                    .get(id)
                    .map(|f| entry_frame(id, f))
                    .unwrap_or_else(Frame::null)
            });
            let last = stream.last_entry_id().map(|id| {
                stream
                    .get(id)
                    .map(|f| entry_frame(id, f))
                    .unwrap_or_else(Frame::null)
            });
            Ok(Some(Frame::array(vec![
                Frame::bulk_from_str("length"),
                Frame::Integer(stream.len() as i64),
                Frame::bulk_from_str("last-generated-id"),
                id_frame(stream.last_id),
                Frame::bulk_from_str("max-deleted-entry-id"),
                id_frame(stream.max_deleted_id),
                Frame::bulk_from_str("entries-added"),
                Frame::Integer(stream.entries_added as i64),
                Frame::bulk_from_str("groups"),
                Frame::Integer(stream.group_count() as i64),
                Frame::bulk_from_str("first-entry"),
                first.unwrap_or_else(Frame::null),
                Frame::bulk_from_str("last-entry"),
                last.unwrap_or_else(Frame::null),
            ])))
        },
        b"GROUPS" => {
            let mut groups: Vec<_> = stream.groups().collect();
            groups.sort_by(|a, b| a.0.cmp(b.0));
            Ok(Some(Frame::array(
                groups
                    .into_iter()
                    .map(|(name, g)| {
                        Frame::array(vec![
                            Frame::bulk_from_str("name"),
                            Frame::bulk(name.clone()),
                            Frame::bulk_from_str("consumers"),
                            Frame::Integer(g.consumers.len() as i64),
                            Frame::bulk_from_str("pending"),
                            Frame::Integer(g.pel.len() as i64),
                            Frame::bulk_from_str("last-delivered-id"),
                            id_frame(g.last_delivered),
                        ])
                    })
                    .collect(),
            )))
        },
        b"CONSUMERS" => {
            let group_name = argv.get(3).ok_or(CommandError::Syntax)?;
            let Some(group) = stream.group(group_name) else {
                return Err(CommandError::NoGroup {
                    group: String::from_utf8_lossy(group_name).into_owned(),
                    key: String::from_utf8_lossy(key).into_owned(),
                });
            };
            let mut consumers: Vec<_> = group.consumers.iter().collect();
            consumers.sort_by(|a, b| a.0.cmp(b.0));
            Ok(Some(Frame::array(
                consumers
                    .into_iter()
                    .map(|(name, c)| {
                        Frame::array(vec![
                            Frame::bulk_from_str("name"),
                            Frame::bulk(name.clone()),
                            Frame::bulk_from_str("pending"),
                            Frame::Integer(c.ids.len() as i64),
                            Frame::bulk_from_str("idle"),
                            Frame::Integer(now.saturating_sub(c.seen_time_ms) as i64),
                        ])
                    })
                    .collect(),
            )))
        },
        other => Err(CommandError::other(format!(
            "Unknown XINFO subcommand or wrong number of arguments for '{}'",
            String::from_utf8_lossy(other).to_lowercase()
        ))),
    }
}
