// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! CLUSTER subcommands over the slot map.

use std::fmt::Write as _;

use bytes::Bytes;

use crate::{
    cluster::{ClusterMap, SLOT_COUNT, key_slot},
    commands::{CommandCtx, HandlerReply, bulk_array, parse_i64},
    errors::{CommandError, CommandResult},
    resp::Frame,
    storage::now_ms,
};

fn cluster_disabled() -> CommandError {
    CommandError::other("This instance has cluster support disabled")
}

fn with_map<R>(
    ctx: &CommandCtx,
    f: impl FnOnce(&ClusterMap) -> R,
) -> R {
    let map = match ctx.server.cluster.read() {
        Ok(m) => m,
        Err(poisoned) => poisoned.into_inner(),
    };
    f(&map)
}

fn with_map_mut<R>(
    ctx: &CommandCtx,
    f: impl FnOnce(&mut ClusterMap) -> R,
) -> R {
    let mut map = match ctx.server.cluster.write() {
        Ok(m) => m,
        Err(poisoned) => poisoned.into_inner(),
    };
    f(&mut map)
}

fn parse_slot(arg: &[u8]) -> CommandResult<u16> {
    let n = parse_i64(arg)?;
    if !(0..i64::from(SLOT_COUNT)).contains(&n) {
        return Err(CommandError::other(format!(
            "Invalid or out of range slot: {n}"
        )));
    }
    Ok(n as u16)
}

fn parse_slot_list(args: &[Bytes]) -> CommandResult<Vec<u16>> {
    args.iter().map(|a| parse_slot(a)).collect()
}

/// `ADDSLOTSRANGE`-style pairs: start end [start end ...].
fn parse_slot_ranges(args: &[Bytes]) -> CommandResult<Vec<u16>> {
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(CommandError::Syntax);
    }
    let mut slots = Vec::new();
    for pair in args.chunks_exact(2) {
        let start = parse_slot(&pair[0])?;
        let end = parse_slot(&pair[1])?;
        if start > end {
            return Err(CommandError::other(format!(
                "start slot number {start} is greater than end slot number {end}"
            )));
        }
        slots.extend(start..=end);
    }
    Ok(slots)
}

pub fn cluster(ctx: &mut CommandCtx, argv: &[Bytes]) -> HandlerReply {
    let enabled = with_map(ctx, ClusterMap::is_enabled);
    let sub = argv[1].to_ascii_uppercase();

    // KEYSLOT and friends require cluster mode; INFO/MYID answer anyway,
    // matching the probing clients do before enabling cluster support.
    match sub.as_slice() {
        b"INFO" => {
            let info = with_map(ctx, |map| {
                let mut out = String::new();
                let state = if !map.is_enabled() {
                    "ok"
                } else if map.state_ok() {
                    "ok"
                } else {
                    "fail"
                };
                let _ = writeln!(out, "cluster_enabled:{}", u8::from(map.is_enabled()));
                let _ = writeln!(out, "cluster_state:{state}");
                let _ = writeln!(out, "cluster_slots_assigned:{}", map.slots_assigned());
                let _ = writeln!(out, "cluster_known_nodes:{}", map.node_count());
                let _ = writeln!(out, "cluster_size:{}", map.node_count());
                let _ = writeln!(out, "cluster_current_epoch:{}", map.epoch());
                out
            });
            Ok(Some(Frame::bulk(Bytes::from(info))))
        },
        b"MYID" => {
            let id = with_map(ctx, |map| map.my_id().to_string());
            Ok(Some(Frame::bulk(Bytes::from(id))))
        },
        _ if !enabled => Err(cluster_disabled()),
        b"KEYSLOT" => {
            let key = argv.get(2).ok_or(CommandError::Syntax)?;
            Ok(Some(Frame::Integer(i64::from(key_slot(key)))))
        },
        b"COUNTKEYSINSLOT" => {
            let slot = parse_slot(argv.get(2).ok_or(CommandError::Syntax)?)?;
            let now = now_ms();
            let db = ctx.server.db(ctx.db_index());
            let count = db
                .iter_keys(now)
                .filter(|k| key_slot(k) == slot)
                .count();
            Ok(Some(Frame::Integer(count as i64)))
        },
        b"GETKEYSINSLOT" => {
            let slot = parse_slot(argv.get(2).ok_or(CommandError::Syntax)?)?;
            let count = parse_i64(argv.get(3).ok_or(CommandError::Syntax)?)?;
            if count < 0 {
                return Err(CommandError::other("Number of keys can't be negative"));
            }
            let now = now_ms();
            let db = ctx.server.db(ctx.db_index());
            let mut keys: Vec<Bytes> = db
                .iter_keys(now)
                .filter(|k| key_slot(k) == slot)
                .take(count as usize)
                .cloned()
                .collect();
            keys.sort();
            Ok(Some(bulk_array(keys)))
        },
        b"NODES" => {
            let lines = with_map(ctx, ClusterMap::nodes_lines);
            Ok(Some(Frame::bulk(Bytes::from(lines))))
        },
        b"SLOTS" => {
            let rows = with_map(ctx, ClusterMap::slot_ranges);
            Ok(Some(Frame::array(
                rows.into_iter()
                    .map(|(start, stop, ip, port, id)| {
                        Frame::array(vec![
                            Frame::Integer(i64::from(start)),
                            Frame::Integer(i64::from(stop)),
                            Frame::array(vec![
                                Frame::bulk(Bytes::from(ip)),
                                Frame::Integer(i64::from(port)),
                                Frame::bulk(Bytes::from(id)),
                            ]),
                        ])
                    })
                    .collect(),
            )))
        },
        b"MEET" => {
            let ip = String::from_utf8_lossy(
                argv.get(2).ok_or(CommandError::Syntax)?,
            )
            .into_owned();
            let port = parse_i64(argv.get(3).ok_or(CommandError::Syntax)?)?;
            if !(1..=u16::MAX as i64).contains(&port) {
                return Err(CommandError::other("Invalid base port"));
            }
            with_map_mut(ctx, |map| map.meet(ip, port as u16));
            Ok(Some(Frame::ok()))
        },
        b"ADDSLOTS" => {
            let slots = parse_slot_list(&argv[2..])?;
            if slots.is_empty() {
                return Err(CommandError::Syntax);
            }
            with_map_mut(ctx, |map| map.add_slots(&slots))?;
            Ok(Some(Frame::ok()))
        },
        b"ADDSLOTSRANGE" => {
            let slots = parse_slot_ranges(&argv[2..])?;
            with_map_mut(ctx, |map| map.add_slots(&slots))?;
            Ok(Some(Frame::ok()))
        },
        b"DELSLOTS" => {
            let slots = parse_slot_list(&argv[2..])?;
            if slots.is_empty() {
                return Err(CommandError::Syntax);
            }
            with_map_mut(ctx, |map| map.del_slots(&slots))?;
            Ok(Some(Frame::ok()))
        },
        b"SETSLOT" => {
            let slot = parse_slot(argv.get(2).ok_or(CommandError::Syntax)?)?;
            let action = argv.get(3).ok_or(CommandError::Syntax)?;
            if !action.eq_ignore_ascii_case(b"NODE") {
                return Err(CommandError::Syntax);
            }
            let node_id = String::from_utf8_lossy(
                argv.get(4).ok_or(CommandError::Syntax)?,
            )
            .into_owned();
            with_map_mut(ctx, |map| map.set_slot_owner(slot, &node_id))?;
            Ok(Some(Frame::ok()))
        },
        b"DELSLOTSRANGE" => {
            let slots = parse_slot_ranges(&argv[2..])?;
            with_map_mut(ctx, |map| map.del_slots(&slots))?;
            Ok(Some(Frame::ok()))
        },
        other => Err(CommandError::other(format!(
            "Unknown CLUSTER subcommand or wrong number of arguments for '{}'",
            String::from_utf8_lossy(other).to_lowercase()
        ))),
    }
}
