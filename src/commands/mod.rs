//! Command dispatch: the verb table, pre-dispatch checks and
//! post-dispatch sampling.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{future::Future, pin::Pin, sync::Arc, time::Instant};

use bitflags::bitflags;
use bytes::Bytes;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::error;

use crate::{
    cluster::Routing,
    errors::{CommandError, CommandResult},
    resp::Frame,
    server::{Server, Session, client::ClientRegistry},
    storage::now_ms,
};

/// Bitmap commands.
pub mod bitmap;
/// CLUSTER subcommands.
pub mod cluster_cmds;
/// Connection-scoped verbs (PING, SELECT, AUTH, CLIENT, ...).
pub mod connection;
/// Hash commands, including per-field TTLs.
pub mod hashes;
/// HyperLogLog commands.
pub mod hll_cmds;
/// Generic keyspace commands (DEL, EXPIRE, SCAN, ...).
pub mod keyspace;
/// List commands and their blocking variants.
pub mod lists;
/// PubSub verbs.
pub mod pubsub_cmds;
/// Server introspection (INFO, CONFIG, SLOWLOG, LATENCY, ...).
pub mod server_cmds;
/// Set commands.
pub mod sets;
/// Stream commands and consumer groups.
pub mod streams;
/// String commands.
pub mod strings;
/// MULTI/EXEC/WATCH.
pub mod transactions;
/// Sorted-set commands and their blocking variants.
pub mod zsets;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CommandFlags: u32 {
        /// Mutates the keyspace.
        const WRITE          = 1 << 0;
        /// Pure read.
        const READONLY       = 1 << 1;
        /// Allowed while the client is in subscribe mode.
        const PUBSUB_OK      = 1 << 2;
        /// May suspend on the blocking coordinator.
        const BLOCKING       = 1 << 3;
        /// Skips the cluster redirection check.
        const CLUSTER_EXEMPT = 1 << 4;
        /// MULTI/EXEC/DISCARD/WATCH/UNWATCH: never queued.
        const TX_META        = 1 << 5;
        /// Runnable before AUTH succeeds.
        const PRE_AUTH       = 1 << 6;
    }
}

/// One request mid-flight: the server bundle, the issuing session and the
/// reply channel. `allow_block` is cleared while EXEC drains its queue so
/// blocking verbs degrade to their immediate form.
pub struct CommandCtx<'a> {
    pub server: &'a Arc<Server>,
    pub session: &'a mut Session,
    pub out: &'a mpsc::UnboundedSender<Frame>,
    pub allow_block: bool,
}

impl CommandCtx<'_> {
    pub fn db_index(&self) -> usize {
        self.session.db_index
    }

    /// Sends an out-of-band frame on the reply channel (SUBSCRIBE-style
    /// multi-replies).
    pub fn send(&self, frame: Frame) {
        let _ = self.out.send(frame);
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.server.clients
    }
}

/// `None` means the handler already pushed its replies through `ctx.send`.
pub type HandlerReply = CommandResult<Option<Frame>>;

pub type SyncHandler = fn(&mut CommandCtx, &[Bytes]) -> HandlerReply;
pub type BoxedReply<'a> = Pin<Box<dyn Future<Output = HandlerReply> + Send + 'a>>;
pub type AsyncHandler =
    for<'a, 'b> fn(&'a mut CommandCtx<'b>, Vec<Bytes>) -> BoxedReply<'a>;

#[derive(Clone, Copy)]
pub enum Handler {
    Sync(SyncHandler),
    Async(AsyncHandler),
}

#[derive(Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    /// Redis arity convention: positive = exact argc (verb included),
    /// negative = at least `-arity`.
    pub arity: i32,
    /// 1-based index of the first key argument; 0 = no keys.
    pub first_key: usize,
    /// Last key index; negative counts from the end (-1 = last arg).
    pub last_key: i32,
    pub key_step: usize,
    pub flags: CommandFlags,
    pub handler: Handler,
}

impl CommandSpec {
    fn arity_ok(&self, argc: usize) -> bool {
        if self.arity >= 0 {
            argc == self.arity as usize
        } else {
            argc >= (-self.arity) as usize
        }
    }
}

const fn ro(
    name: &'static str,
    arity: i32,
    first_key: usize,
    last_key: i32,
    key_step: usize,
    handler: SyncHandler,
) -> CommandSpec {
    CommandSpec {
        name,
        arity,
        first_key,
        last_key,
        key_step,
        flags: CommandFlags::READONLY,
        handler: Handler::Sync(handler),
    }
}

const fn wr(
    name: &'static str,
    arity: i32,
    first_key: usize,
    last_key: i32,
    key_step: usize,
    handler: SyncHandler,
) -> CommandSpec {
    CommandSpec {
        name,
        arity,
        first_key,
        last_key,
        key_step,
        flags: CommandFlags::WRITE,
        handler: Handler::Sync(handler),
    }
}

const fn with_flags(mut spec: CommandSpec, flags: CommandFlags) -> CommandSpec {
    spec.flags = flags;
    spec
}

const fn blocking(
    name: &'static str,
    arity: i32,
    first_key: usize,
    last_key: i32,
    key_step: usize,
    handler: AsyncHandler,
) -> CommandSpec {
    CommandSpec {
        name,
        arity,
        first_key,
        last_key,
        key_step,
        flags: CommandFlags::WRITE.union(CommandFlags::BLOCKING),
        handler: Handler::Async(handler),
    }
}

static TABLE: Lazy<HashMap<&'static str, CommandSpec>> = Lazy::new(|| {
    let specs: &[CommandSpec] = &[
        // ── connection ────────────────────────────────────────────────
        with_flags(
            ro("PING", -1, 0, 0, 0, connection::ping),
            CommandFlags::READONLY
                .union(CommandFlags::PUBSUB_OK)
                .union(CommandFlags::CLUSTER_EXEMPT),
        ),
        with_flags(
            ro("ECHO", 2, 0, 0, 0, connection::echo),
            CommandFlags::READONLY.union(CommandFlags::CLUSTER_EXEMPT),
        ),
        with_flags(
            ro("SELECT", 2, 0, 0, 0, connection::select),
            CommandFlags::READONLY.union(CommandFlags::CLUSTER_EXEMPT),
        ),
        with_flags(
            ro("QUIT", 1, 0, 0, 0, connection::quit),
            CommandFlags::READONLY
                .union(CommandFlags::PUBSUB_OK)
                .union(CommandFlags::CLUSTER_EXEMPT)
                .union(CommandFlags::PRE_AUTH),
        ),
        with_flags(
            ro("AUTH", 2, 0, 0, 0, connection::auth),
            CommandFlags::READONLY
                .union(CommandFlags::CLUSTER_EXEMPT)
                .union(CommandFlags::PRE_AUTH),
        ),
        with_flags(
            ro("RESET", 1, 0, 0, 0, connection::reset),
            CommandFlags::READONLY
                .union(CommandFlags::PUBSUB_OK)
                .union(CommandFlags::CLUSTER_EXEMPT)
                .union(CommandFlags::PRE_AUTH),
        ),
        with_flags(
            ro("CLIENT", -2, 0, 0, 0, connection::client),
            CommandFlags::READONLY.union(CommandFlags::CLUSTER_EXEMPT),
        ),
        // ── strings ───────────────────────────────────────────────────
        wr("SET", -3, 1, 1, 1, strings::set),
        ro("GET", 2, 1, 1, 1, strings::get),
        wr("MSET", -3, 1, -1, 2, strings::mset),
        ro("MGET", -2, 1, -1, 1, strings::mget),
        wr("SETNX", 3, 1, 1, 1, strings::setnx),
        wr("SETEX", 4, 1, 1, 1, strings::setex),
        wr("PSETEX", 4, 1, 1, 1, strings::psetex),
        wr("GETSET", 3, 1, 1, 1, strings::getset),
        wr("INCR", 2, 1, 1, 1, strings::incr),
        wr("DECR", 2, 1, 1, 1, strings::decr),
        wr("INCRBY", 3, 1, 1, 1, strings::incrby),
        wr("DECRBY", 3, 1, 1, 1, strings::decrby),
        wr("INCRBYFLOAT", 3, 1, 1, 1, strings::incrbyfloat),
        wr("APPEND", 3, 1, 1, 1, strings::append),
        ro("STRLEN", 2, 1, 1, 1, strings::strlen),
        ro("GETRANGE", 4, 1, 1, 1, strings::getrange),
        wr("SETRANGE", 4, 1, 1, 1, strings::setrange),
        wr("GETDEL", 2, 1, 1, 1, strings::getdel),
        wr("GETEX", -2, 1, 1, 1, strings::getex),
        // ── keyspace ──────────────────────────────────────────────────
        wr("DEL", -2, 1, -1, 1, keyspace::del),
        wr("UNLINK", -2, 1, -1, 1, keyspace::del),
        ro("EXISTS", -2, 1, -1, 1, keyspace::exists),
        ro("TYPE", 2, 1, 1, 1, keyspace::type_cmd),
        ro("KEYS", 2, 0, 0, 0, keyspace::keys),
        ro("SCAN", -2, 0, 0, 0, keyspace::scan),
        wr("RENAME", 3, 1, 2, 1, keyspace::rename),
        wr("RENAMENX", 3, 1, 2, 1, keyspace::renamenx),
        ro("RANDOMKEY", 1, 0, 0, 0, keyspace::randomkey),
        ro("DBSIZE", 1, 0, 0, 0, keyspace::dbsize),
        wr("FLUSHDB", -1, 0, 0, 0, keyspace::flushdb),
        wr("FLUSHALL", -1, 0, 0, 0, keyspace::flushall),
        wr("EXPIRE", -3, 1, 1, 1, keyspace::expire),
        wr("PEXPIRE", -3, 1, 1, 1, keyspace::pexpire),
        wr("EXPIREAT", -3, 1, 1, 1, keyspace::expireat),
        wr("PEXPIREAT", -3, 1, 1, 1, keyspace::pexpireat),
        ro("TTL", 2, 1, 1, 1, keyspace::ttl),
        ro("PTTL", 2, 1, 1, 1, keyspace::pttl),
        wr("PERSIST", 2, 1, 1, 1, keyspace::persist),
        ro("EXPIRETIME", 2, 1, 1, 1, keyspace::expiretime),
        ro("PEXPIRETIME", 2, 1, 1, 1, keyspace::pexpiretime),
        wr("COPY", -3, 1, 2, 1, keyspace::copy),
        ro("TOUCH", -2, 1, -1, 1, keyspace::touch),
        // ── hashes ────────────────────────────────────────────────────
        wr("HSET", -4, 1, 1, 1, hashes::hset),
        wr("HMSET", -4, 1, 1, 1, hashes::hmset),
        ro("HGET", 3, 1, 1, 1, hashes::hget),
        ro("HMGET", -3, 1, 1, 1, hashes::hmget),
        ro("HGETALL", 2, 1, 1, 1, hashes::hgetall),
        wr("HDEL", -3, 1, 1, 1, hashes::hdel),
        ro("HEXISTS", 3, 1, 1, 1, hashes::hexists),
        ro("HLEN", 2, 1, 1, 1, hashes::hlen),
        ro("HKEYS", 2, 1, 1, 1, hashes::hkeys),
        ro("HVALS", 2, 1, 1, 1, hashes::hvals),
        wr("HINCRBY", 4, 1, 1, 1, hashes::hincrby),
        wr("HINCRBYFLOAT", 4, 1, 1, 1, hashes::hincrbyfloat),
        wr("HSETNX", 4, 1, 1, 1, hashes::hsetnx),
        ro("HRANDFIELD", -2, 1, 1, 1, hashes::hrandfield),
        ro("HSCAN", -3, 1, 1, 1, hashes::hscan),
        wr("HEXPIRE", -6, 1, 1, 1, hashes::hexpire),
        wr("HPEXPIRE", -6, 1, 1, 1, hashes::hpexpire),
        ro("HTTL", -5, 1, 1, 1, hashes::httl),
        ro("HPTTL", -5, 1, 1, 1, hashes::hpttl),
        wr("HPERSIST", -5, 1, 1, 1, hashes::hpersist),
        // ── lists ─────────────────────────────────────────────────────
        wr("LPUSH", -3, 1, 1, 1, lists::lpush),
        wr("RPUSH", -3, 1, 1, 1, lists::rpush),
        wr("LPOP", -2, 1, 1, 1, lists::lpop),
        wr("RPOP", -2, 1, 1, 1, lists::rpop),
        ro("LRANGE", 4, 1, 1, 1, lists::lrange),
        ro("LINDEX", 3, 1, 1, 1, lists::lindex),
        wr("LSET", 4, 1, 1, 1, lists::lset),
        ro("LLEN", 2, 1, 1, 1, lists::llen),
        wr("LTRIM", 4, 1, 1, 1, lists::ltrim),
        ro("LPOS", -3, 1, 1, 1, lists::lpos),
        wr("LREM", 4, 1, 1, 1, lists::lrem),
        wr("LMOVE", 5, 1, 2, 1, lists::lmove),
        wr("RPOPLPUSH", 3, 1, 2, 1, lists::rpoplpush),
        blocking("BLPOP", -3, 1, -2, 1, lists::blpop),
        blocking("BRPOP", -3, 1, -2, 1, lists::brpop),
        blocking("BLMOVE", 6, 1, 2, 1, lists::blmove),
        // ── sets ──────────────────────────────────────────────────────
        wr("SADD", -3, 1, 1, 1, sets::sadd),
        wr("SREM", -3, 1, 1, 1, sets::srem),
        ro("SMEMBERS", 2, 1, 1, 1, sets::smembers),
        ro("SISMEMBER", 3, 1, 1, 1, sets::sismember),
        ro("SMISMEMBER", -3, 1, 1, 1, sets::smismember),
        ro("SCARD", 2, 1, 1, 1, sets::scard),
        wr("SPOP", -2, 1, 1, 1, sets::spop),
        ro("SRANDMEMBER", -2, 1, 1, 1, sets::srandmember),
        wr("SMOVE", 4, 1, 2, 1, sets::smove),
        ro("SUNION", -2, 1, -1, 1, sets::sunion),
        ro("SINTER", -2, 1, -1, 1, sets::sinter),
        ro("SDIFF", -2, 1, -1, 1, sets::sdiff),
        ro("SINTERCARD", -3, 0, 0, 0, sets::sintercard),
        ro("SSCAN", -3, 1, 1, 1, sets::sscan),
        // ── sorted sets ───────────────────────────────────────────────
        wr("ZADD", -4, 1, 1, 1, zsets::zadd),
        wr("ZREM", -3, 1, 1, 1, zsets::zrem),
        ro("ZSCORE", 3, 1, 1, 1, zsets::zscore),
        ro("ZMSCORE", -3, 1, 1, 1, zsets::zmscore),
        ro("ZRANK", 3, 1, 1, 1, zsets::zrank),
        ro("ZREVRANK", 3, 1, 1, 1, zsets::zrevrank),
        ro("ZRANGE", -4, 1, 1, 1, zsets::zrange),
        ro("ZREVRANGE", -4, 1, 1, 1, zsets::zrevrange),
        wr("ZINCRBY", 4, 1, 1, 1, zsets::zincrby),
        ro("ZCARD", 2, 1, 1, 1, zsets::zcard),
        ro("ZCOUNT", 4, 1, 1, 1, zsets::zcount),
        ro("ZRANGEBYSCORE", -4, 1, 1, 1, zsets::zrangebyscore),
        wr("ZPOPMIN", -2, 1, 1, 1, zsets::zpopmin),
        wr("ZPOPMAX", -2, 1, 1, 1, zsets::zpopmax),
        wr("ZREMRANGEBYRANK", 4, 1, 1, 1, zsets::zremrangebyrank),
        wr("ZREMRANGEBYSCORE", 4, 1, 1, 1, zsets::zremrangebyscore),
        ro("ZSCAN", -3, 1, 1, 1, zsets::zscan),
        blocking("BZPOPMIN", -3, 1, -2, 1, zsets::bzpopmin),
        blocking("BZPOPMAX", -3, 1, -2, 1, zsets::bzpopmax),
        // ── transactions ──────────────────────────────────────────────
        with_flags(
            ro("MULTI", 1, 0, 0, 0, transactions::multi),
            CommandFlags::READONLY
                .union(CommandFlags::TX_META)
                .union(CommandFlags::CLUSTER_EXEMPT),
        ),
        CommandSpec {
            name: "EXEC",
            arity: 1,
            first_key: 0,
            last_key: 0,
            key_step: 0,
            flags: CommandFlags::TX_META.union(CommandFlags::CLUSTER_EXEMPT),
            handler: Handler::Async(transactions::exec),
        },
        with_flags(
            ro("DISCARD", 1, 0, 0, 0, transactions::discard),
            CommandFlags::READONLY
                .union(CommandFlags::TX_META)
                .union(CommandFlags::CLUSTER_EXEMPT),
        ),
        with_flags(
            ro("WATCH", -2, 1, -1, 1, transactions::watch),
            CommandFlags::READONLY
                .union(CommandFlags::TX_META)
                .union(CommandFlags::CLUSTER_EXEMPT),
        ),
        with_flags(
            ro("UNWATCH", 1, 0, 0, 0, transactions::unwatch),
            CommandFlags::READONLY
                .union(CommandFlags::TX_META)
                .union(CommandFlags::CLUSTER_EXEMPT),
        ),
        // ── pubsub ────────────────────────────────────────────────────
        with_flags(
            ro("SUBSCRIBE", -2, 0, 0, 0, pubsub_cmds::subscribe),
            CommandFlags::READONLY
                .union(CommandFlags::PUBSUB_OK)
                .union(CommandFlags::CLUSTER_EXEMPT),
        ),
        with_flags(
            ro("UNSUBSCRIBE", -1, 0, 0, 0, pubsub_cmds::unsubscribe),
            CommandFlags::READONLY
                .union(CommandFlags::PUBSUB_OK)
                .union(CommandFlags::CLUSTER_EXEMPT),
        ),
        with_flags(
            ro("PSUBSCRIBE", -2, 0, 0, 0, pubsub_cmds::psubscribe),
            CommandFlags::READONLY
                .union(CommandFlags::PUBSUB_OK)
                .union(CommandFlags::CLUSTER_EXEMPT),
        ),
        with_flags(
            ro("PUNSUBSCRIBE", -1, 0, 0, 0, pubsub_cmds::punsubscribe),
            CommandFlags::READONLY
                .union(CommandFlags::PUBSUB_OK)
                .union(CommandFlags::CLUSTER_EXEMPT),
        ),
        with_flags(
            ro("PUBLISH", 3, 0, 0, 0, pubsub_cmds::publish),
            CommandFlags::READONLY.union(CommandFlags::CLUSTER_EXEMPT),
        ),
        with_flags(
            ro("PUBSUB", -2, 0, 0, 0, pubsub_cmds::pubsub),
            CommandFlags::READONLY.union(CommandFlags::CLUSTER_EXEMPT),
        ),
        // ── streams ───────────────────────────────────────────────────
        wr("XADD", -5, 1, 1, 1, streams::xadd),
        CommandSpec {
            name: "XREAD",
            arity: -4,
            first_key: 0,
            last_key: 0,
            key_step: 0,
            flags: CommandFlags::READONLY.union(CommandFlags::BLOCKING),
            handler: Handler::Async(streams::xread),
        },
        ro("XRANGE", -4, 1, 1, 1, streams::xrange),
        ro("XLEN", 2, 1, 1, 1, streams::xlen),
        wr("XGROUP", -2, 2, 2, 1, streams::xgroup),
        CommandSpec {
            name: "XREADGROUP",
            arity: -7,
            first_key: 0,
            last_key: 0,
            key_step: 0,
            flags: CommandFlags::WRITE,
            handler: Handler::Sync(streams::xreadgroup),
        },
        wr("XACK", -4, 1, 1, 1, streams::xack),
        wr("XTRIM", -4, 1, 1, 1, streams::xtrim),
        ro("XINFO", -2, 2, 2, 1, streams::xinfo),
        wr("XCLAIM", -6, 1, 1, 1, streams::xclaim),
        ro("XPENDING", -3, 1, 1, 1, streams::xpending),
        wr("XDEL", -3, 1, 1, 1, streams::xdel),
        wr("XSETID", -3, 1, 1, 1, streams::xsetid),
        // ── hyperloglog ───────────────────────────────────────────────
        wr("PFADD", -2, 1, 1, 1, hll_cmds::pfadd),
        ro("PFCOUNT", -2, 1, -1, 1, hll_cmds::pfcount),
        wr("PFMERGE", -2, 1, -1, 1, hll_cmds::pfmerge),
        // ── bitmaps ───────────────────────────────────────────────────
        wr("SETBIT", 4, 1, 1, 1, bitmap::setbit),
        ro("GETBIT", 3, 1, 1, 1, bitmap::getbit),
        ro("BITCOUNT", -2, 1, 1, 1, bitmap::bitcount),
        wr("BITOP", -4, 2, -1, 1, bitmap::bitop),
        // ── cluster ───────────────────────────────────────────────────
        with_flags(
            ro("CLUSTER", -2, 0, 0, 0, cluster_cmds::cluster),
            CommandFlags::READONLY.union(CommandFlags::CLUSTER_EXEMPT),
        ),
        // ── server ────────────────────────────────────────────────────
        with_flags(
            ro("INFO", -1, 0, 0, 0, server_cmds::info),
            CommandFlags::READONLY.union(CommandFlags::CLUSTER_EXEMPT),
        ),
        with_flags(
            ro("COMMAND", -1, 0, 0, 0, server_cmds::command),
            CommandFlags::READONLY.union(CommandFlags::CLUSTER_EXEMPT),
        ),
        with_flags(
            ro("CONFIG", -2, 0, 0, 0, server_cmds::config),
            CommandFlags::READONLY.union(CommandFlags::CLUSTER_EXEMPT),
        ),
        CommandSpec {
            name: "DEBUG",
            arity: -2,
            first_key: 0,
            last_key: 0,
            key_step: 0,
            flags: CommandFlags::READONLY.union(CommandFlags::CLUSTER_EXEMPT),
            handler: Handler::Async(server_cmds::debug),
        },
        with_flags(
            ro("TIME", 1, 0, 0, 0, server_cmds::time),
            CommandFlags::READONLY.union(CommandFlags::CLUSTER_EXEMPT),
        ),
        with_flags(
            ro("SLOWLOG", -2, 0, 0, 0, server_cmds::slowlog),
            CommandFlags::READONLY.union(CommandFlags::CLUSTER_EXEMPT),
        ),
        with_flags(
            ro("LATENCY", -2, 0, 0, 0, server_cmds::latency),
            CommandFlags::READONLY.union(CommandFlags::CLUSTER_EXEMPT),
        ),
        with_flags(
            ro("SHUTDOWN", -1, 0, 0, 0, server_cmds::shutdown),
            CommandFlags::READONLY.union(CommandFlags::CLUSTER_EXEMPT),
        ),
    ];
    specs.iter().map(|s| (s.name, *s)).collect()
});

pub fn lookup(verb: &str) -> Option<&'static CommandSpec> {
    TABLE.get(verb)
}

pub fn command_count() -> usize {
    TABLE.len()
}

pub fn all_specs() -> Vec<&'static CommandSpec> {
    let mut specs: Vec<&'static CommandSpec> = TABLE.values().collect();
    specs.sort_by_key(|s| s.name);
    specs
}

/// Keys named by `argv` according to the spec's declarative positions,
/// with the XREAD/XREADGROUP special case (keys follow the STREAMS token,
/// first half of the remainder).
pub fn extract_keys(spec: &CommandSpec, argv: &[Bytes]) -> Vec<Bytes> {
    if spec.name == "XREAD" || spec.name == "XREADGROUP" {
        if let Some(pos) = argv
            .iter()
            .position(|a| a.eq_ignore_ascii_case(b"STREAMS"))
        {
            let rest = &argv[pos + 1..];
            return rest[..rest.len() / 2].to_vec();
        }
        return Vec::new();
    }
    if spec.first_key == 0 || argv.len() <= spec.first_key {
        return Vec::new();
    }
    let last = if spec.last_key < 0 {
        let from_end = (-spec.last_key) as usize;
        if argv.len() < from_end {
            return Vec::new();
        }
        argv.len() - from_end
    } else {
        (spec.last_key as usize).min(argv.len() - 1)
    };
    let mut keys = Vec::new();
    let mut idx = spec.first_key;
    while idx <= last {
        keys.push(argv[idx].clone());
        idx += spec.key_step.max(1);
    }
    keys
}

/// Verb as an uppercase string, or an error for non-UTF8 noise.
fn verb_of(argv: &[Bytes]) -> Result<String, CommandError> {
    std::str::from_utf8(&argv[0])
        .map(str::to_ascii_uppercase)
        .map_err(|_| {
            CommandError::UnknownCommand(String::from_utf8_lossy(&argv[0]).into_owned())
        })
}

/// Executes one command end to end: pre-checks, handler, reply, sampling.
pub async fn dispatch(
    server: &Arc<Server>,
    session: &mut Session,
    out: &mpsc::UnboundedSender<Frame>,
    argv: Vec<Bytes>,
) {
    if argv.is_empty() {
        return;
    }
    let started = Instant::now();
    let verb = match verb_of(&argv) {
        Ok(v) => v,
        Err(e) => {
            let _ = out.send(Frame::error(e.to_string()));
            return;
        },
    };

    let mut ctx = CommandCtx {
        server,
        session: &mut *session,
        out,
        allow_block: true,
    };
    let reply = run_command(&mut ctx, &verb, argv.clone()).await;

    match reply {
        Ok(Some(frame)) => {
            let _ = out.send(frame);
        },
        Ok(None) => {},
        Err(err) => {
            let fatal = err.is_fatal();
            let _ = out.send(Frame::error(err.to_string()));
            if fatal {
                session.should_close = true;
            }
        },
    }

    let elapsed_us = started.elapsed().as_micros() as u64;
    let unix_sec = now_ms() / 1000;
    server.latency.record(&verb, elapsed_us, unix_sec);
    server.slowlog.maybe_record(
        elapsed_us,
        &argv,
        &session.shared.addr,
        &ClientRegistry::name_of(&session.shared),
        unix_sec,
    );
}

/// The check pipeline shared by direct dispatch and EXEC replay.
pub async fn run_command(
    ctx: &mut CommandCtx<'_>,
    verb: &str,
    argv: Vec<Bytes>,
) -> HandlerReply {
    let spec = match lookup(verb) {
        Some(spec) => spec,
        None => {
            if ctx.session.in_multi {
                ctx.session.poison_multi();
            }
            return Err(CommandError::UnknownCommand(verb.to_string()));
        },
    };

    // 1. Transaction queueing.
    if ctx.session.in_multi && !spec.flags.contains(CommandFlags::TX_META) {
        if !spec.arity_ok(argv.len()) {
            ctx.session.poison_multi();
            return Err(CommandError::WrongArity(verb.to_lowercase()));
        }
        ctx.session.queued.push(argv);
        return Ok(Some(Frame::simple("QUEUED")));
    }

    // 2. AUTH gate.
    if !ctx.session.authenticated && !spec.flags.contains(CommandFlags::PRE_AUTH) {
        return Err(CommandError::AuthRequired);
    }

    // 3. PubSub confinement.
    if ctx.session.subs.is_subscribed()
        && !spec.flags.contains(CommandFlags::PUBSUB_OK)
    {
        return Err(CommandError::other(format!(
            "Can't execute '{}': only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT / RESET are allowed in this context",
            verb.to_lowercase()
        )));
    }

    // 4. Cluster redirection.
    if !spec.flags.contains(CommandFlags::CLUSTER_EXEMPT) {
        let enabled = {
            let cluster = match ctx.server.cluster.read() {
                Ok(c) => c,
                Err(poisoned) => poisoned.into_inner(),
            };
            cluster.is_enabled()
        };
        if enabled {
            let keys = extract_keys(spec, &argv);
            if !keys.is_empty() {
                let routing = {
                    let cluster = match ctx.server.cluster.read() {
                        Ok(c) => c,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    cluster.route_keys(keys.iter())
                };
                match routing {
                    Routing::Local => {},
                    Routing::Moved { slot, addr } => {
                        return Err(CommandError::Moved { slot, addr });
                    },
                    Routing::CrossSlot => return Err(CommandError::CrossSlot),
                    Routing::Down { .. } => return Err(CommandError::ClusterDown),
                }
            }
        }
    }

    // 5. Arity.
    if !spec.arity_ok(argv.len()) {
        return Err(CommandError::WrongArity(verb.to_lowercase()));
    }

    // 6. Invocation.
    let result = match spec.handler {
        Handler::Sync(f) => f(ctx, &argv),
        Handler::Async(f) => f(ctx, argv).await,
    };
    if let Err(CommandError::Internal) = &result {
        error!(verb, "handler reported an internal error");
    }
    result
}

// ── shared argument helpers ───────────────────────────────────────────

pub fn parse_i64(arg: &[u8]) -> CommandResult<i64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(CommandError::NotInteger)
}

pub fn parse_u64(arg: &[u8]) -> CommandResult<u64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or(CommandError::NotInteger)
}

pub fn parse_f64(arg: &[u8]) -> CommandResult<f64> {
    let s = std::str::from_utf8(arg).map_err(|_| CommandError::NotFloat)?;
    match s.to_ascii_lowercase().as_str() {
        "inf" | "+inf" | "infinity" | "+infinity" => Ok(f64::INFINITY),
        "-inf" | "-infinity" => Ok(f64::NEG_INFINITY),
        _ => {
            let v: f64 = s.parse().map_err(|_| CommandError::NotFloat)?;
            if v.is_nan() { Err(CommandError::NotFloat) } else { Ok(v) }
        },
    }
}

/// Shortest faithful decimal form, matching the reply format of score and
/// float-increment commands.
pub fn format_f64(v: f64) -> String {
    if v == f64::INFINITY {
        "inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-inf".to_string()
    } else if v == v.trunc() && v.abs() < 1e17 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

/// Resolves a possibly-negative index against a length, clamping into
/// `0..len` the way LRANGE/ZRANGE do for their start bound.
pub fn resolve_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let mut start = if start < 0 { len + start } else { start };
    let mut stop = if stop < 0 { len + stop } else { stop };
    if start < 0 {
        start = 0;
    }
    if stop >= len {
        stop = len - 1;
    }
    if len == 0 || start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

pub fn bulk_array(items: impl IntoIterator<Item = Bytes>) -> Frame {
    Frame::array(items.into_iter().map(|b| Frame::Bulk(Some(b))).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn table_has_core_verbs() {
        for verb in [
            "GET", "SET", "DEL", "LPUSH", "ZADD", "XADD", "PFADD", "SETBIT",
            "MULTI", "SUBSCRIBE", "CLUSTER", "SLOWLOG", "BLPOP",
        ] {
            assert!(lookup(verb).is_some(), "missing {verb}");
        }
        assert!(lookup("GETX").is_none());
    }

    #[test]
    fn extract_keys_declarative_ranges() {
        let spec = lookup("MSET").expect("spec");
        let argv = vec![b("MSET"), b("k1"), b("v1"), b("k2"), b("v2")];
        assert_eq!(extract_keys(spec, &argv), vec![b("k1"), b("k2")]);

        let spec = lookup("MGET").expect("spec");
        let argv = vec![b("MGET"), b("a"), b("b"), b("c")];
        assert_eq!(extract_keys(spec, &argv), vec![b("a"), b("b"), b("c")]);

        let spec = lookup("BLPOP").expect("spec");
        let argv = vec![b("BLPOP"), b("q1"), b("q2"), b("5")];
        assert_eq!(extract_keys(spec, &argv), vec![b("q1"), b("q2")]);

        let spec = lookup("BITOP").expect("spec");
        let argv = vec![b("BITOP"), b("AND"), b("dst"), b("s1"), b("s2")];
        assert_eq!(extract_keys(spec, &argv), vec![b("dst"), b("s1"), b("s2")]);

        let spec = lookup("PING").expect("spec");
        assert!(extract_keys(spec, &[b("PING")]).is_empty());
    }

    #[test]
    fn extract_keys_xread_streams_token() {
        let spec = lookup("XREAD").expect("spec");
        let argv = vec![
            b("XREAD"),
            b("COUNT"),
            b("5"),
            b("STREAMS"),
            b("s1"),
            b("s2"),
            b("0"),
            b("0"),
        ];
        assert_eq!(extract_keys(spec, &argv), vec![b("s1"), b("s2")]);
    }

    #[test]
    fn arity_convention() {
        let get = lookup("GET").expect("spec");
        assert!(get.arity_ok(2));
        assert!(!get.arity_ok(3));
        let set = lookup("SET").expect("spec");
        assert!(set.arity_ok(3));
        assert!(set.arity_ok(7));
        assert!(!set.arity_ok(2));
    }

    #[test]
    fn range_resolution() {
        assert_eq!(resolve_range(0, -1, 5), Some((0, 4)));
        assert_eq!(resolve_range(-3, -1, 5), Some((2, 4)));
        assert_eq!(resolve_range(1, 2, 5), Some((1, 2)));
        assert_eq!(resolve_range(3, 1, 5), None);
        assert_eq!(resolve_range(0, -1, 0), None);
        assert_eq!(resolve_range(-100, 100, 3), Some((0, 2)));
    }

    #[test]
    fn float_formatting() {
        assert_eq!(format_f64(1.0), "1");
        assert_eq!(format_f64(1.5), "1.5");
        assert_eq!(format_f64(-3.0), "-3");
        assert_eq!(format_f64(f64::INFINITY), "inf");
        assert_eq!(format_f64(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn float_parsing() {
        assert_eq!(parse_f64(b"3.5").expect("ok"), 3.5);
        assert_eq!(parse_f64(b"+inf").expect("ok"), f64::INFINITY);
        assert_eq!(parse_f64(b"-INF").expect("ok"), f64::NEG_INFINITY);
        assert!(parse_f64(b"nan").is_err());
        assert!(parse_f64(b"abc").is_err());
    }
}
