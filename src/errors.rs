// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;

/// Command-level failure taxonomy.
///
/// The `Display` form of every variant is exactly the payload of the RESP
/// error reply sent to the client, so the dispatcher renders errors with a
/// plain `format!("{err}")`. Only [`CommandError::Protocol`] tears the
/// connection down; every other variant leaves the client usable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    /// Malformed RESP on the wire. The reply is flushed, then the socket
    /// closes.
    #[error("ERR Protocol error: {0}")]
    Protocol(String),

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    #[error("ERR value is not a valid float")]
    NotFloat,

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR {0}")]
    OutOfRange(&'static str),

    #[error("ERR no such key")]
    NoSuchKey,

    #[error("BUSYGROUP Consumer Group name already exists")]
    BusyGroup,

    #[error("NOGROUP No such consumer group '{group}' for key name '{key}'")]
    NoGroup { group: String, key: String },

    #[error("BUSYKEY Target key name already exists.")]
    BusyKey,

    #[error("MOVED {slot} {addr}")]
    Moved { slot: u16, addr: String },

    #[error("CROSSSLOT Keys in request don't hash to the same slot")]
    CrossSlot,

    #[error("CLUSTERDOWN Hash slot not served")]
    ClusterDown,

    #[error("EXECABORT Transaction discarded because of previous errors.")]
    ExecAbort,

    #[error("NOAUTH Authentication required.")]
    AuthRequired,

    /// Free-form `ERR`-kind failure whose message is already user facing.
    #[error("ERR {0}")]
    Other(String),

    /// Invariant violation that must not leak details to the client.
    #[error("ERR internal error")]
    Internal,
}

impl CommandError {
    pub fn other(msg: impl Into<String>) -> Self {
        CommandError::Other(msg.into())
    }

    /// Whether the connection must be closed after the error reply.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CommandError::Protocol(_))
    }
}

pub type CommandResult<T> = Result<T, CommandError>;
