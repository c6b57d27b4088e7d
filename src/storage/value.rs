// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;

use crate::storage::{
    hash::HashValue, hll::HyperLogLog, quicklist::QuickList, set::SetValue,
    stream::Stream, zset::SortedSet,
};

/// Type tag exposed through TYPE and used for WRONGTYPE checks.
///
/// A HyperLogLog reports itself as a string, matching the observable
/// behavior of the original implementation, but commands still refuse to
/// mix the two representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Str,
    List,
    Hash,
    Set,
    ZSet,
    Stream,
    Hll,
}

impl TypeTag {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::Str | TypeTag::Hll => "string",
            TypeTag::List => "list",
            TypeTag::Hash => "hash",
            TypeTag::Set => "set",
            TypeTag::ZSet => "zset",
            TypeTag::Stream => "stream",
        }
    }
}

/// One keyspace value: a tagged sum over the concrete representations.
/// Values never point back at their key, database or server.
#[derive(Debug, Clone)]
pub enum Value {
    Str(Bytes),
    List(QuickList),
    Hash(HashValue),
    Set(SetValue),
    ZSet(SortedSet),
    Stream(Stream),
    Hll(HyperLogLog),
}

impl Value {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Str(_) => TypeTag::Str,
            Value::List(_) => TypeTag::List,
            Value::Hash(_) => TypeTag::Hash,
            Value::Set(_) => TypeTag::Set,
            Value::ZSet(_) => TypeTag::ZSet,
            Value::Stream(_) => TypeTag::Stream,
            Value::Hll(_) => TypeTag::Hll,
        }
    }

    /// Encoding label for DEBUG OBJECT.
    pub fn encoding_name(&self) -> &'static str {
        match self {
            Value::Str(s) => {
                if s.len() <= 20
                    && std::str::from_utf8(s).is_ok_and(|t| t.parse::<i64>().is_ok())
                {
                    "int"
                } else if s.len() <= 44 {
                    "embstr"
                } else {
                    "raw"
                }
            },
            Value::List(_) => "quicklist",
            Value::Hash(h) => h.encoding_name(),
            Value::Set(s) => s.encoding_name(),
            Value::ZSet(_) => "skiplist",
            Value::Stream(_) => "stream",
            Value::Hll(_) => "raw",
        }
    }

    /// A container that drained to zero elements must have its key removed
    /// by the caller; strings and HLLs never self-empty.
    pub fn is_drained(&self, now_ms: u64) -> bool {
        match self {
            Value::Str(_) | Value::Hll(_) => false,
            Value::List(l) => l.is_empty(),
            Value::Hash(h) => h.is_empty(now_ms),
            Value::Set(s) => s.is_empty(),
            Value::ZSet(z) => z.is_empty(),
            Value::Stream(_) => false,
        }
    }
}
