// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;
use thiserror::Error;

/// Malformed RESP input. The message is surfaced to the client as
/// `ERR Protocol error: ...` and the connection is closed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ProtocolError(pub String);

impl ProtocolError {
    pub fn new(msg: impl Into<String>) -> Self {
        ProtocolError(msg.into())
    }
}

/// A single RESP2 value.
///
/// An array of bulk strings is the canonical shape of a client command; every
/// other shape appears only in replies.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    /// `None` is the null bulk string (`$-1`).
    Bulk(Option<Bytes>),
    /// `None` is the null array (`*-1`).
    Array(Option<Vec<Frame>>),
}

impl Frame {
    pub fn ok() -> Frame {
        Frame::Simple("OK".to_string())
    }

    pub fn simple(s: impl Into<String>) -> Frame {
        Frame::Simple(s.into())
    }

    pub fn error(s: impl Into<String>) -> Frame {
        Frame::Error(s.into())
    }

    pub fn bulk(data: impl Into<Bytes>) -> Frame {
        Frame::Bulk(Some(data.into()))
    }

    pub fn bulk_from_str(s: impl AsRef<str>) -> Frame {
        Frame::Bulk(Some(Bytes::copy_from_slice(s.as_ref().as_bytes())))
    }

    pub fn null() -> Frame {
        Frame::Bulk(None)
    }

    pub fn null_array() -> Frame {
        Frame::Array(None)
    }

    pub fn array(items: Vec<Frame>) -> Frame {
        Frame::Array(Some(items))
    }

    /// Integer reply `:0` / `:1` from a boolean, the usual shape of
    /// membership and update counters.
    pub fn from_bool(b: bool) -> Frame {
        Frame::Integer(i64::from(b))
    }

    /// Decomposes a decoded client request into an argument vector.
    ///
    /// Only arrays of non-null bulk strings are accepted; anything else is a
    /// protocol violation on the request path.
    pub fn into_argv(self) -> Result<Vec<Bytes>, ProtocolError> {
        match self {
            Frame::Array(Some(items)) => {
                let mut argv = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Frame::Bulk(Some(data)) => argv.push(data),
                        other => {
                            return Err(ProtocolError::new(format!(
                                "expected bulk string in command, got {}",
                                other.type_name()
                            )));
                        },
                    }
                }
                Ok(argv)
            },
            Frame::Array(None) => Ok(Vec::new()),
            other => Err(ProtocolError::new(format!(
                "expected array, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Frame::Simple(_) => "simple string",
            Frame::Error(_) => "error",
            Frame::Integer(_) => "integer",
            Frame::Bulk(_) => "bulk string",
            Frame::Array(_) => "array",
        }
    }
}

impl From<i64> for Frame {
    fn from(v: i64) -> Self {
        Frame::Integer(v)
    }
}

impl From<Bytes> for Frame {
    fn from(v: Bytes) -> Self {
        Frame::Bulk(Some(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argv_accepts_bulk_array() {
        let f = Frame::array(vec![Frame::bulk_from_str("GET"), Frame::bulk_from_str("k")]);
        let argv = f.into_argv().expect("argv");
        assert_eq!(argv.len(), 2);
        assert_eq!(&argv[0][..], b"GET");
    }

    #[test]
    fn argv_rejects_nested_array() {
        let f = Frame::array(vec![Frame::array(vec![])]);
        assert!(f.into_argv().is_err());
    }
}
