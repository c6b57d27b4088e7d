// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;

use crate::resp::frame::{Frame, ProtocolError};

/// Longest accepted bulk payload (512 MiB).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;
/// Most elements accepted in one array frame.
pub const MAX_ARRAY_LEN: usize = 1 << 20;
/// Longest accepted legacy inline command line.
pub const MAX_INLINE_LEN: usize = 64 * 1024;

const MAX_DEPTH: usize = 32;

/// Attempts to decode one frame from the front of `src`.
///
/// Returns `Ok(Some((frame, consumed)))` on success, `Ok(None)` when the
/// buffer holds only a prefix of a frame, and `Err` on malformed input.
/// Nothing is committed on the `None` path, so the caller re-parses the same
/// bytes once more arrive.
pub fn parse(src: &[u8]) -> Result<Option<(Frame, usize)>, ProtocolError> {
    let mut cur = Cursor { src, pos: 0 };
    match cur.parse_frame(0)? {
        Some(frame) => Ok(Some((frame, cur.pos))),
        None => Ok(None),
    }
}

struct Cursor<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn parse_frame(&mut self, depth: usize) -> Result<Option<Frame>, ProtocolError> {
        if depth > MAX_DEPTH {
            return Err(ProtocolError::new("nesting too deep"));
        }
        let Some(&first) = self.src.get(self.pos) else {
            return Ok(None);
        };

        match first {
            b'+' => {
                let Some(line) = self.take_line(1)? else {
                    return Ok(None);
                };
                let s = String::from_utf8_lossy(line).into_owned();
                Ok(Some(Frame::Simple(s)))
            },
            b'-' => {
                let Some(line) = self.take_line(1)? else {
                    return Ok(None);
                };
                let s = String::from_utf8_lossy(line).into_owned();
                Ok(Some(Frame::Error(s)))
            },
            b':' => {
                let Some(line) = self.take_line(1)? else {
                    return Ok(None);
                };
                let n = parse_int(line)?;
                Ok(Some(Frame::Integer(n)))
            },
            b'$' => self.parse_bulk(),
            b'*' => self.parse_array(depth),
            _ => self.parse_inline(),
        }
    }

    fn parse_bulk(&mut self) -> Result<Option<Frame>, ProtocolError> {
        let start = self.pos;
        let Some(line) = self.take_line(1)? else {
            return Ok(None);
        };
        let len = parse_int(line)?;
        if len == -1 {
            return Ok(Some(Frame::Bulk(None)));
        }
        if len < 0 {
            return Err(ProtocolError::new("invalid bulk length"));
        }
        let len = len as usize;
        if len > MAX_BULK_LEN {
            return Err(ProtocolError::new("invalid bulk length"));
        }

        if self.src.len() < self.pos + len + 2 {
            self.pos = start;
            return Ok(None);
        }
        let data = Bytes::copy_from_slice(&self.src[self.pos..self.pos + len]);
        if &self.src[self.pos + len..self.pos + len + 2] != b"\r\n" {
            return Err(ProtocolError::new("expected CRLF after bulk payload"));
        }
        self.pos += len + 2;
        Ok(Some(Frame::Bulk(Some(data))))
    }

    fn parse_array(&mut self, depth: usize) -> Result<Option<Frame>, ProtocolError> {
        let start = self.pos;
        let Some(line) = self.take_line(1)? else {
            return Ok(None);
        };
        let len = parse_int(line)?;
        if len == -1 {
            return Ok(Some(Frame::Array(None)));
        }
        if len < 0 {
            return Err(ProtocolError::new("invalid multibulk length"));
        }
        let len = len as usize;
        if len > MAX_ARRAY_LEN {
            return Err(ProtocolError::new("invalid multibulk length"));
        }

        let mut items = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            match self.parse_frame(depth + 1)? {
                Some(frame) => items.push(frame),
                None => {
                    self.pos = start;
                    return Ok(None);
                },
            }
        }
        Ok(Some(Frame::Array(Some(items))))
    }

    /// Legacy inline commands: a bare line is whitespace-split into an array
    /// of bulk strings.
    fn parse_inline(&mut self) -> Result<Option<Frame>, ProtocolError> {
        let rest = &self.src[self.pos..];
        let Some(nl) = rest.iter().position(|&b| b == b'\n') else {
            if rest.len() > MAX_INLINE_LEN {
                return Err(ProtocolError::new("too big inline request"));
            }
            return Ok(None);
        };
        if nl > MAX_INLINE_LEN {
            return Err(ProtocolError::new("too big inline request"));
        }

        let mut line = &rest[..nl];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }

        let items = line
            .split(|b| b.is_ascii_whitespace())
            .filter(|tok| !tok.is_empty())
            .map(|tok| Frame::Bulk(Some(Bytes::copy_from_slice(tok))))
            .collect::<Vec<_>>();

        self.pos += nl + 1;
        Ok(Some(Frame::Array(Some(items))))
    }

    /// Consumes `skip` prefix bytes plus one CRLF-terminated line, returning
    /// the line body without the terminator.
    fn take_line(&mut self, skip: usize) -> Result<Option<&'a [u8]>, ProtocolError> {
        let begin = self.pos + skip;
        let rest = match self.src.get(begin..) {
            Some(r) => r,
            None => return Ok(None),
        };
        let Some(nl) = rest.iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };
        if nl == 0 || rest[nl - 1] != b'\r' {
            return Err(ProtocolError::new("expected CRLF terminator"));
        }
        self.pos = begin + nl + 1;
        Ok(Some(&rest[..nl - 1]))
    }
}

fn parse_int(line: &[u8]) -> Result<i64, ProtocolError> {
    if line.is_empty() {
        return Err(ProtocolError::new("expected integer, got empty line"));
    }
    let s = std::str::from_utf8(line)
        .map_err(|_| ProtocolError::new("expected ASCII integer"))?;
    s.parse::<i64>()
        .map_err(|_| ProtocolError::new(format!("invalid integer '{s}'")))
}
