// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::{BufMut, BytesMut};

use crate::resp::frame::Frame;

/// Serializes one frame into `dst`.
///
/// Pure with respect to the frame; appends without clearing so a pipeline of
/// replies lands in a single buffer.
pub fn encode(frame: &Frame, dst: &mut BytesMut) {
    match frame {
        Frame::Simple(s) => {
            dst.put_u8(b'+');
            dst.put_slice(s.as_bytes());
            dst.put_slice(b"\r\n");
        },
        Frame::Error(s) => {
            dst.put_u8(b'-');
            dst.put_slice(s.as_bytes());
            dst.put_slice(b"\r\n");
        },
        Frame::Integer(n) => {
            dst.put_u8(b':');
            put_i64(*n, dst);
            dst.put_slice(b"\r\n");
        },
        Frame::Bulk(None) => dst.put_slice(b"$-1\r\n"),
        Frame::Bulk(Some(data)) => {
            dst.put_u8(b'$');
            put_i64(data.len() as i64, dst);
            dst.put_slice(b"\r\n");
            dst.put_slice(data);
            dst.put_slice(b"\r\n");
        },
        Frame::Array(None) => dst.put_slice(b"*-1\r\n"),
        Frame::Array(Some(items)) => {
            dst.put_u8(b'*');
            put_i64(items.len() as i64, dst);
            dst.put_slice(b"\r\n");
            for item in items {
                encode(item, dst);
            }
        },
    }
}

fn put_i64(n: i64, dst: &mut BytesMut) {
    let mut buf = [0u8; 24];
    let mut cur = std::io::Cursor::new(&mut buf[..]);
    // i64::MIN is 20 digits plus sign; the 24-byte buffer cannot overflow.
    use std::io::Write;
    let _ = write!(cur, "{n}");
    let len = cur.position() as usize;
    dst.put_slice(&buf[..len]);
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::resp::parser::parse;

    fn encoded(frame: &Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        encode(frame, &mut buf);
        buf
    }

    #[test]
    fn canonical_encodings() {
        assert_eq!(&encoded(&Frame::ok())[..], b"+OK\r\n");
        assert_eq!(&encoded(&Frame::Integer(-42))[..], b":-42\r\n");
        assert_eq!(&encoded(&Frame::null())[..], b"$-1\r\n");
        assert_eq!(&encoded(&Frame::null_array())[..], b"*-1\r\n");
        assert_eq!(
            &encoded(&Frame::bulk_from_str("hey"))[..],
            b"$3\r\nhey\r\n"
        );
    }

    #[test]
    fn encode_decode_round_trip() {
        let frames = vec![
            Frame::Simple("PONG".to_string()),
            Frame::Error("ERR oops".to_string()),
            Frame::Integer(i64::MIN),
            Frame::bulk(&b"\x00binary\xff"[..]),
            Frame::null(),
            Frame::array(vec![
                Frame::Integer(1),
                Frame::array(vec![Frame::bulk_from_str("nested")]),
                Frame::null_array(),
            ]),
        ];
        for frame in frames {
            let buf = encoded(&frame);
            let (decoded, used) = parse(&buf).expect("parse").expect("complete");
            assert_eq!(decoded, frame);
            assert_eq!(used, buf.len());
        }
    }
}
