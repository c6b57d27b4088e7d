// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Sorted packed array of integers with on-demand encoding upgrades.
//!
//! Members are stored little-endian at the current width (2, 4 or 8 bytes).
//! Inserting a value that does not fit the width re-packs every member at
//! the wider encoding; widths never shrink.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IntSetEncoding {
    I16,
    I32,
    I64,
}

impl IntSetEncoding {
    fn for_value(v: i64) -> Self {
        if i64::from(v as i16) == v {
            IntSetEncoding::I16
        } else if i64::from(v as i32) == v {
            IntSetEncoding::I32
        } else {
            IntSetEncoding::I64
        }
    }

    fn width(self) -> usize {
        match self {
            IntSetEncoding::I16 => 2,
            IntSetEncoding::I32 => 4,
            IntSetEncoding::I64 => 8,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntSet {
    data: Vec<u8>,
    encoding: Option<IntSetEncoding>,
}

impl IntSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        match self.encoding {
            Some(enc) => self.data.len() / enc.width(),
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn encoding(&self) -> Option<IntSetEncoding> {
        self.encoding
    }

    fn read_at(&self, idx: usize) -> i64 {
        // Caller guarantees idx < len; encoding is set once non-empty.
        let Some(enc) = self.encoding else { return 0 };
        let w = enc.width();
        let chunk = &self.data[idx * w..(idx + 1) * w];
        match enc {
            IntSetEncoding::I16 => {
                i64::from(i16::from_le_bytes([chunk[0], chunk[1]]))
            },
            IntSetEncoding::I32 => i64::from(i32::from_le_bytes([
                chunk[0], chunk[1], chunk[2], chunk[3],
            ])),
            IntSetEncoding::I64 => i64::from_le_bytes([
                chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6],
                chunk[7],
            ]),
        }
    }

    fn write_value(enc: IntSetEncoding, v: i64, out: &mut Vec<u8>) {
        match enc {
            IntSetEncoding::I16 => out.extend_from_slice(&(v as i16).to_le_bytes()),
            IntSetEncoding::I32 => out.extend_from_slice(&(v as i32).to_le_bytes()),
            IntSetEncoding::I64 => out.extend_from_slice(&v.to_le_bytes()),
        }
    }

    /// Binary search over the packed array.
    fn search(&self, v: i64) -> Result<usize, usize> {
        let mut lo = 0usize;
        let mut hi = self.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            let cur = self.read_at(mid);
            match cur.cmp(&v) {
                std::cmp::Ordering::Equal => return Ok(mid),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        Err(lo)
    }

    pub fn contains(&self, v: i64) -> bool {
        self.search(v).is_ok()
    }

    fn upgrade_to(&mut self, enc: IntSetEncoding) {
        let values: Vec<i64> = (0..self.len()).map(|i| self.read_at(i)).collect();
        let mut data = Vec::with_capacity(values.len() * enc.width());
        for v in values {
            Self::write_value(enc, v, &mut data);
        }
        self.data = data;
        self.encoding = Some(enc);
    }

    /// Returns false when the value was already present.
    pub fn insert(&mut self, v: i64) -> bool {
        let needed = IntSetEncoding::for_value(v);
        match self.encoding {
            None => self.encoding = Some(needed),
            Some(cur) if needed > cur => self.upgrade_to(needed),
            Some(_) => {},
        }
        match self.search(v) {
            Ok(_) => false,
            Err(pos) => {
                // encoding was set above.
                let Some(enc) = self.encoding else {
                    return false;
                };
                let mut entry = Vec::with_capacity(enc.width());
                Self::write_value(enc, v, &mut entry);
                let at = pos * enc.width();
                self.data.splice(at..at, entry);
                true
            },
        }
    }

    pub fn remove(&mut self, v: i64) -> bool {
        match self.search(v) {
            Ok(pos) => {
                let Some(enc) = self.encoding else {
                    return false;
                };
                let w = enc.width();
                self.data.drain(pos * w..(pos + 1) * w);
                true
            },
            Err(_) => false,
        }
    }

    pub fn get(&self, idx: usize) -> Option<i64> {
        if idx < self.len() { Some(self.read_at(idx)) } else { None }
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.len()).map(|i| self.read_at(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_sorted_unique() {
        let mut s = IntSet::new();
        for v in [5, 1, 3, 5, 2, 4, 1] {
            s.insert(v);
        }
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert_eq!(s.len(), 5);
        assert!(s.contains(3));
        assert!(!s.contains(6));
    }

    #[test]
    fn encoding_upgrades_and_never_downgrades() {
        let mut s = IntSet::new();
        s.insert(100);
        assert_eq!(s.encoding(), Some(IntSetEncoding::I16));
        s.insert(70_000);
        assert_eq!(s.encoding(), Some(IntSetEncoding::I32));
        assert!(s.contains(100));
        s.insert(1_i64 << 40);
        assert_eq!(s.encoding(), Some(IntSetEncoding::I64));
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![100, 70_000, 1_i64 << 40]);

        s.remove(1_i64 << 40);
        s.remove(70_000);
        assert_eq!(s.encoding(), Some(IntSetEncoding::I64));
    }

    #[test]
    fn negative_boundaries() {
        let mut s = IntSet::new();
        s.insert(i64::MIN);
        s.insert(i64::MAX);
        s.insert(0);
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![i64::MIN, 0, i64::MAX]);
        assert!(s.remove(i64::MIN));
        assert!(!s.remove(i64::MIN));
        assert_eq!(s.len(), 2);
    }
}
