// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Hash value: field/value mapping with a sparse per-field expiry index.
//!
//! Small hashes are a listpack of alternating field and value entries; the
//! representation converts to a hash table when the entry count or any
//! field/value length crosses the configured thresholds, and never converts
//! back. Field TTLs live in a parallel map so fields without one cost
//! nothing extra on the read path.

use std::collections::HashMap;

use bytes::Bytes;

use crate::storage::listpack::ListPack;

#[derive(Debug, Clone)]
enum HashRepr {
    Pack(ListPack),
    Map(HashMap<Bytes, Bytes>),
}

/// Reply shape for HTTL/HPTTL: distinguishes a missing field from a field
/// without expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTtl {
    NoField,
    NoTtl,
    ExpiresAtMs(u64),
}

#[derive(Debug, Clone)]
pub struct HashValue {
    repr: HashRepr,
    /// field -> absolute unix-ms deadline. Sparse: only fields with a TTL.
    ttls: HashMap<Bytes, u64>,
    max_entries: usize,
    max_value: usize,
}

impl HashValue {
    pub fn new(max_entries: usize, max_value: usize) -> Self {
        Self {
            repr: HashRepr::Pack(ListPack::new()),
            ttls: HashMap::new(),
            max_entries,
            max_value,
        }
    }

    pub fn encoding_name(&self) -> &'static str {
        match &self.repr {
            HashRepr::Pack(_) => "listpack",
            HashRepr::Map(_) => "hashtable",
        }
    }

    fn field_expired(&self, field: &[u8], now_ms: u64) -> bool {
        self.ttls.get(field).is_some_and(|&at| at <= now_ms)
    }

    /// Live field count; expired-but-unreaped fields are not counted.
    pub fn len(&self, now_ms: u64) -> usize {
        let raw = match &self.repr {
            HashRepr::Pack(lp) => lp.len() / 2,
            HashRepr::Map(m) => m.len(),
        };
        let dead = self
            .ttls
            .iter()
            .filter(|&(f, &at)| at <= now_ms && self.raw_contains(f))
            .count();
        raw - dead
    }

    pub fn is_empty(&self, now_ms: u64) -> bool {
        self.len(now_ms) == 0
    }

    fn raw_contains(&self, field: &[u8]) -> bool {
        match &self.repr {
            HashRepr::Pack(lp) => {
                let mut it = lp.iter();
                while let Some(f) = it.next() {
                    let _v = it.next();
                    if f == field {
                        return true;
                    }
                }
                false
            },
            HashRepr::Map(m) => m.contains_key(field),
        }
    }

    pub fn get(&self, field: &[u8], now_ms: u64) -> Option<Bytes> {
        if self.field_expired(field, now_ms) {
            return None;
        }
        match &self.repr {
            HashRepr::Pack(lp) => {
                let mut it = lp.iter();
                while let Some(f) = it.next() {
                    let v = it.next()?;
                    if f == field {
                        return Some(Bytes::copy_from_slice(v));
                    }
                }
                None
            },
            HashRepr::Map(m) => m.get(field).cloned(),
        }
    }

    pub fn contains(&self, field: &[u8], now_ms: u64) -> bool {
        !self.field_expired(field, now_ms) && self.raw_contains(field)
    }

    fn maybe_convert(&mut self, field: &[u8], value: &[u8]) {
        let convert = match &self.repr {
            HashRepr::Pack(lp) => {
                lp.len() / 2 >= self.max_entries
                    || field.len() > self.max_value
                    || value.len() > self.max_value
            },
            HashRepr::Map(_) => false,
        };
        if convert && let HashRepr::Pack(lp) = &self.repr {
            let mut map = HashMap::with_capacity(lp.len() / 2 + 1);
            let mut it = lp.iter();
            while let Some(f) = it.next() {
                if let Some(v) = it.next() {
                    map.insert(
                        Bytes::copy_from_slice(f),
                        Bytes::copy_from_slice(v),
                    );
                }
            }
            self.repr = HashRepr::Map(map);
        }
    }

    /// Sets a field, returning true when it was newly created. Overwriting
    /// discards any TTL the field carried.
    pub fn set(&mut self, field: Bytes, value: Bytes, now_ms: u64) -> bool {
        // An expired field is logically absent; reap it first so the write
        // counts as a create.
        if self.field_expired(&field, now_ms) {
            self.remove(&field, now_ms);
        }
        self.maybe_convert(&field, &value);
        self.ttls.remove(&field);
        match &mut self.repr {
            HashRepr::Pack(lp) => {
                let mut idx = 0;
                let mut found = None;
                let mut it = lp.iter();
                while let Some(f) = it.next() {
                    let _ = it.next();
                    if f == &field[..] {
                        found = Some(idx);
                        break;
                    }
                    idx += 1;
                }
                drop(it);
                match found {
                    Some(i) => {
                        lp.replace(i * 2 + 1, &value);
                        false
                    },
                    None => {
                        lp.push_back(&field);
                        lp.push_back(&value);
                        true
                    },
                }
            },
            HashRepr::Map(m) => m.insert(field, value).is_none(),
        }
    }

    pub fn remove(&mut self, field: &[u8], now_ms: u64) -> bool {
        let expired = self.field_expired(field, now_ms);
        self.ttls.remove(field);
        let removed = match &mut self.repr {
            HashRepr::Pack(lp) => {
                let mut idx = 0;
                let mut found = None;
                {
                    let mut it = lp.iter();
                    while let Some(f) = it.next() {
                        let _ = it.next();
                        if f == field {
                            found = Some(idx);
                            break;
                        }
                        idx += 1;
                    }
                }
                match found {
                    Some(i) => {
                        lp.remove(i * 2);
                        lp.remove(i * 2);
                        true
                    },
                    None => false,
                }
            },
            HashRepr::Map(m) => m.remove(field).is_some(),
        };
        removed && !expired
    }

    /// Live (field, value) pairs.
    pub fn items(&self, now_ms: u64) -> Vec<(Bytes, Bytes)> {
        match &self.repr {
            HashRepr::Pack(lp) => {
                let mut out = Vec::with_capacity(lp.len() / 2);
                let mut it = lp.iter();
                while let Some(f) = it.next() {
                    let Some(v) = it.next() else { break };
                    if !self.field_expired(f, now_ms) {
                        out.push((
                            Bytes::copy_from_slice(f),
                            Bytes::copy_from_slice(v),
                        ));
                    }
                }
                out
            },
            HashRepr::Map(m) => m
                .iter()
                .filter(|(f, _)| !self.field_expired(f, now_ms))
                .map(|(f, v)| (f.clone(), v.clone()))
                .collect(),
        }
    }

    /// Arms a TTL on an existing live field.
    pub fn set_expire(&mut self, field: &[u8], at_ms: u64, now_ms: u64) -> bool {
        if !self.contains(field, now_ms) {
            return false;
        }
        self.ttls.insert(Bytes::copy_from_slice(field), at_ms);
        true
    }

    /// Drops a TTL; false when the field is missing or had none.
    pub fn persist(&mut self, field: &[u8], now_ms: u64) -> bool {
        if self.field_expired(field, now_ms) {
            return false;
        }
        self.ttls.remove(field).is_some()
    }

    pub fn ttl(&self, field: &[u8], now_ms: u64) -> FieldTtl {
        if !self.contains(field, now_ms) {
            return FieldTtl::NoField;
        }
        match self.ttls.get(field) {
            Some(&at) => FieldTtl::ExpiresAtMs(at),
            None => FieldTtl::NoTtl,
        }
    }

    /// Reaps every expired field; returns the number removed. The caller
    /// deletes the key when the hash ends up empty.
    pub fn reap_expired(&mut self, now_ms: u64) -> usize {
        let dead: Vec<Bytes> = self
            .ttls
            .iter()
            .filter(|&(_, &at)| at <= now_ms)
            .map(|(f, _)| f.clone())
            .collect();
        for field in &dead {
            self.remove(field, now_ms);
        }
        dead.len()
    }

    /// Earliest field deadline, if any; drives opportunistic reaping.
    pub fn next_deadline(&self) -> Option<u64> {
        self.ttls.values().copied().min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000_000;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    fn hash() -> HashValue {
        HashValue::new(128, 64)
    }

    #[test]
    fn set_get_overwrite() {
        let mut h = hash();
        assert!(h.set(b("f"), b("v1"), T0));
        assert!(!h.set(b("f"), b("v2"), T0));
        assert_eq!(h.get(b"f", T0), Some(b("v2")));
        assert_eq!(h.len(T0), 1);
        assert!(h.remove(b"f", T0));
        assert!(!h.remove(b"f", T0));
        assert!(h.is_empty(T0));
    }

    #[test]
    fn listpack_converts_on_long_value() {
        let mut h = hash();
        h.set(b("short"), b("v"), T0);
        assert_eq!(h.encoding_name(), "listpack");
        let long = "x".repeat(100);
        h.set(b("field"), Bytes::from(long), T0);
        assert_eq!(h.encoding_name(), "hashtable");
        assert_eq!(h.get(b"short", T0), Some(b("v")));
    }

    #[test]
    fn listpack_converts_on_entry_count() {
        let mut h = HashValue::new(4, 64);
        for i in 0..5 {
            h.set(Bytes::from(format!("f{i}")), b("v"), T0);
        }
        assert_eq!(h.encoding_name(), "hashtable");
        assert_eq!(h.len(T0), 5);
    }

    #[test]
    fn expired_field_is_absent() {
        let mut h = hash();
        h.set(b("f"), b("v"), T0);
        assert!(h.set_expire(b"f", T0 + 1000, T0));
        assert_eq!(h.ttl(b"f", T0), FieldTtl::ExpiresAtMs(T0 + 1000));
        // Past the deadline the field is gone without a reap pass.
        assert_eq!(h.get(b"f", T0 + 1001), None);
        assert!(!h.contains(b"f", T0 + 1001));
        assert_eq!(h.ttl(b"f", T0 + 1001), FieldTtl::NoField);
        assert_eq!(h.len(T0 + 1001), 0);
    }

    #[test]
    fn overwrite_clears_field_ttl() {
        let mut h = hash();
        h.set(b("f"), b("v"), T0);
        h.set_expire(b"f", T0 + 1000, T0);
        h.set(b("f"), b("v2"), T0);
        assert_eq!(h.ttl(b"f", T0), FieldTtl::NoTtl);
        assert_eq!(h.get(b"f", T0 + 5000), Some(b("v2")));
    }

    #[test]
    fn persist_drops_ttl() {
        let mut h = hash();
        h.set(b("f"), b("v"), T0);
        assert!(!h.persist(b"f", T0));
        h.set_expire(b"f", T0 + 1000, T0);
        assert!(h.persist(b"f", T0));
        assert_eq!(h.ttl(b"f", T0), FieldTtl::NoTtl);
    }

    #[test]
    fn reap_expired_counts() {
        let mut h = hash();
        h.set(b("a"), b("1"), T0);
        h.set(b("b"), b("2"), T0);
        h.set(b("c"), b("3"), T0);
        h.set_expire(b"a", T0 + 10, T0);
        h.set_expire(b"b", T0 + 10_000, T0);
        assert_eq!(h.reap_expired(T0 + 100), 1);
        assert_eq!(h.len(T0 + 100), 2);
        assert_eq!(h.next_deadline(), Some(T0 + 10_000));
    }

    #[test]
    fn expired_field_rewrite_counts_as_create() {
        let mut h = hash();
        h.set(b("f"), b("v"), T0);
        h.set_expire(b"f", T0 + 10, T0);
        assert!(h.set(b("f"), b("v2"), T0 + 100));
    }
}
