// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! One numbered database: key map, expiry index and per-key write
//! versions.
//!
//! Expired keys are reclaimed on two paths. Reads check the expiry index
//! first and delete a dead key before answering (lazy). The server's
//! expiration cycle samples random entries from the index on a timer
//! (active). Either way a key whose deadline passed is never observable.
//!
//! Every write bumps the key's version counter; WATCH records the version
//! it saw and EXEC aborts when any recorded version moved. That realizes
//! watch invalidation without the database holding client references.

use std::collections::HashMap;

use bytes::Bytes;
use rand::RngExt;

use crate::storage::{
    glob::glob_match,
    hll::hll_hash,
    value::{TypeTag, Value},
};

#[derive(Debug, Default)]
pub struct Db {
    map: HashMap<Bytes, Value>,
    /// key -> absolute unix-ms deadline.
    expires: HashMap<Bytes, u64>,
    /// key -> write version; survives deletion so WATCH sees re-creates.
    versions: HashMap<Bytes, u64>,
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl Db {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self, key: &[u8]) {
        match self.versions.get_mut(key) {
            Some(v) => *v += 1,
            None => {
                self.versions.insert(Bytes::copy_from_slice(key), 1);
            },
        }
    }

    pub fn version(&self, key: &[u8]) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    /// Records an in-place mutation done through `get_mut`.
    pub fn touch(&mut self, key: &[u8]) {
        self.bump(key);
    }

    fn expired(&self, key: &[u8], now_ms: u64) -> bool {
        self.expires.get(key).is_some_and(|&at| at <= now_ms)
    }

    /// Lazy reclamation; true when the key was dead and has been removed.
    fn evict_if_expired(&mut self, key: &[u8], now_ms: u64) -> bool {
        if self.expired(key, now_ms) {
            self.map.remove(key);
            self.expires.remove(key);
            self.bump(key);
            true
        } else {
            false
        }
    }

    pub fn get(&mut self, key: &[u8], now_ms: u64) -> Option<&Value> {
        self.evict_if_expired(key, now_ms);
        self.map.get(key)
    }

    pub fn get_mut(&mut self, key: &[u8], now_ms: u64) -> Option<&mut Value> {
        self.evict_if_expired(key, now_ms);
        self.map.get_mut(key)
    }

    pub fn set(&mut self, key: Bytes, value: Value) {
        self.expires.remove(&key);
        self.bump(&key);
        self.map.insert(key, value);
    }

    /// Insert preserving any TTL the key carries (SETRANGE/APPEND path and
    /// SET KEEPTTL).
    pub fn set_keep_ttl(&mut self, key: Bytes, value: Value) {
        self.bump(&key);
        self.map.insert(key, value);
    }

    pub fn remove(&mut self, key: &[u8], now_ms: u64) -> Option<Value> {
        if self.evict_if_expired(key, now_ms) {
            return None;
        }
        self.expires.remove(key);
        let old = self.map.remove(key);
        if old.is_some() {
            self.bump(key);
        }
        old
    }

    pub fn exists(&mut self, key: &[u8], now_ms: u64) -> bool {
        self.evict_if_expired(key, now_ms);
        self.map.contains_key(key)
    }

    pub fn type_of(&mut self, key: &[u8], now_ms: u64) -> Option<TypeTag> {
        self.get(key, now_ms).map(Value::type_tag)
    }

    /// Deletes the key when its container value drained to empty; the
    /// write-path epilogue for list/hash/set/zset mutations.
    pub fn drop_if_drained(&mut self, key: &[u8], now_ms: u64) -> bool {
        let drained = self
            .map
            .get(key)
            .is_some_and(|v| v.is_drained(now_ms));
        if drained {
            self.map.remove(key);
            self.expires.remove(key);
            self.bump(key);
        }
        drained
    }

    pub fn rename(
        &mut self,
        from: &[u8],
        to: Bytes,
        now_ms: u64,
    ) -> Result<(), ()> {
        self.evict_if_expired(from, now_ms);
        let Some(value) = self.map.remove(from) else {
            return Err(());
        };
        let ttl = self.expires.remove(from);
        self.bump(from);
        self.bump(&to);
        self.expires.remove(&to);
        if let Some(at) = ttl {
            self.expires.insert(to.clone(), at);
        }
        self.map.insert(to, value);
        Ok(())
    }

    /// COPY within one database; TTL travels with the value.
    pub fn copy(
        &mut self,
        src: &[u8],
        dst: Bytes,
        replace: bool,
        now_ms: u64,
    ) -> Result<bool, bool> {
        self.evict_if_expired(src, now_ms);
        self.evict_if_expired(&dst, now_ms);
        let Some(value) = self.map.get(src).cloned() else {
            return Ok(false);
        };
        if self.map.contains_key(&dst) && !replace {
            return Err(true);
        }
        let ttl = self.expires.get(src).copied();
        self.bump(&dst);
        self.expires.remove(&dst);
        if let Some(at) = ttl {
            self.expires.insert(dst.clone(), at);
        }
        self.map.insert(dst, value);
        Ok(true)
    }

    // ── expiry ─────────────────────────────────────────────────────────

    pub fn set_expire(&mut self, key: &[u8], at_ms: u64, now_ms: u64) -> bool {
        self.evict_if_expired(key, now_ms);
        if !self.map.contains_key(key) {
            return false;
        }
        self.bump(key);
        self.expires.insert(Bytes::copy_from_slice(key), at_ms);
        true
    }

    pub fn persist(&mut self, key: &[u8], now_ms: u64) -> bool {
        self.evict_if_expired(key, now_ms);
        if !self.map.contains_key(key) {
            return false;
        }
        let had = self.expires.remove(key).is_some();
        if had {
            self.bump(key);
        }
        had
    }

    /// Absolute deadline, if armed.
    pub fn expire_at(&mut self, key: &[u8], now_ms: u64) -> Option<u64> {
        self.evict_if_expired(key, now_ms);
        self.expires.get(key).copied()
    }

    /// One active-cycle sampling round: inspect up to `samples` random
    /// entries of the expiry index, reclaim the dead ones. Returns
    /// (sampled, reclaimed).
    pub fn expire_sample(&mut self, samples: usize, now_ms: u64) -> (usize, usize) {
        if self.expires.is_empty() {
            return (0, 0);
        }
        // Reservoir-sample the index in one pass.
        let mut rng = rand::rng();
        let mut picked: Vec<Bytes> = Vec::with_capacity(samples);
        for (i, key) in self.expires.keys().enumerate() {
            if picked.len() < samples {
                picked.push(key.clone());
            } else {
                let j = rng.random_range(0..=i);
                if j < samples {
                    picked[j] = key.clone();
                }
            }
        }
        let sampled = picked.len();
        let mut reclaimed = 0;
        for key in picked {
            if self.evict_if_expired(&key, now_ms) {
                reclaimed += 1;
            }
        }
        (sampled, reclaimed)
    }

    // ── iteration ──────────────────────────────────────────────────────

    /// Live key count.
    pub fn len(&self, now_ms: u64) -> usize {
        self.map
            .keys()
            .filter(|k| !self.expired(k, now_ms))
            .count()
    }

    pub fn is_empty(&self, now_ms: u64) -> bool {
        self.len(now_ms) == 0
    }

    pub fn flush(&mut self) -> usize {
        let n = self.map.len();
        let keys: Vec<Bytes> = self.map.keys().cloned().collect();
        for key in keys {
            self.bump(&key);
        }
        self.map.clear();
        self.expires.clear();
        n
    }

    pub fn keys_matching(&self, pattern: &[u8], now_ms: u64) -> Vec<Bytes> {
        self.map
            .keys()
            .filter(|k| !self.expired(k, now_ms) && glob_match(pattern, k))
            .cloned()
            .collect()
    }

    pub fn iter_keys(&self, now_ms: u64) -> impl Iterator<Item = &Bytes> {
        self.map.keys().filter(move |k| !self.expired(k, now_ms))
    }

    pub fn random_key(&self, now_ms: u64) -> Option<Bytes> {
        let live: Vec<&Bytes> = self
            .map
            .keys()
            .filter(|k| !self.expired(k, now_ms))
            .collect();
        if live.is_empty() {
            return None;
        }
        let idx = rand::rng().random_range(0..live.len());
        Some(live[idx].clone())
    }

    /// Cursor-based traversal with reverse-binary bucket ordering.
    ///
    /// The bucket space is the smallest power of two covering the current
    /// table; buckets are visited in bit-reversed order, so growing the
    /// table between calls never skips a key that was present throughout
    /// the scan. Cursor 0 terminates the traversal.
    pub fn scan(
        &self,
        cursor: u64,
        pattern: Option<&[u8]>,
        count: usize,
        now_ms: u64,
    ) -> (u64, Vec<Bytes>) {
        if self.map.is_empty() {
            return (0, Vec::new());
        }
        let nbuckets = self.map.len().next_power_of_two().max(4) as u64;
        let bits = nbuckets.trailing_zeros();
        let rev = |b: u64| b.reverse_bits() >> (64 - bits);

        // Group live keys by bucket, ordered by reversed bucket index.
        let mut buckets: Vec<(u64, Vec<Bytes>)> = Vec::new();
        {
            let mut by_bucket: HashMap<u64, Vec<Bytes>> = HashMap::new();
            for key in self.map.keys() {
                if self.expired(key, now_ms) {
                    continue;
                }
                let b = hll_hash(key) & (nbuckets - 1);
                by_bucket.entry(b).or_default().push(key.clone());
            }
            buckets.extend(by_bucket);
            buckets.sort_by_key(|(b, _)| rev(*b));
        }

        let start = rev(cursor & (nbuckets - 1));
        let mut out = Vec::new();
        let mut next_cursor = 0u64;
        for (b, keys) in buckets {
            if rev(b) < start {
                continue;
            }
            if out.len() >= count {
                next_cursor = b;
                break;
            }
            out.extend(keys);
        }
        if let Some(pat) = pattern {
            out.retain(|k| glob_match(pat, k));
        }
        (next_cursor, out)
    }
}
