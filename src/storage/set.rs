// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Unordered set of binary members with a compact integer representation.
//!
//! While every member parses as an i64 and the cardinality stays under the
//! configured cap, members live in an [`IntSet`]. The first non-integer
//! member or a cardinality overflow converts the whole set to a hash table
//! in one pass; conversion is one-way.

use std::collections::HashSet;

use bytes::Bytes;
use rand::RngExt;

use crate::storage::intset::IntSet;

#[derive(Debug, Clone)]
pub enum SetValue {
    Ints { set: IntSet, max_entries: usize },
    Hash(HashSet<Bytes>),
}

/// Strict integer parse used to decide intset eligibility: no leading
/// zeroes, no whitespace, same rules as the INCR family.
pub fn parse_set_int(member: &[u8]) -> Option<i64> {
    let s = std::str::from_utf8(member).ok()?;
    if s.is_empty() || (s.len() > 1 && (s.starts_with('0') || s.starts_with("-0"))) {
        return None;
    }
    s.parse::<i64>().ok()
}

fn int_to_bytes(v: i64) -> Bytes {
    Bytes::from(v.to_string())
}

impl SetValue {
    pub fn new(max_entries: usize) -> Self {
        SetValue::Ints {
            set: IntSet::new(),
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SetValue::Ints { set, .. } => set.len(),
            SetValue::Hash(h) => h.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn encoding_name(&self) -> &'static str {
        match self {
            SetValue::Ints { .. } => "intset",
            SetValue::Hash(_) => "hashtable",
        }
    }

    fn convert_to_hash(&mut self) {
        if let SetValue::Ints { set, .. } = self {
            let members: HashSet<Bytes> = set.iter().map(int_to_bytes).collect();
            *self = SetValue::Hash(members);
        }
    }

    /// Returns true when the member was newly added.
    pub fn insert(&mut self, member: &Bytes) -> bool {
        match self {
            SetValue::Ints { set, max_entries } => match parse_set_int(member) {
                Some(v) if set.len() < *max_entries || set.contains(v) => set.insert(v),
                _ => {
                    self.convert_to_hash();
                    self.insert(member)
                },
            },
            SetValue::Hash(h) => h.insert(member.clone()),
        }
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self {
            SetValue::Ints { set, .. } => match parse_set_int(member) {
                Some(v) => set.remove(v),
                None => false,
            },
            SetValue::Hash(h) => h.remove(member),
        }
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        match self {
            SetValue::Ints { set, .. } => {
                parse_set_int(member).is_some_and(|v| set.contains(v))
            },
            SetValue::Hash(h) => h.contains(member),
        }
    }

    pub fn members(&self) -> Vec<Bytes> {
        match self {
            SetValue::Ints { set, .. } => set.iter().map(int_to_bytes).collect(),
            SetValue::Hash(h) => h.iter().cloned().collect(),
        }
    }

    /// Removes and returns up to `count` arbitrary members.
    pub fn pop(&mut self, count: usize) -> Vec<Bytes> {
        let mut out = Vec::with_capacity(count.min(self.len()));
        match self {
            SetValue::Ints { set, .. } => {
                for _ in 0..count {
                    if set.is_empty() {
                        break;
                    }
                    let idx = rand::rng().random_range(0..set.len());
                    if let Some(v) = set.get(idx) {
                        set.remove(v);
                        out.push(int_to_bytes(v));
                    }
                }
            },
            SetValue::Hash(h) => {
                for _ in 0..count {
                    let Some(pick) = pick_random(h) else { break };
                    h.remove(&pick);
                    out.push(pick);
                }
            },
        }
        out
    }

    /// Random members without removal; repeats are allowed when
    /// `allow_repeats` (negative SRANDMEMBER count).
    pub fn random_members(&self, count: usize, allow_repeats: bool) -> Vec<Bytes> {
        if self.is_empty() {
            return Vec::new();
        }
        if allow_repeats {
            let mut out = Vec::with_capacity(count);
            for _ in 0..count {
                if let Some(m) = self.random_member() {
                    out.push(m);
                }
            }
            out
        } else {
            let mut all = self.members();
            shuffle(&mut all);
            all.truncate(count);
            all
        }
    }

    pub fn random_member(&self) -> Option<Bytes> {
        match self {
            SetValue::Ints { set, .. } => {
                if set.is_empty() {
                    return None;
                }
                let idx = rand::rng().random_range(0..set.len());
                set.get(idx).map(int_to_bytes)
            },
            SetValue::Hash(h) => pick_random(h),
        }
    }
}

fn pick_random(h: &HashSet<Bytes>) -> Option<Bytes> {
    if h.is_empty() {
        return None;
    }
    let nth = rand::rng().random_range(0..h.len());
    h.iter().nth(nth).cloned()
}

fn shuffle(items: &mut [Bytes]) {
    let mut rng = rand::rng();
    for i in (1..items.len()).rev() {
        let j = rng.random_range(0..=i);
        items.swap(i, j);
    }
}
