// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Append-only stream of id-stamped field/value entries plus consumer
//! groups.
//!
//! Entry ids are `(milliseconds, sequence)` and strictly increase; the map
//! is ordered so range scans are simple cursor walks. Each consumer group
//! tracks its delivery frontier and a pending-entries list (PEL) of
//! delivered-but-unacknowledged ids, with a per-consumer projection.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use bytes::Bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const MAX: StreamId = StreamId { ms: u64::MAX, seq: u64::MAX };
    pub const MIN: StreamId = StreamId { ms: 0, seq: 0 };

    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    /// Smallest id strictly greater than `self`.
    pub fn successor(self) -> StreamId {
        if self.seq == u64::MAX {
            StreamId { ms: self.ms + 1, seq: 0 }
        } else {
            StreamId { ms: self.ms, seq: self.seq + 1 }
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

pub type EntryFields = Vec<(Bytes, Bytes)>;

#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub consumer: Bytes,
    pub delivery_time_ms: u64,
    pub delivery_count: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Consumer {
    pub seen_time_ms: u64,
    /// Ids this consumer owns in the group PEL.
    pub ids: BTreeSet<StreamId>,
}

#[derive(Debug, Clone)]
pub struct ConsumerGroup {
    pub last_delivered: StreamId,
    pub pel: BTreeMap<StreamId, PendingEntry>,
    pub consumers: HashMap<Bytes, Consumer>,
}

#[derive(Debug, Clone, Default)]
pub struct Stream {
    entries: BTreeMap<StreamId, EntryFields>,
    pub last_id: StreamId,
    pub max_deleted_id: StreamId,
    /// Total entries ever appended, including later-deleted ones.
    pub entries_added: u64,
    groups: HashMap<Bytes, ConsumerGroup>,
}

/// Rejected XADD ids: not strictly greater than the stream's last id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdTooSmall;

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first_id(&self) -> Option<StreamId> {
        self.entries.keys().next().copied()
    }

    pub fn last_entry_id(&self) -> Option<StreamId> {
        self.entries.keys().next_back().copied()
    }

    /// Appends an entry. `id_hint` carries what the client spelled out:
    /// `None` for `*`, `Some((ms, None))` for `ms-*`, full id otherwise.
    pub fn add(
        &mut self,
        id_hint: Option<(u64, Option<u64>)>,
        fields: EntryFields,
        now_ms: u64,
    ) -> Result<StreamId, IdTooSmall> {
        let id = match id_hint {
            None => {
                if now_ms > self.last_id.ms {
                    StreamId::new(now_ms, 0)
                } else {
                    self.last_id.successor()
                }
            },
            Some((ms, None)) => {
                if ms > self.last_id.ms {
                    StreamId::new(ms, 0)
                } else if ms == self.last_id.ms {
                    self.last_id.successor()
                } else {
                    return Err(IdTooSmall);
                }
            },
            Some((ms, Some(seq))) => StreamId::new(ms, seq),
        };

        if !self.entries.is_empty() || self.entries_added > 0 {
            if id <= self.last_id {
                return Err(IdTooSmall);
            }
        } else if id == StreamId::MIN {
            // 0-0 is never a valid entry id.
            return Err(IdTooSmall);
        }

        self.entries.insert(id, fields);
        self.last_id = id;
        self.entries_added += 1;
        Ok(id)
    }

    /// Inclusive range scan.
    pub fn range(
        &self,
        start: StreamId,
        end: StreamId,
        count: usize,
    ) -> Vec<(StreamId, EntryFields)> {
        self.entries
            .range(start..=end)
            .take(count)
            .map(|(id, fields)| (*id, fields.clone()))
            .collect()
    }

    /// Entries strictly after `after`; the XREAD shape.
    pub fn read_after(
        &self,
        after: StreamId,
        count: usize,
    ) -> Vec<(StreamId, EntryFields)> {
        if after == StreamId::MAX {
            return Vec::new();
        }
        self.range(after.successor(), StreamId::MAX, count)
    }

    pub fn get(&self, id: StreamId) -> Option<&EntryFields> {
        self.entries.get(&id)
    }

    pub fn delete(&mut self, ids: &[StreamId]) -> usize {
        let mut removed = 0;
        for id in ids {
            if self.entries.remove(id).is_some() {
                removed += 1;
                if *id > self.max_deleted_id {
                    self.max_deleted_id = *id;
                }
            }
        }
        removed
    }

    /// MAXLEN trim keeping the newest `maxlen` entries. Approximate mode
    /// removes whole blocks only, so up to a block of extra entries may
    /// survive; exact mode trims to the requested length.
    pub fn trim_maxlen(&mut self, maxlen: usize, approximate: bool) -> usize {
        const BLOCK: usize = 16;
        let mut removed = 0;
        loop {
            let excess = self.entries.len().saturating_sub(maxlen);
            if excess == 0 || (approximate && excess < BLOCK) {
                break;
            }
            let take = if approximate { BLOCK } else { excess };
            let doomed: Vec<StreamId> =
                self.entries.keys().take(take).copied().collect();
            for id in doomed {
                self.entries.remove(&id);
                if id > self.max_deleted_id {
                    self.max_deleted_id = id;
                }
                removed += 1;
            }
        }
        removed
    }

    // ── consumer groups ────────────────────────────────────────────────

    pub fn create_group(&mut self, name: Bytes, start: StreamId) -> bool {
        if self.groups.contains_key(&name) {
            return false;
        }
        self.groups.insert(
            name,
            ConsumerGroup {
                last_delivered: start,
                pel: BTreeMap::new(),
                consumers: HashMap::new(),
            },
        );
        true
    }

    pub fn destroy_group(&mut self, name: &[u8]) -> bool {
        self.groups.remove(name).is_some()
    }

    pub fn group(&self, name: &[u8]) -> Option<&ConsumerGroup> {
        self.groups.get(name)
    }

    pub fn groups(&self) -> impl Iterator<Item = (&Bytes, &ConsumerGroup)> {
        self.groups.iter()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Delivers new entries to `consumer`, advancing the group frontier and
    /// recording each id in the PEL. Returns None when the group is missing.
    pub fn read_group(
        &mut self,
        group: &[u8],
        consumer: &Bytes,
        count: usize,
        now_ms: u64,
    ) -> Option<Vec<(StreamId, EntryFields)>> {
        let after = self.groups.get(group)?.last_delivered;
        let batch = self.read_after(after, count);
        let g = self.groups.get_mut(group)?;
        let c = g.consumers.entry(consumer.clone()).or_default();
        c.seen_time_ms = now_ms;
        for (id, _) in &batch {
            c.ids.insert(*id);
            g.pel.insert(
                *id,
                PendingEntry {
                    consumer: consumer.clone(),
                    delivery_time_ms: now_ms,
                    delivery_count: 1,
                },
            );
            g.last_delivered = *id;
        }
        Some(batch)
    }

    pub fn ack(&mut self, group: &[u8], ids: &[StreamId]) -> Option<usize> {
        let g = self.groups.get_mut(group)?;
        let mut acked = 0;
        for id in ids {
            if let Some(pending) = g.pel.remove(id) {
                if let Some(c) = g.consumers.get_mut(&pending.consumer) {
                    c.ids.remove(id);
                }
                acked += 1;
            }
        }
        Some(acked)
    }

    /// Reassigns PEL entries idle for at least `min_idle_ms` to `consumer`.
    /// Ids not in the PEL are skipped. Returns the claimed entries (claimed
    /// ids whose entry was deleted report empty fields upstream as nil).
    pub fn claim(
        &mut self,
        group: &[u8],
        consumer: &Bytes,
        ids: &[StreamId],
        min_idle_ms: u64,
        now_ms: u64,
    ) -> Option<Vec<StreamId>> {
        let g = self.groups.get_mut(group)?;
        let mut claimed = Vec::new();
        for id in ids {
            let Some(pending) = g.pel.get_mut(id) else {
                continue;
            };
            let idle = now_ms.saturating_sub(pending.delivery_time_ms);
            if idle < min_idle_ms {
                continue;
            }
            let old_owner = pending.consumer.clone();
            pending.consumer = consumer.clone();
            pending.delivery_time_ms = now_ms;
            pending.delivery_count += 1;
            if let Some(c) = g.consumers.get_mut(&old_owner) {
                c.ids.remove(id);
            }
            let c = g.consumers.entry(consumer.clone()).or_default();
            c.seen_time_ms = now_ms;
            c.ids.insert(*id);
            claimed.push(*id);
        }
        Some(claimed)
    }

    /// XPENDING summary: (total, smallest id, largest id, per-consumer
    /// counts).
    #[allow(clippy::type_complexity)]
    pub fn pending_summary(
        &self,
        group: &[u8],
    ) -> Option<(usize, Option<StreamId>, Option<StreamId>, Vec<(Bytes, usize)>)>
    {
        let g = self.groups.get(group)?;
        let total = g.pel.len();
        let min = g.pel.keys().next().copied();
        let max = g.pel.keys().next_back().copied();
        let mut per_consumer: Vec<(Bytes, usize)> = g
            .consumers
            .iter()
            .filter(|(_, c)| !c.ids.is_empty())
            .map(|(name, c)| (name.clone(), c.ids.len()))
            .collect();
        per_consumer.sort_by(|a, b| a.0.cmp(&b.0));
        Some((total, min, max, per_consumer))
    }

    /// XPENDING detail rows: (id, consumer, idle ms, delivery count).
    pub fn pending_detail(
        &self,
        group: &[u8],
        start: StreamId,
        end: StreamId,
        count: usize,
        consumer: Option<&[u8]>,
        now_ms: u64,
    ) -> Option<Vec<(StreamId, Bytes, u64, u64)>> {
        let g = self.groups.get(group)?;
        Some(
            g.pel
                .range(start..=end)
                .filter(|(_, p)| {
                    consumer.is_none_or(|c| p.consumer.as_ref() == c)
                })
                .take(count)
                .map(|(id, p)| {
                    (
                        *id,
                        p.consumer.clone(),
                        now_ms.saturating_sub(p.delivery_time_ms),
                        p.delivery_count,
                    )
                })
                .collect(),
        )
    }

    /// XSETID: force the last id; refused when it would rewind past
    /// existing entries.
    pub fn set_last_id(&mut self, id: StreamId) -> bool {
        if let Some(last) = self.last_entry_id()
            && id < last
        {
            return false;
        }
        self.last_id = id;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000_000;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    fn fields(k: &str, v: &str) -> EntryFields {
        vec![(b(k), b(v))]
    }

    #[test]
    fn auto_ids_increase_monotonically() {
        let mut s = Stream::new();
        let id1 = s.add(None, fields("f", "1"), T0).expect("add");
        let id2 = s.add(None, fields("f", "2"), T0).expect("add");
        let id3 = s.add(None, fields("f", "3"), T0 - 50).expect("add");
        assert!(id1 < id2 && id2 < id3);
        assert_eq!(id1, StreamId::new(T0, 0));
        assert_eq!(id2, StreamId::new(T0, 1));
        assert_eq!(s.len(), 3);
        assert_eq!(s.last_id, id3);
    }

    #[test]
    fn explicit_id_must_advance() {
        let mut s = Stream::new();
        s.add(Some((5, Some(1))), fields("f", "v"), T0).expect("add");
        assert_eq!(
            s.add(Some((5, Some(1))), fields("f", "v"), T0),
            Err(IdTooSmall)
        );
        assert_eq!(
            s.add(Some((4, Some(9))), fields("f", "v"), T0),
            Err(IdTooSmall)
        );
        let id = s.add(Some((5, None)), fields("f", "v"), T0).expect("ms-*");
        assert_eq!(id, StreamId::new(5, 2));
        assert!(s.add(Some((0, Some(0))), fields("f", "v"), T0).is_err());
    }

    #[test]
    fn range_and_read_after() {
        let mut s = Stream::new();
        let ids: Vec<StreamId> = (1..=5)
            .map(|i| {
                s.add(Some((i, Some(0))), fields("n", &i.to_string()), T0)
                    .expect("add")
            })
            .collect();
        let all = s.range(StreamId::MIN, StreamId::MAX, usize::MAX);
        assert_eq!(all.len(), 5);
        let mid = s.range(ids[1], ids[3], usize::MAX);
        assert_eq!(mid.len(), 3);
        let after = s.read_after(ids[2], usize::MAX);
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].0, ids[3]);
        let capped = s.read_after(StreamId::MIN, 2);
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn trim_exact_and_approximate() {
        let mut s = Stream::new();
        for i in 1..=100u64 {
            s.add(Some((i, Some(0))), fields("n", "x"), T0).expect("add");
        }
        let removed = s.trim_maxlen(90, true);
        // Approximate mode only removes whole blocks.
        assert!(s.len() >= 90);
        assert!(removed < 16);
        let removed = s.trim_maxlen(10, false);
        assert_eq!(s.len(), 10);
        assert!(removed > 0);
        assert_eq!(s.first_id(), Some(StreamId::new(91, 0)));
        // last_id survives trimming.
        assert_eq!(s.last_id, StreamId::new(100, 0));
    }

    #[test]
    fn group_delivery_ack_pending() {
        let mut s = Stream::new();
        let id1 = s.add(None, fields("f", "1"), T0).expect("add");
        let id2 = s.add(None, fields("f", "2"), T0).expect("add");
        assert!(s.create_group(b("g"), StreamId::MIN));
        assert!(!s.create_group(b("g"), StreamId::MIN));

        let got = s
            .read_group(b"g", &b("c1"), 10, T0 + 5)
            .expect("group exists");
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].0, id1);

        // Nothing new on a second read.
        let empty = s.read_group(b"g", &b("c1"), 10, T0 + 6).expect("group");
        assert!(empty.is_empty());

        assert_eq!(s.ack(b"g", &[id1]), Some(1));
        assert_eq!(s.ack(b"g", &[id1]), Some(0));
        let (total, min, max, per) = s.pending_summary(b"g").expect("group");
        assert_eq!(total, 1);
        assert_eq!(min, Some(id2));
        assert_eq!(max, Some(id2));
        assert_eq!(per, vec![(b("c1"), 1)]);
    }

    #[test]
    fn claim_respects_idle_threshold() {
        let mut s = Stream::new();
        let id = s.add(None, fields("f", "1"), T0).expect("add");
        s.create_group(b("g"), StreamId::MIN);
        s.read_group(b"g", &b("c1"), 10, T0).expect("group");

        // Too fresh to claim.
        let claimed = s
            .claim(b"g", &b("c2"), &[id], 1000, T0 + 500)
            .expect("group");
        assert!(claimed.is_empty());

        let claimed = s
            .claim(b"g", &b("c2"), &[id], 1000, T0 + 2000)
            .expect("group");
        assert_eq!(claimed, vec![id]);
        let g = s.group(b"g").expect("group");
        let p = g.pel.get(&id).expect("still pending");
        assert_eq!(p.consumer, b("c2"));
        assert_eq!(p.delivery_count, 2);
        let rows = s
            .pending_detail(b"g", StreamId::MIN, StreamId::MAX, 10, None, T0 + 3000)
            .expect("group");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, b("c2"));
        assert_eq!(rows[0].2, 1000);
    }

    #[test]
    fn set_last_id_cannot_rewind() {
        let mut s = Stream::new();
        s.add(Some((10, Some(0))), fields("f", "v"), T0).expect("add");
        assert!(!s.set_last_id(StreamId::new(5, 0)));
        assert!(s.set_last_id(StreamId::new(42, 7)));
        let id = s.add(None, fields("f", "v"), 0).expect("add");
        assert_eq!(id, StreamId::new(42, 8));
    }
}
