// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Post-dispatch sampling: slow-command ring and per-verb latency
//! distributions.
//!
//! Both sinks are best-effort observers on the hot path; a short critical
//! section per record keeps them out of the handlers' way.

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::Bytes;
use dashmap::DashMap;

#[derive(Debug, Clone)]
pub struct SlowLogEntry {
    pub id: u64,
    pub unix_time_sec: u64,
    pub duration_us: u64,
    pub argv: Vec<Bytes>,
    pub client_addr: String,
    pub client_name: String,
}

#[derive(Debug)]
pub struct SlowLog {
    entries: Mutex<VecDeque<SlowLogEntry>>,
    next_id: AtomicU64,
    /// Microseconds; negative disables sampling entirely.
    threshold_us: i64,
    max_len: usize,
}

impl SlowLog {
    pub fn new(threshold_us: i64, max_len: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_len.min(1024))),
            next_id: AtomicU64::new(0),
            threshold_us,
            max_len,
        }
    }

    pub fn threshold_us(&self) -> i64 {
        self.threshold_us
    }

    /// Records the sample when it crosses the threshold. Long argument
    /// vectors are truncated the way the reply format expects.
    pub fn maybe_record(
        &self,
        duration_us: u64,
        argv: &[Bytes],
        client_addr: &str,
        client_name: &str,
        unix_time_sec: u64,
    ) {
        if self.threshold_us < 0 || duration_us < self.threshold_us as u64 {
            return;
        }
        let entry = SlowLogEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            unix_time_sec,
            duration_us,
            argv: argv.iter().take(32).cloned().collect(),
            client_addr: client_addr.to_string(),
            client_name: client_name.to_string(),
        };
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if entries.len() == self.max_len {
            entries.pop_back();
        }
        entries.push_front(entry);
    }

    /// Newest-first listing of up to `count` entries.
    pub fn get(&self, count: usize) -> Vec<SlowLogEntry> {
        self.entries
            .lock()
            .map(|e| e.iter().take(count).cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

/// Power-of-two bucketed histogram: bucket i counts samples whose
/// microsecond latency has `i` significant bits. 64 buckets cover any u64,
/// and percentiles interpolate inside the winning bucket.
#[derive(Debug)]
struct Histogram {
    buckets: [u64; 64],
    count: u64,
    max_us: u64,
    last_us: u64,
    last_at_sec: u64,
    /// Recent spike history for LATENCY HISTORY: (unix sec, µs).
    history: VecDeque<(u64, u64)>,
}

impl Default for Histogram {
    fn default() -> Self {
        Histogram {
            buckets: [0u64; 64],
            count: 0,
            max_us: 0,
            last_us: 0,
            last_at_sec: 0,
            history: VecDeque::new(),
        }
    }
}

const HISTORY_CAP: usize = 160;

impl Histogram {
    fn record(&mut self, us: u64, unix_sec: u64) {
        let bucket = (64 - us.leading_zeros() as usize).min(63);
        self.buckets[bucket] += 1;
        self.count += 1;
        self.last_us = us;
        self.last_at_sec = unix_sec;
        if us > self.max_us {
            self.max_us = us;
        }
        if self.history.len() == HISTORY_CAP {
            self.history.pop_front();
        }
        self.history.push_back((unix_sec, us));
    }

    /// Approximate percentile: the lower edge of the bucket holding the
    /// p-th sample.
    fn percentile(&self, p: f64) -> u64 {
        if self.count == 0 {
            return 0;
        }
        let target = ((self.count as f64) * p / 100.0).ceil().max(1.0) as u64;
        let mut seen = 0u64;
        for (i, &n) in self.buckets.iter().enumerate() {
            seen += n;
            if seen >= target {
                return if i == 0 { 0 } else { 1u64 << (i - 1) };
            }
        }
        self.max_us
    }
}

/// Per-verb latency table.
#[derive(Debug, Default)]
pub struct LatencyStats {
    verbs: DashMap<String, Histogram>,
}

#[derive(Debug, Clone)]
pub struct LatencySummary {
    pub verb: String,
    pub count: u64,
    pub last_at_sec: u64,
    pub last_us: u64,
    pub max_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, verb: &str, us: u64, unix_sec: u64) {
        self.verbs
            .entry(verb.to_string())
            .or_default()
            .record(us, unix_sec);
    }

    pub fn summaries(&self) -> Vec<LatencySummary> {
        let mut out: Vec<LatencySummary> = self
            .verbs
            .iter()
            .map(|e| {
                let h = e.value();
                LatencySummary {
                    verb: e.key().clone(),
                    count: h.count,
                    last_at_sec: h.last_at_sec,
                    last_us: h.last_us,
                    max_us: h.max_us,
                    p50_us: h.percentile(50.0),
                    p95_us: h.percentile(95.0),
                    p99_us: h.percentile(99.0),
                }
            })
            .collect();
        out.sort_by(|a, b| a.verb.cmp(&b.verb));
        out
    }

    pub fn history(&self, verb: &str) -> Vec<(u64, u64)> {
        self.verbs
            .get(verb)
            .map(|h| h.history.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Clears everything; returns how many verb entries were dropped.
    pub fn reset(&self) -> usize {
        let n = self.verbs.len();
        self.verbs.clear();
        n
    }
}
