// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! PubSub registry: channel → subscribers and pattern → subscribers.
//!
//! Publishing walks both tables and pushes a `message`/`pmessage` frame
//! into each subscriber's out-of-band channel; delivery order per
//! subscriber follows the publisher's order because the push channel is
//! FIFO.

use std::collections::HashSet;

use bytes::Bytes;
use dashmap::DashMap;

use crate::{
    resp::Frame,
    server::client::ClientRegistry,
    storage::glob::glob_match,
};

#[derive(Debug, Default)]
pub struct PubSub {
    channels: DashMap<Bytes, HashSet<u64>>,
    patterns: DashMap<Bytes, HashSet<u64>>,
}

impl PubSub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, channel: Bytes, client_id: u64) {
        self.channels.entry(channel).or_default().insert(client_id);
    }

    pub fn unsubscribe(&self, channel: &Bytes, client_id: u64) {
        if let Some(mut subs) = self.channels.get_mut(channel) {
            subs.remove(&client_id);
            let empty = subs.is_empty();
            drop(subs);
            if empty {
                self.channels.remove_if(channel, |_, s| s.is_empty());
            }
        }
    }

    pub fn psubscribe(&self, pattern: Bytes, client_id: u64) {
        self.patterns.entry(pattern).or_default().insert(client_id);
    }

    pub fn punsubscribe(&self, pattern: &Bytes, client_id: u64) {
        if let Some(mut subs) = self.patterns.get_mut(pattern) {
            subs.remove(&client_id);
            let empty = subs.is_empty();
            drop(subs);
            if empty {
                self.patterns.remove_if(pattern, |_, s| s.is_empty());
            }
        }
    }

    /// Removes every registration of a disconnecting client.
    pub fn drop_client(&self, client_id: u64, subs: &crate::server::client::Subscriptions) {
        for channel in &subs.channels {
            self.unsubscribe(channel, client_id);
        }
        for pattern in &subs.patterns {
            self.punsubscribe(pattern, client_id);
        }
    }

    /// Fans a payload out to channel and pattern subscribers; returns the
    /// number of receivers.
    pub fn publish(
        &self,
        registry: &ClientRegistry,
        channel: &Bytes,
        payload: &Bytes,
    ) -> usize {
        let mut receivers = 0;

        if let Some(subs) = self.channels.get(channel) {
            for &id in subs.iter() {
                if let Some(client) = registry.get(id) {
                    let frame = Frame::array(vec![
                        Frame::bulk_from_str("message"),
                        Frame::bulk(channel.clone()),
                        Frame::bulk(payload.clone()),
                    ]);
                    if client.push_frame(frame) {
                        receivers += 1;
                    }
                }
            }
        }

        for entry in self.patterns.iter() {
            if !glob_match(entry.key(), channel) {
                continue;
            }
            for &id in entry.value().iter() {
                if let Some(client) = registry.get(id) {
                    let frame = Frame::array(vec![
                        Frame::bulk_from_str("pmessage"),
                        Frame::bulk(entry.key().clone()),
                        Frame::bulk(channel.clone()),
                        Frame::bulk(payload.clone()),
                    ]);
                    if client.push_frame(frame) {
                        receivers += 1;
                    }
                }
            }
        }

        receivers
    }

    /// Active (subscriber-bearing) channels, optionally filtered; the
    /// PUBSUB CHANNELS reply.
    pub fn active_channels(&self, pattern: Option<&[u8]>) -> Vec<Bytes> {
        let mut out: Vec<Bytes> = self
            .channels
            .iter()
            .filter(|e| !e.value().is_empty())
            .filter(|e| pattern.is_none_or(|p| glob_match(p, e.key())))
            .map(|e| e.key().clone())
            .collect();
        out.sort();
        out
    }

    /// Subscriber count per named channel; the PUBSUB NUMSUB reply.
    pub fn subscriber_counts(&self, channels: &[Bytes]) -> Vec<(Bytes, usize)> {
        channels
            .iter()
            .map(|ch| {
                let n = self.channels.get(ch).map_or(0, |s| s.len());
                (ch.clone(), n)
            })
            .collect()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.iter().filter(|e| !e.value().is_empty()).count()
    }
}
