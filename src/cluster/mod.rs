//! Cluster slot map: CRC16 key routing, node table, MOVED computation.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::collections::HashMap;
use std::fmt::Write as _;

use bytes::Bytes;
use crc::{CRC_16_XMODEM, Crc};
use rand::RngExt;

use crate::errors::CommandError;

pub const SLOT_COUNT: u16 = 16384;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Hash-tag extraction: the first `{...}` with a non-empty body replaces
/// the key for slot hashing, so related keys can be pinned together.
pub fn extract_hash_tag(key: &[u8]) -> &[u8] {
    if let Some(open) = key.iter().position(|&b| b == b'{')
        && let Some(close_rel) = key[open + 1..].iter().position(|&b| b == b'}')
        && close_rel > 0
    {
        return &key[open + 1..open + 1 + close_rel];
    }
    key
}

pub fn key_slot(key: &[u8]) -> u16 {
    CRC16.checksum(extract_hash_tag(key)) % SLOT_COUNT
}

fn random_node_id() -> String {
    let mut raw = [0u8; 20];
    rand::rng().fill(&mut raw);
    hex::encode(raw)
}

#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub id: String,
    pub ip: String,
    pub port: u16,
    pub config_epoch: u64,
    pub is_self: bool,
}

impl NodeInfo {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Routing decision for a command's key set.
#[derive(Debug, Clone, PartialEq)]
pub enum Routing {
    /// Every key is served locally (or cluster mode is off).
    Local,
    /// Some key lives on another node.
    Moved { slot: u16, addr: String },
    /// The slot has no owner.
    Down { slot: u16 },
    /// Keys span more than one slot.
    CrossSlot,
}

#[derive(Debug)]
pub struct ClusterMap {
    enabled: bool,
    my_id: String,
    nodes: HashMap<String, NodeInfo>,
    /// slot -> owning node id.
    slots: Vec<Option<String>>,
    epoch: u64,
}

impl ClusterMap {
    pub fn new(enabled: bool, announce_ip: String, announce_port: u16) -> Self {
        let my_id = random_node_id();
        let mut nodes = HashMap::new();
        nodes.insert(
            my_id.clone(),
            NodeInfo {
                id: my_id.clone(),
                ip: announce_ip,
                port: announce_port,
                config_epoch: 0,
                is_self: true,
            },
        );
        Self {
            enabled,
            my_id,
            nodes,
            slots: vec![None; SLOT_COUNT as usize],
            epoch: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn my_id(&self) -> &str {
        &self.my_id
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// `ok` iff every slot has a known owner; otherwise `fail`.
    pub fn state_ok(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn slots_assigned(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn node_for_slot(&self, slot: u16) -> Option<&NodeInfo> {
        let id = self.slots.get(slot as usize)?.as_ref()?;
        self.nodes.get(id)
    }

    pub fn owns_slot(&self, slot: u16) -> bool {
        self.slots[slot as usize].as_deref() == Some(self.my_id.as_str())
    }

    /// Claims slots for this node. Fails on a slot already owned by a peer.
    pub fn add_slots(&mut self, slots: &[u16]) -> Result<(), CommandError> {
        for &slot in slots {
            if slot >= SLOT_COUNT {
                return Err(CommandError::other(format!(
                    "Invalid or out of range slot: {slot}"
                )));
            }
            if let Some(owner) = &self.slots[slot as usize]
                && owner != &self.my_id
            {
                return Err(CommandError::other(format!(
                    "Slot {slot} is already busy"
                )));
            }
        }
        for &slot in slots {
            self.slots[slot as usize] = Some(self.my_id.clone());
        }
        Ok(())
    }

    pub fn del_slots(&mut self, slots: &[u16]) -> Result<(), CommandError> {
        for &slot in slots {
            if slot >= SLOT_COUNT {
                return Err(CommandError::other(format!(
                    "Invalid or out of range slot: {slot}"
                )));
            }
        }
        for &slot in slots {
            self.slots[slot as usize] = None;
        }
        Ok(())
    }

    /// SETSLOT: hands a slot to a known node.
    pub fn set_slot_owner(
        &mut self,
        slot: u16,
        node_id: &str,
    ) -> Result<(), CommandError> {
        if slot >= SLOT_COUNT {
            return Err(CommandError::other(format!(
                "Invalid or out of range slot: {slot}"
            )));
        }
        if !self.nodes.contains_key(node_id) {
            return Err(CommandError::other(format!("Unknown node {node_id}")));
        }
        self.slots[slot as usize] = Some(node_id.to_string());
        Ok(())
    }

    /// Registers a peer stub; the handshake itself is outside the core, so
    /// the node starts with no slots and a fresh id.
    pub fn meet(&mut self, ip: String, port: u16) -> String {
        let id = random_node_id();
        self.epoch += 1;
        self.nodes.insert(
            id.clone(),
            NodeInfo {
                id: id.clone(),
                ip,
                port,
                config_epoch: self.epoch,
                is_self: false,
            },
        );
        id
    }

    /// Routes a set of keys: all local, MOVED, CLUSTERDOWN or CROSSSLOT.
    pub fn route_keys<'a, I>(&self, keys: I) -> Routing
    where I: IntoIterator<Item = &'a Bytes> {
        if !self.enabled {
            return Routing::Local;
        }
        let mut decided: Option<u16> = None;
        for key in keys {
            let slot = key_slot(key);
            match decided {
                None => decided = Some(slot),
                Some(prev) if prev != slot => return Routing::CrossSlot,
                Some(_) => {},
            }
        }
        let Some(slot) = decided else {
            return Routing::Local;
        };
        match &self.slots[slot as usize] {
            None => Routing::Down { slot },
            Some(owner) if owner == &self.my_id => Routing::Local,
            Some(owner) => match self.nodes.get(owner) {
                Some(node) => Routing::Moved { slot, addr: node.addr() },
                None => Routing::Down { slot },
            },
        }
    }

    /// Slots owned by `node_id`, compressed to inclusive ranges.
    fn ranges_of(&self, node_id: &str) -> Vec<(u16, u16)> {
        let mut ranges = Vec::new();
        let mut run: Option<(u16, u16)> = None;
        for slot in 0..SLOT_COUNT {
            let owned = self.slots[slot as usize].as_deref() == Some(node_id);
            match (owned, run) {
                (true, None) => run = Some((slot, slot)),
                (true, Some((s, _))) => run = Some((s, slot)),
                (false, Some(r)) => {
                    ranges.push(r);
                    run = None;
                },
                (false, None) => {},
            }
        }
        if let Some(r) = run {
            ranges.push(r);
        }
        ranges
    }

    /// CLUSTER NODES output: one line per known node.
    pub fn nodes_lines(&self) -> String {
        let mut out = String::new();
        let mut ids: Vec<&String> = self.nodes.keys().collect();
        ids.sort();
        for id in ids {
            // Insertion guarantees presence.
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            let flags = if node.is_self { "myself,master" } else { "master" };
            let _ = write!(
                out,
                "{} {}:{}@{} {} - 0 0 {} connected",
                node.id,
                node.ip,
                node.port,
                u32::from(node.port) + 10000,
                flags,
                node.config_epoch,
            );
            for (start, stop) in self.ranges_of(&node.id) {
                if start == stop {
                    let _ = write!(out, " {start}");
                } else {
                    let _ = write!(out, " {start}-{stop}");
                }
            }
            out.push('\n');
        }
        out
    }

    /// CLUSTER SLOTS rows: (start, stop, ip, port, node id).
    pub fn slot_ranges(&self) -> Vec<(u16, u16, String, u16, String)> {
        let mut out = Vec::new();
        let mut ids: Vec<&String> = self.nodes.keys().collect();
        ids.sort();
        for id in ids {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            for (start, stop) in self.ranges_of(id) {
                out.push((
                    start,
                    stop,
                    node.ip.clone(),
                    node.port,
                    node.id.clone(),
                ));
            }
        }
        out.sort_by_key(|r| r.0);
        out
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn hash_tag_rules() {
        assert_eq!(extract_hash_tag(b"{user1000}.following"), b"user1000");
        assert_eq!(extract_hash_tag(b"foo{}{bar}"), b"foo{}{bar}");
        assert_eq!(extract_hash_tag(b"foo{{bar}}zap"), b"{bar");
        assert_eq!(extract_hash_tag(b"foo{bar}{zap}"), b"bar");
        assert_eq!(extract_hash_tag(b"plain"), b"plain");
    }

    #[test]
    fn tagged_keys_share_a_slot() {
        assert_eq!(key_slot(b"{foo}bar"), key_slot(b"foo"));
        assert_eq!(
            key_slot(b"{user1000}.profile"),
            key_slot(b"{user1000}.following")
        );
    }

    #[test]
    fn known_crc16_vector() {
        // CRC16/XMODEM("123456789") = 0x31C3; slot is mod 16384.
        assert_eq!(key_slot(b"123456789"), 0x31c3 % SLOT_COUNT);
    }

    #[test]
    fn routing_disabled_is_always_local() {
        let map = ClusterMap::new(false, "127.0.0.1".into(), 6379);
        assert_eq!(map.route_keys(&[b("anything")]), Routing::Local);
    }

    #[test]
    fn routing_moved_down_and_local() {
        let mut map = ClusterMap::new(true, "10.0.0.1".into(), 7000);
        let key = b("somekey");
        let slot = key_slot(&key);

        // Unassigned slot: cluster down.
        assert_eq!(map.route_keys(&[key.clone()]), Routing::Down { slot });

        map.add_slots(&[slot]).expect("claim");
        assert_eq!(map.route_keys(&[key.clone()]), Routing::Local);

        // Hand the slot to a peer: MOVED.
        let peer = map.meet("10.0.0.2".to_string(), 7001);
        map.slots[slot as usize] = Some(peer);
        match map.route_keys(&[key]) {
            Routing::Moved { slot: s, addr } => {
                assert_eq!(s, slot);
                assert_eq!(addr, "10.0.0.2:7001");
            },
            other => panic!("expected MOVED, got {other:?}"),
        }
    }

    #[test]
    fn cross_slot_detection() {
        let mut map = ClusterMap::new(true, "127.0.0.1".into(), 7000);
        let all: Vec<u16> = (0..SLOT_COUNT).collect();
        map.add_slots(&all).expect("claim all");
        let k1 = b("{tag}one");
        let k2 = b("{tag}two");
        assert_eq!(map.route_keys(&[k1.clone(), k2]), Routing::Local);
        let k3 = b("other");
        if key_slot(b"{tag}x") != key_slot(b"other") {
            assert_eq!(map.route_keys(&[k1, k3]), Routing::CrossSlot);
        }
    }

    #[test]
    fn state_requires_full_coverage() {
        let mut map = ClusterMap::new(true, "127.0.0.1".into(), 7000);
        assert!(!map.state_ok());
        let all: Vec<u16> = (0..SLOT_COUNT).collect();
        map.add_slots(&all).expect("claim");
        assert!(map.state_ok());
        map.del_slots(&[42]).expect("del");
        assert!(!map.state_ok());
        assert_eq!(map.slots_assigned(), usize::from(SLOT_COUNT) - 1);
    }

    #[test]
    fn nodes_lines_format() {
        let mut map = ClusterMap::new(true, "127.0.0.1".into(), 7000);
        map.add_slots(&[0, 1, 2, 5, 100]).expect("claim");
        let lines = map.nodes_lines();
        let my = lines
            .lines()
            .find(|l| l.contains("myself"))
            .expect("self line");
        assert!(my.starts_with(map.my_id()));
        assert!(my.contains("127.0.0.1:7000@17000"));
        assert!(my.contains("myself,master"));
        assert!(my.ends_with("0-2 5 100"));
    }
}
