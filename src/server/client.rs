// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Client registry: one shared record per live connection.
//!
//! The record carries what other parts of the server need to reach a
//! client by id (pubsub fan-out, CLIENT LIST/KILL, waiter cleanup); the
//! connection task keeps the rest of its session state private.

use std::sync::{
    Mutex,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use bitflags::bitflags;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{resp::Frame, storage::now_ms};

bitflags! {
    /// Observable client-state bits surfaced by CLIENT LIST.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClientFlags: u32 {
        const SUBSCRIBED = 1 << 0;
        const IN_MULTI   = 1 << 1;
        const DIRTY_EXEC = 1 << 2;
        const BLOCKED    = 1 << 3;
    }
}

#[derive(Debug)]
pub struct ClientShared {
    pub id: u64,
    pub addr: String,
    pub name: Mutex<String>,
    pub connected_at_ms: u64,
    pub last_interaction_ms: AtomicU64,
    pub db_index: AtomicUsize,
    pub flags: Mutex<ClientFlags>,
    /// Out-of-band frames (pubsub pushes) injected between replies.
    pub pushes: mpsc::UnboundedSender<Frame>,
    /// Cancelled by CLIENT KILL or server shutdown.
    pub kill: CancellationToken,
}

impl ClientShared {
    pub fn touch(&self) {
        self.last_interaction_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn set_flag(&self, flag: ClientFlags, on: bool) {
        if let Ok(mut flags) = self.flags.lock() {
            flags.set(flag, on);
        }
    }

    pub fn has_flag(&self, flag: ClientFlags) -> bool {
        self.flags.lock().map(|f| f.contains(flag)).unwrap_or(false)
    }

    /// Queues an out-of-band frame; returns false when the connection is
    /// already gone.
    pub fn push_frame(&self, frame: Frame) -> bool {
        self.pushes.send(frame).is_ok()
    }
}

#[derive(Debug, Default)]
pub struct ClientRegistry {
    next_id: AtomicU64,
    clients: DashMap<u64, std::sync::Arc<ClientShared>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            clients: DashMap::new(),
        }
    }

    pub fn register(
        &self,
        addr: String,
        pushes: mpsc::UnboundedSender<Frame>,
    ) -> std::sync::Arc<ClientShared> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let shared = std::sync::Arc::new(ClientShared {
            id,
            addr,
            name: Mutex::new(String::new()),
            connected_at_ms: now_ms(),
            last_interaction_ms: AtomicU64::new(now_ms()),
            db_index: AtomicUsize::new(0),
            flags: Mutex::new(ClientFlags::empty()),
            pushes,
            kill: CancellationToken::new(),
        });
        self.clients.insert(id, shared.clone());
        shared
    }

    pub fn unregister(&self, id: u64) {
        self.clients.remove(&id);
    }

    pub fn get(&self, id: u64) -> Option<std::sync::Arc<ClientShared>> {
        self.clients.get(&id).map(|c| c.value().clone())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn iter_snapshot(&self) -> Vec<std::sync::Arc<ClientShared>> {
        let mut list: Vec<_> =
            self.clients.iter().map(|e| e.value().clone()).collect();
        list.sort_by_key(|c| c.id);
        list
    }

    /// CLIENT KILL by address or id; returns how many clients were hit.
    pub fn kill_matching(
        &self,
        addr: Option<&str>,
        id: Option<u64>,
    ) -> usize {
        let mut killed = 0;
        for entry in self.clients.iter() {
            let c = entry.value();
            let addr_hit = addr.is_some_and(|a| c.addr == a);
            let id_hit = id.is_some_and(|i| c.id == i);
            if addr_hit || id_hit {
                c.kill.cancel();
                killed += 1;
            }
        }
        killed
    }

    /// Name lookup for CLIENT LIST formatting.
    pub fn name_of(shared: &ClientShared) -> String {
        shared.name.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

/// Subscription bookkeeping shared between the pubsub registry and the
/// session: channel and pattern names a client listens on.
#[derive(Debug, Default, Clone)]
pub struct Subscriptions {
    pub channels: std::collections::HashSet<Bytes>,
    pub patterns: std::collections::HashSet<Bytes>,
}

impl Subscriptions {
    pub fn count(&self) -> usize {
        self.channels.len() + self.patterns.len()
    }

    pub fn is_subscribed(&self) -> bool {
        self.count() > 0
    }
}
