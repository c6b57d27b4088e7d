// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Blocking-command coordinator.
//!
//! A client that found nothing to pop parks one waiter per watched key;
//! write paths that make a key ready signal `(db, key)` after the write
//! commits, waking parked waiters in FIFO order when the value type
//! matches. The woken client re-executes its pop under the database lock,
//! so the observed element always reflects post-write state; if another
//! client won the race it simply parks again until its deadline.
//!
//! A waiter's registration is guard-owned: dropping the wait future (kill,
//! disconnect) removes its queue entries, so producers never signal into
//! dead channels for long.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use tokio::sync::Notify;

use crate::storage::TypeTag;

#[derive(Debug)]
struct Waiter {
    client_id: u64,
    expected: TypeTag,
    wake: Arc<Notify>,
}

type KeyQueues = HashMap<(usize, Bytes), VecDeque<Waiter>>;

#[derive(Debug, Default)]
pub struct BlockingCoordinator {
    queues: Mutex<KeyQueues>,
}

impl BlockingCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_queues<R>(&self, f: impl FnOnce(&mut KeyQueues) -> R) -> R {
        // Lock poisoning only happens on a panicked handler; propagate the
        // inner state regardless.
        let mut guard = match self.queues.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Parks `client_id` on every key until one signal or the deadline.
    /// Returns true when a signal arrived (the caller retries its pop) and
    /// false on timeout. `timeout` of `None` waits forever.
    pub async fn wait_ready(
        self: &Arc<Self>,
        db_index: usize,
        keys: &[Bytes],
        expected: TypeTag,
        client_id: u64,
        timeout: Option<Duration>,
    ) -> bool {
        let wake = Arc::new(Notify::new());
        let _guard = Registration::park(
            self.clone(),
            db_index,
            keys,
            expected,
            client_id,
            wake.clone(),
        );

        match timeout {
            Some(dur) => tokio::time::timeout(dur, wake.notified())
                .await
                .is_ok(),
            None => {
                wake.notified().await;
                true
            },
        }
    }

    /// Producer-side signal: `count` elements became available on the key.
    /// Wakes up to `count` type-matching waiters in FIFO order.
    pub fn signal_key_ready(
        &self,
        db_index: usize,
        key: &Bytes,
        tag: TypeTag,
        count: usize,
    ) {
        if count == 0 {
            return;
        }
        self.with_queues(|queues| {
            let Some(queue) = queues.get_mut(&(db_index, key.clone())) else {
                return;
            };
            let mut woken = 0;
            let mut idx = 0;
            while idx < queue.len() && woken < count {
                if queue[idx].expected == tag {
                    if let Some(w) = queue.remove(idx) {
                        w.wake.notify_one();
                        woken += 1;
                    }
                } else {
                    idx += 1;
                }
            }
            if queue.is_empty() {
                queues.remove(&(db_index, key.clone()));
            }
        });
    }

    /// Count of currently parked waiters, surfaced through INFO.
    pub fn waiter_count(&self) -> usize {
        self.with_queues(|queues| queues.values().map(VecDeque::len).sum())
    }

    fn remove_client(&self, db_index: usize, keys: &[Bytes], client_id: u64) {
        self.with_queues(|queues| {
            for key in keys {
                if let Some(queue) = queues.get_mut(&(db_index, key.clone())) {
                    queue.retain(|w| w.client_id != client_id);
                    if queue.is_empty() {
                        queues.remove(&(db_index, key.clone()));
                    }
                }
            }
        });
    }
}

/// Queue membership tied to the wait future's lifetime.
struct Registration {
    coordinator: Arc<BlockingCoordinator>,
    db_index: usize,
    keys: Vec<Bytes>,
    client_id: u64,
}

impl Registration {
    fn park(
        coordinator: Arc<BlockingCoordinator>,
        db_index: usize,
        keys: &[Bytes],
        expected: TypeTag,
        client_id: u64,
        wake: Arc<Notify>,
    ) -> Self {
        coordinator.with_queues(|queues| {
            for key in keys {
                queues
                    .entry((db_index, key.clone()))
                    .or_default()
                    .push_back(Waiter {
                        client_id,
                        expected,
                        wake: wake.clone(),
                    });
            }
        });
        Self {
            coordinator,
            db_index,
            keys: keys.to_vec(),
            client_id,
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.coordinator
            .remove_client(self.db_index, &self.keys, self.client_id);
    }
}
