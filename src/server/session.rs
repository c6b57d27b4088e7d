// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use bytes::Bytes;

use crate::server::client::{ClientFlags, ClientShared, Subscriptions};

/// Per-connection command state: everything a handler may mutate that
/// belongs to exactly one client. The registry-visible bits live in
/// [`ClientShared`]; this struct stays private to the connection task.
pub struct Session {
    pub shared: Arc<ClientShared>,
    pub db_index: usize,
    pub authenticated: bool,
    /// MULTI open; verbs queue instead of executing.
    pub in_multi: bool,
    /// A queue-time error poisoned the transaction; EXEC must abort.
    pub dirty_exec: bool,
    pub queued: Vec<Vec<Bytes>>,
    /// `(db, key, version at WATCH time)`; EXEC compares versions.
    pub watched: Vec<(usize, Bytes, u64)>,
    pub subs: Subscriptions,
    /// Set by QUIT/SHUTDOWN and fatal errors; the connection loop exits.
    pub should_close: bool,
}

impl Session {
    pub fn new(shared: Arc<ClientShared>, auth_required: bool) -> Self {
        Self {
            shared,
            db_index: 0,
            authenticated: !auth_required,
            in_multi: false,
            dirty_exec: false,
            queued: Vec::new(),
            watched: Vec::new(),
            subs: Subscriptions::default(),
            should_close: false,
        }
    }

    pub fn client_id(&self) -> u64 {
        self.shared.id
    }

    pub fn begin_multi(&mut self) {
        self.in_multi = true;
        self.dirty_exec = false;
        self.queued.clear();
        self.shared.set_flag(ClientFlags::IN_MULTI, true);
    }

    /// Clears transaction state; watches are released by the caller, which
    /// owns the database locks.
    pub fn end_multi(&mut self) {
        self.in_multi = false;
        self.dirty_exec = false;
        self.queued.clear();
        self.watched.clear();
        self.shared.set_flag(ClientFlags::IN_MULTI, false);
        self.shared.set_flag(ClientFlags::DIRTY_EXEC, false);
    }

    pub fn poison_multi(&mut self) {
        self.dirty_exec = true;
        self.shared.set_flag(ClientFlags::DIRTY_EXEC, true);
    }

    pub fn update_sub_flag(&self) {
        self.shared
            .set_flag(ClientFlags::SUBSCRIBED, self.subs.is_subscribed());
    }
}
