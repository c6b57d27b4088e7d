// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::debug;

/// Keyspace event sink. Write paths report `(db, key, event)` tuples
/// ("set", "del", "expired", "lpush", ...); the sink decides what to do
/// with them.
pub trait Notifier: Send + Sync {
    fn notify(&self, db_index: usize, key: &[u8], event: &str);
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _db_index: usize, _key: &[u8], _event: &str) {}
}

/// Logs events at debug level; the default sink.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, db_index: usize, key: &[u8], event: &str) {
        debug!(
            db = db_index,
            key = %String::from_utf8_lossy(key),
            event,
            "keyspace event"
        );
    }
}
