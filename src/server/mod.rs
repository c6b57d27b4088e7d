//! Connection runtime: accept loop, client registry, pubsub fan-out,
//! blocking coordination and post-dispatch sampling.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Blocking-command wait queues.
pub mod blocking;
/// Client registry and shared per-client state.
pub mod client;
/// RESP framing over TCP halves.
pub mod connection;
/// Keyspace event sinks.
pub mod notify;
/// Channel/pattern subscription registry.
pub mod pubsub;
/// Per-connection session state.
pub mod session;
/// Slow log and latency tables.
pub mod slowlog;
/// The server bundle and accept loop.
#[allow(clippy::module_inception)]
pub mod server;

pub use server::Server;
pub use session::Session;
