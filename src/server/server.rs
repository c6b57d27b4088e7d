// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The server bundle: every singleton a handler can reach, plus the
//! accept loop and the background expiration cycle.
//!
//! Databases are plain mutexes held for the duration of one handler call;
//! handlers are synchronous, so a command is a single linearization point
//! per database. Socket I/O and blocking waits always happen with no
//! database lock held.

use std::sync::{
    Arc, Mutex, MutexGuard, RwLock,
    atomic::{AtomicU64, Ordering},
};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::interval,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    cfg::config::Config,
    cluster::ClusterMap,
    commands,
    resp::Frame,
    server::{
        blocking::BlockingCoordinator,
        client::ClientRegistry,
        connection::{ConnectionError, FrameReader, FrameWriter},
        notify::{Notifier, TracingNotifier},
        pubsub::PubSub,
        session::Session,
        slowlog::{LatencyStats, SlowLog},
    },
    storage::{Db, now_ms},
};

#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_received: AtomicU64,
    pub commands_processed: AtomicU64,
    pub expired_keys: AtomicU64,
}

pub struct Server {
    pub cfg: Config,
    dbs: Vec<Mutex<Db>>,
    pub cluster: RwLock<ClusterMap>,
    pub clients: ClientRegistry,
    pub pubsub: PubSub,
    pub blocking: Arc<BlockingCoordinator>,
    pub slowlog: SlowLog,
    pub latency: LatencyStats,
    pub notifier: Box<dyn Notifier>,
    pub stats: ServerStats,
    pub start_ms: u64,
    /// Cancelling this stops the accept loop and every connection task.
    pub shutdown: CancellationToken,
}

impl Server {
    pub fn new(cfg: Config) -> Arc<Self> {
        Self::with_notifier(cfg, Box::new(TracingNotifier))
    }

    pub fn with_notifier(cfg: Config, notifier: Box<dyn Notifier>) -> Arc<Self> {
        let dbs = (0..cfg.server.databases)
            .map(|_| Mutex::new(Db::new()))
            .collect();
        let cluster = ClusterMap::new(
            cfg.cluster.enabled.as_bool(),
            if cfg.cluster.announce_ip.is_empty() {
                cfg.server.bind.clone()
            } else {
                cfg.cluster.announce_ip.clone()
            },
            if cfg.cluster.announce_port == 0 {
                cfg.server.port
            } else {
                cfg.cluster.announce_port
            },
        );
        let slowlog = SlowLog::new(cfg.slowlog.log_slower_than, cfg.slowlog.max_len);
        Arc::new(Self {
            dbs,
            cluster: RwLock::new(cluster),
            clients: ClientRegistry::new(),
            pubsub: PubSub::new(),
            blocking: Arc::new(BlockingCoordinator::new()),
            slowlog,
            latency: LatencyStats::new(),
            notifier,
            stats: ServerStats::default(),
            start_ms: now_ms(),
            shutdown: CancellationToken::new(),
            cfg,
        })
    }

    pub fn db_count(&self) -> usize {
        self.dbs.len()
    }

    /// Exclusive access to one database for the span of a handler call.
    pub fn db(&self, index: usize) -> MutexGuard<'_, Db> {
        match self.dbs[index].lock() {
            Ok(guard) => guard,
            // A panicked handler poisons the lock; keep serving.
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn notify(&self, db_index: usize, key: &[u8], event: &str) {
        self.notifier.notify(db_index, key, event);
    }

    /// Binds the configured listener and serves until shutdown.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let addr = format!("{}:{}", self.cfg.server.bind, self.cfg.server.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        info!("listening on {addr}");
        self.serve(listener).await
    }

    /// Accept loop over an already-bound listener (tests bind port 0).
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let expire = self.clone();
        tokio::spawn(async move { expire.expiration_cycle().await });

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("shutdown requested; closing listener");
                    return Ok(());
                },
                accepted = listener.accept() => {
                    let (stream, peer) = accepted.context("accept failed")?;
                    let server = self.clone();
                    tokio::spawn(async move {
                        server.handle_connection(stream, peer.to_string()).await;
                    });
                },
            }
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream, peer: String) {
        self.stats
            .connections_received
            .fetch_add(1, Ordering::Relaxed);
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed for {peer}: {e}");
        }

        let (read_half, write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half);
        let (out_tx, out_rx) = mpsc::unbounded_channel::<Frame>();

        if self.clients.len() >= self.cfg.server.maxclients {
            let _ = out_tx.send(Frame::error("ERR max number of clients reached"));
            drop(out_tx);
            FrameWriter::new(write_half).run(out_rx).await;
            return;
        }

        tokio::spawn(FrameWriter::new(write_half).run(out_rx));

        let shared = self.clients.register(peer.clone(), out_tx.clone());
        let mut session =
            Session::new(shared.clone(), self.cfg.requirepass.is_some());
        debug!(client = shared.id, %peer, "client connected");

        let idle_cap = self.cfg.server.timeout;
        loop {
            let frame = tokio::select! {
                biased;
                _ = shared.kill.cancelled() => break,
                _ = self.shutdown.cancelled() => break,
                res = read_with_idle(&mut reader, idle_cap) => match res {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break,
                    Err(ConnectionError::Protocol(e)) => {
                        let _ = out_tx
                            .send(Frame::error(format!("ERR Protocol error: {e}")));
                        break;
                    },
                    Err(e) => {
                        debug!(client = shared.id, "read error: {e}");
                        break;
                    },
                },
            };

            let argv = match frame.into_argv() {
                Ok(argv) => argv,
                Err(e) => {
                    let _ =
                        out_tx.send(Frame::error(format!("ERR Protocol error: {e}")));
                    break;
                },
            };
            if argv.is_empty() {
                continue;
            }

            shared.touch();
            self.stats.commands_processed.fetch_add(1, Ordering::Relaxed);
            commands::dispatch(&self, &mut session, &out_tx, argv).await;
            if session.should_close {
                break;
            }
        }

        // Synchronous teardown: subscriptions, registry entry, transaction
        // state. Blocking waiters die with the dropped wait future.
        self.pubsub.drop_client(shared.id, &session.subs);
        self.clients.unregister(shared.id);
        debug!(client = shared.id, "client disconnected");
    }

    /// Active TTL reclamation: every tick, sample each database's expiry
    /// index; keep re-sampling a database while more than a quarter of the
    /// sample was dead, within a fixed time budget.
    async fn expiration_cycle(self: Arc<Self>) {
        const BUDGET: Duration = Duration::from_millis(25);
        let mut tick = interval(Duration::from_millis(self.cfg.expire.cycle_ms));
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = tick.tick() => {},
            }
            let started = Instant::now();
            let samples = self.cfg.expire.samples_per_db;
            for index in 0..self.dbs.len() {
                loop {
                    let (sampled, reclaimed) = {
                        let mut db = self.db(index);
                        db.expire_sample(samples, now_ms())
                    };
                    if reclaimed > 0 {
                        self.stats
                            .expired_keys
                            .fetch_add(reclaimed as u64, Ordering::Relaxed);
                        debug!(db = index, reclaimed, "active expire");
                    }
                    // Keep going only while the dead fraction stays high.
                    if sampled == 0
                        || reclaimed * 4 <= sampled
                        || started.elapsed() >= BUDGET
                    {
                        break;
                    }
                }
                if started.elapsed() >= BUDGET {
                    warn!("expire cycle hit its time budget");
                    break;
                }
            }
        }
    }
}

async fn read_with_idle(
    reader: &mut FrameReader,
    idle_cap: Duration,
) -> Result<Option<Frame>, ConnectionError> {
    if idle_cap.is_zero() {
        reader.read_frame().await
    } else {
        match tokio::time::timeout(idle_cap, reader.read_frame()).await {
            Ok(res) => res,
            // Idle timeout closes like a clean EOF.
            Err(_) => Ok(None),
        }
    }
}
