//! Transport Actor - Single Writer Draining a Bounded Queue
//!
//! Producers push finished lines through a [`TransportHandle`] without ever
//! waiting; the actor owns the connection and the frame buffer.
//!
//! ```text
//! producer ──┐  try_send (drop when full)
//! producer ──┤──► bounded queue ──► TransportActor ──► frame ──► Connection
//! producer ──┘
//! ```
//!
//! ## States
//!
//! ```text
//!   Connecting ──ok──► Streaming ──write error──► Waiting ──backoff──► Connecting
//!       │                  │                         ▲
//!       └──connect error───┼─────────────────────────┘
//!                          │
//!   (any state) ──cancel / all handles dropped──► Closed
//! ```
//!
//! While Waiting the queue keeps draining and lines are discarded, so
//! producers never see backpressure from a dead destination.

use super::connector::{Connection, Connector};
use super::frame::TransportFrame;
use crate::metrics::{MetricsError, TransportConfig};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransportState {
    Connecting = 0,
    Streaming = 1,
    Waiting = 2,
    Closed = 3,
}

impl TransportState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => TransportState::Connecting,
            1 => TransportState::Streaming,
            2 => TransportState::Waiting,
            _ => TransportState::Closed,
        }
    }
}

/// Counters shared between the actor and its handles
#[derive(Debug)]
pub struct TransportStats {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    discarded: AtomicU64,
    lines_sent: AtomicU64,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    write_errors: AtomicU64,
    connect_errors: AtomicU64,
    state: AtomicU8,
}

impl Default for TransportStats {
    fn default() -> Self {
        TransportStats {
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            lines_sent: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            connect_errors: AtomicU64::new(0),
            state: AtomicU8::new(TransportState::Connecting as u8),
        }
    }
}

impl TransportStats {
    fn set_state(&self, state: TransportState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn state(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn snapshot(&self) -> TransportStatsSnapshot {
        TransportStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            lines_sent: self.lines_sent.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            connect_errors: self.connect_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`TransportStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStatsSnapshot {
    /// Lines accepted into the queue
    pub enqueued: u64,
    /// Lines rejected because the queue was full or closed
    pub dropped: u64,
    /// Accepted lines lost to backoff, write failures or shutdown
    pub discarded: u64,
    pub lines_sent: u64,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub write_errors: u64,
    pub connect_errors: u64,
}

// ============================================================================
// TransportHandle - producer side
// ============================================================================

/// Cloneable producer handle. The actor closes once every handle is dropped
/// or [`shutdown`](TransportHandle::shutdown) is called.
#[derive(Clone)]
pub struct TransportHandle {
    tx: mpsc::Sender<String>,
    stats: Arc<TransportStats>,
    cancel: CancellationToken,
}

impl TransportHandle {
    /// Enqueue a finished line without waiting.
    ///
    /// Returns false when the line was dropped (queue full or closed).
    pub fn push_metric(&self, line: String) -> bool {
        match self.tx.try_send(line) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Lines waiting in the queue
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    pub fn state(&self) -> TransportState {
        self.stats.state()
    }

    pub fn stats(&self) -> TransportStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop the actor; queued lines get one best-effort flush
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

// ============================================================================
// TransportActor - single writer
// ============================================================================

enum StreamExit {
    Failed,
    Closed,
}

enum WaitExit {
    Reconnect,
    Closed,
}

pub struct TransportActor<K: Connector> {
    connector: K,
    rx: mpsc::Receiver<String>,
    frame: TransportFrame,
    flush_interval: Duration,
    backoff: Duration,
    stats: Arc<TransportStats>,
    cancel: CancellationToken,
}

impl<K: Connector> TransportActor<K> {
    /// Run until cancelled or every handle is dropped
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval_at(
            Instant::now() + self.flush_interval,
            self.flush_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            self.stats.set_state(TransportState::Connecting);
            let connected = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                result = self.connector.connect() => Some(result),
            };

            let mut conn = match connected {
                None => return self.close(None).await,
                Some(Ok(conn)) => conn,
                Some(Err(e)) => {
                    error!("metrics transport connect failed: {}", e);
                    self.stats.connect_errors.fetch_add(1, Ordering::Relaxed);
                    match self.wait().await {
                        WaitExit::Reconnect => continue,
                        WaitExit::Closed => return self.close(None).await,
                    }
                }
            };

            debug!("metrics transport connected");
            self.stats.set_state(TransportState::Streaming);
            match self.stream(&mut conn, &mut ticker).await {
                StreamExit::Closed => return self.close(Some(conn)).await,
                StreamExit::Failed => match self.wait().await {
                    WaitExit::Reconnect => continue,
                    WaitExit::Closed => return self.close(None).await,
                },
            }
        }
    }

    async fn stream(&mut self, conn: &mut K::Conn, ticker: &mut Interval) -> StreamExit {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return StreamExit::Closed,
                _ = ticker.tick() => {
                    if !self.frame.is_empty() && self.send_frame(conn).await.is_err() {
                        return StreamExit::Failed;
                    }
                }
                msg = self.rx.recv() => {
                    let Some(line) = msg else {
                        return StreamExit::Closed;
                    };
                    if self.frame.would_overflow(line.len())
                        && self.send_frame(conn).await.is_err()
                    {
                        // The line that triggered the flush goes down with the frame
                        self.stats.discarded.fetch_add(1, Ordering::Relaxed);
                        return StreamExit::Failed;
                    }
                    self.frame.push(&line);
                }
            }
        }
    }

    /// Send and clear the frame. Lines in a failed frame count as discarded.
    async fn send_frame(&mut self, conn: &mut K::Conn) -> std::io::Result<()> {
        let (bytes, lines) = self.frame.take();
        match conn.send(&bytes).await {
            Ok(()) => {
                self.stats.frames_sent.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .bytes_sent
                    .fetch_add(bytes.len() as u64, Ordering::Relaxed);
                self.stats
                    .lines_sent
                    .fetch_add(lines as u64, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                error!("metrics transport write failed: {}", e);
                self.stats.write_errors.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .discarded
                    .fetch_add(lines as u64, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Discard incoming lines until the backoff elapses
    async fn wait(&mut self) -> WaitExit {
        self.stats.set_state(TransportState::Waiting);
        let backoff = tokio::time::sleep(self.backoff);
        tokio::pin!(backoff);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return WaitExit::Closed,
                _ = &mut backoff => return WaitExit::Reconnect,
                msg = self.rx.recv() => match msg {
                    Some(_) => {
                        self.stats.discarded.fetch_add(1, Ordering::Relaxed);
                    }
                    None => return WaitExit::Closed,
                },
            }
        }
    }

    /// Refuse further lines, drain the queue and flush once if connected
    async fn close(mut self, conn: Option<K::Conn>) {
        self.stats.set_state(TransportState::Closed);
        self.rx.close();

        let Some(mut conn) = conn else {
            let mut discarded = self.frame.take().1 as u64;
            while self.rx.try_recv().is_ok() {
                discarded += 1;
            }
            self.stats.discarded.fetch_add(discarded, Ordering::Relaxed);
            info!(discarded, "metrics transport closed while disconnected");
            return;
        };

        let mut failed = false;
        while let Ok(line) = self.rx.try_recv() {
            if failed {
                self.stats.discarded.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            if self.frame.would_overflow(line.len()) && self.send_frame(&mut conn).await.is_err() {
                self.stats.discarded.fetch_add(1, Ordering::Relaxed);
                failed = true;
                continue;
            }
            self.frame.push(&line);
        }
        if !failed && !self.frame.is_empty() && self.send_frame(&mut conn).await.is_err() {
            warn!("final metrics flush failed");
        }
        info!("metrics transport closed");
    }
}

/// Build a connected handle/actor pair without spawning
pub fn transport_pair<K: Connector>(
    connector: K,
    config: &TransportConfig,
) -> Result<(TransportHandle, TransportActor<K>), MetricsError> {
    config.validate()?;
    let (tx, rx) = mpsc::channel(config.queue_capacity);
    let stats = Arc::new(TransportStats::default());
    let cancel = CancellationToken::new();

    let handle = TransportHandle {
        tx,
        stats: stats.clone(),
        cancel: cancel.clone(),
    };
    let actor = TransportActor {
        connector,
        rx,
        frame: TransportFrame::new(config.max_packet_size),
        flush_interval: config.flush_interval,
        backoff: config.reconnect_backoff,
        stats,
        cancel,
    };
    Ok((handle, actor))
}

/// Spawn a transport actor and return its handle + join handle
pub fn spawn_transport<K: Connector>(
    connector: K,
    config: &TransportConfig,
) -> Result<(TransportHandle, JoinHandle<()>), MetricsError> {
    let (handle, actor) = transport_pair(connector, config)?;
    let task = tokio::spawn(actor.run());
    Ok((handle, task))
}
