//! Connection abstraction for the batch transport
//!
//! Implementations:
//! - `UdpConnector`: connected UDP socket (statsd, dogstatsd)
//! - `InMemoryConnector`: records frames, injectable failures (tests)

use bytes::Bytes;
use parking_lot::Mutex;
use std::future::Future;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;

/// An open connection that sends whole frames
pub trait Connection: Send + 'static {
    fn send<'a>(
        &'a mut self,
        frame: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>>;
}

/// Opens connections to a fixed destination
pub trait Connector: Send + Sync + 'static {
    type Conn: Connection;

    fn connect<'a>(&'a self) -> Pin<Box<dyn Future<Output = IoResult<Self::Conn>> + Send + 'a>>;
}

// ============================================================================
// UdpConnector - production
// ============================================================================

#[derive(Debug, Clone)]
pub struct UdpConnector {
    addr: String,
}

impl UdpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        UdpConnector { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

pub struct UdpConnection {
    socket: UdpSocket,
}

impl Connector for UdpConnector {
    type Conn = UdpConnection;

    fn connect<'a>(&'a self) -> Pin<Box<dyn Future<Output = IoResult<UdpConnection>> + Send + 'a>> {
        Box::pin(async move {
            let remote = tokio::net::lookup_host(self.addr.as_str())
                .await?
                .next()
                .ok_or_else(|| {
                    IoError::new(
                        ErrorKind::AddrNotAvailable,
                        format!("no address for {}", self.addr),
                    )
                })?;
            let local: SocketAddr = if remote.is_ipv4() {
                SocketAddr::from(([0, 0, 0, 0], 0))
            } else {
                SocketAddr::from(([0u16; 8], 0))
            };
            let socket = UdpSocket::bind(local).await?;
            socket.connect(remote).await?;
            Ok(UdpConnection { socket })
        })
    }
}

impl Connection for UdpConnection {
    fn send<'a>(
        &'a mut self,
        frame: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            self.socket.send(frame).await?;
            Ok(())
        })
    }
}

// ============================================================================
// InMemoryConnector - for tests
// ============================================================================

#[derive(Debug, Default)]
struct InMemoryState {
    frames: Mutex<Vec<Bytes>>,
    fail_connects: AtomicBool,
    fail_writes: AtomicBool,
    connects: AtomicU64,
}

/// Connector whose connections append frames to a shared list
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnector {
    state: Arc<InMemoryState>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every frame sent so far, in order
    pub fn frames(&self) -> Vec<Bytes> {
        self.state.frames.lock().clone()
    }

    /// All sent lines, in order
    pub fn lines(&self) -> Vec<String> {
        self.state
            .frames
            .lock()
            .iter()
            .flat_map(|frame| {
                String::from_utf8_lossy(frame)
                    .lines()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn set_fail_connects(&self, fail: bool) {
        self.state.fail_connects.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Connection attempts, successful or not
    pub fn connect_count(&self) -> u64 {
        self.state.connects.load(Ordering::SeqCst)
    }
}

pub struct InMemoryConnection {
    state: Arc<InMemoryState>,
}

impl Connector for InMemoryConnector {
    type Conn = InMemoryConnection;

    fn connect<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = IoResult<InMemoryConnection>> + Send + 'a>> {
        Box::pin(async move {
            self.state.connects.fetch_add(1, Ordering::SeqCst);
            if self.state.fail_connects.load(Ordering::SeqCst) {
                return Err(IoError::new(ErrorKind::ConnectionRefused, "connect refused"));
            }
            Ok(InMemoryConnection {
                state: self.state.clone(),
            })
        })
    }
}

impl Connection for InMemoryConnection {
    fn send<'a>(
        &'a mut self,
        frame: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            if self.state.fail_writes.load(Ordering::SeqCst) {
                return Err(IoError::new(ErrorKind::BrokenPipe, "write failed"));
            }
            self.state
                .frames
                .lock()
                .push(Bytes::copy_from_slice(frame));
            Ok(())
        })
    }
}
