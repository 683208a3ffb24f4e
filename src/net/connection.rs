//! Connection manager for the inference peer.
//!
//! Owns the TCP socket and its state machine:
//! - Disconnected -> Connecting on `connect()`
//! - Connecting -> Connected / Disconnected when the attempt resolves
//! - Connected -> Disconnected on `disconnect()` or a stream failure
//!
//! Connect attempts run as a spawned tokio task so the caller never blocks;
//! the result is collected with `poll_connect()` on a later tick.

use futures::FutureExt;
use std::fmt;
use std::io;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::error::{DetlinkError, Result};
use crate::net::address::validate_host;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Outcome of a `connect()` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectRequest {
    /// A new attempt was spawned
    Started,
    /// An attempt is already in flight; nothing was done
    AlreadyConnecting,
    /// Already connected; nothing was done
    AlreadyConnected,
}

/// Observer for the connected/disconnected indicator.
///
/// Purely observational: nothing in the client reads it back.
pub trait StatusIndicator {
    fn set_connected(&mut self, connected: bool);
}

impl<F: FnMut(bool)> StatusIndicator for F {
    fn set_connected(&mut self, connected: bool) {
        self(connected)
    }
}

/// Default indicator that only logs.
#[derive(Debug, Default)]
pub struct LogStatus;

impl StatusIndicator for LogStatus {
    fn set_connected(&mut self, connected: bool) {
        log::info!("Connection status: {}", if connected { "connected" } else { "disconnected" });
    }
}

enum Link {
    Idle,
    Pending(JoinHandle<io::Result<TcpStream>>),
    Open(TcpStream),
}

/// Owns the socket to the inference peer.
pub struct ConnectionManager {
    host: String,
    port: u16,
    link: Link,
    attempts: u64,
    status: Box<dyn StatusIndicator>,
}

impl ConnectionManager {
    /// Create a manager targeting `host:port`. Starts disconnected.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let mut manager = Self {
            host: host.into(),
            port,
            link: Link::Idle,
            attempts: 0,
            status: Box::new(LogStatus),
        };
        manager.status.set_connected(false);
        manager
    }

    /// Replace the status indicator. It is immediately told the current state.
    pub fn set_status_indicator(&mut self, indicator: impl StatusIndicator + 'static) {
        self.status = Box::new(indicator);
        let connected = self.is_connected();
        self.status.set_connected(connected);
    }

    pub fn state(&self) -> ConnectionState {
        match self.link {
            Link::Idle => ConnectionState::Disconnected,
            Link::Pending(_) => ConnectionState::Connecting,
            Link::Open(_) => ConnectionState::Connected,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.link, Link::Open(_))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Number of connect attempts spawned so far.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Set the host used by future `connect()` calls. An active connection is untouched.
    pub fn update_host(&mut self, host: impl Into<String>) {
        self.host = host.into();
        log::info!("Target host set to {}:{}", self.host, self.port);
    }

    /// Validate and set the host. On failure the current host is kept.
    pub fn try_update_host(&mut self, host: &str) -> Result<()> {
        if let Err(e) = validate_host(host) {
            log::error!("{}", e);
            return Err(e);
        }
        self.update_host(host);
        Ok(())
    }

    /// Start a connection attempt unless one is active or in flight.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&mut self) -> ConnectRequest {
        match self.link {
            Link::Open(_) => return ConnectRequest::AlreadyConnected,
            Link::Pending(_) => return ConnectRequest::AlreadyConnecting,
            Link::Idle => {}
        }

        let host = self.host.clone();
        let port = self.port;
        log::info!("Connecting to {}:{}", host, port);

        self.attempts += 1;
        self.link = Link::Pending(tokio::spawn(async move { TcpStream::connect((host.as_str(), port)).await }));
        ConnectRequest::Started
    }

    /// Collect the result of a pending attempt without blocking.
    ///
    /// Returns `None` when nothing is pending or the attempt has not resolved.
    pub fn poll_connect(&mut self) -> Option<Result<()>> {
        let Link::Pending(handle) = &mut self.link else {
            return None;
        };
        if !handle.is_finished() {
            return None;
        }
        let joined = handle.now_or_never()?;
        Some(self.finish_connect(joined))
    }

    /// Wait for a pending attempt to resolve.
    ///
    /// Returns Ok immediately if already connected.
    pub async fn wait_connected(&mut self) -> Result<()> {
        match &mut self.link {
            Link::Open(_) => Ok(()),
            Link::Idle => Err(DetlinkError::Connection("no connection attempt in progress".into())),
            Link::Pending(handle) => {
                let joined = handle.await;
                self.finish_connect(joined)
            }
        }
    }

    fn finish_connect(&mut self, joined: std::result::Result<io::Result<TcpStream>, tokio::task::JoinError>) -> Result<()> {
        match joined {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    log::debug!("Failed to set TCP_NODELAY: {}", e);
                }
                log::info!("Connected to {}:{}", self.host, self.port);
                self.link = Link::Open(stream);
                self.status.set_connected(true);
                Ok(())
            }
            Ok(Err(e)) => self.fail_connect(e.to_string()),
            Err(e) => self.fail_connect(format!("connect task failed: {}", e)),
        }
    }

    fn fail_connect(&mut self, reason: String) -> Result<()> {
        let err = DetlinkError::Connection(format!("Failed to connect to {}:{}: {}", self.host, self.port, reason));
        log::error!("{}", err);
        self.link = Link::Idle;
        self.status.set_connected(false);
        Err(err)
    }

    /// Close the connection.
    ///
    /// Returns true only when a Connected -> Disconnected transition happened;
    /// the caller is responsible for notifying subscribers exactly once.
    /// An in-flight attempt is aborted without counting as a transition.
    pub fn disconnect(&mut self) -> bool {
        match std::mem::replace(&mut self.link, Link::Idle) {
            Link::Idle => false,
            Link::Pending(handle) => {
                log::info!("Aborting connection attempt to {}:{}", self.host, self.port);
                handle.abort();
                self.status.set_connected(false);
                false
            }
            Link::Open(stream) => {
                drop(stream);
                log::info!("Disconnected from {}:{}", self.host, self.port);
                self.status.set_connected(false);
                true
            }
        }
    }

    /// The open stream, if connected.
    pub fn stream(&self) -> Option<&TcpStream> {
        match &self.link {
            Link::Open(stream) => Some(stream),
            _ => None,
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("state", &self.state())
            .field("attempts", &self.attempts)
            .finish()
    }
}
