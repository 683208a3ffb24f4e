//! Ingest client - the frame and dispatch loop.
//!
//! Each `tick()` is one cooperative quantum:
//! - idle when disconnected
//! - collect a pending connect attempt when connecting
//! - otherwise issue one non-blocking read, frame it, and dispatch
//!   every complete frame to subscribers in byte order
//!
//! A read error, EOF, or framing error is an implicit disconnect and goes
//! through the same path as `disconnect()`, so subscribers see exactly one
//! `on_disconnected` per connection.

use bytes::BytesMut;
use std::cell::RefCell;
use std::future::Future;
use std::io;
use std::rc::Rc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::codec::Decoder;

use crate::config::Config;
use crate::error::{DetlinkError, Result};
use crate::net::codec::{DEFAULT_MAX_FRAME, FrameCodec, Framing};
use crate::net::connection::{ConnectRequest, ConnectionManager, ConnectionState, StatusIndicator};
use crate::net::subscribers::{ListenerId, StreamListener, Subscribers};

/// Configuration for the ingest client.
#[derive(Debug, Clone)]
pub struct IngestClientConfig {
    pub host: String,
    pub port: u16,
    pub framing: Framing,
    /// Size of the buffer handed to each read.
    pub read_buffer_bytes: usize,
    /// Largest frame the line and length-prefixed codecs accept.
    pub max_frame_bytes: usize,
    /// Tick interval used by `run_until`.
    pub tick_interval: Duration,
}

impl Default for IngestClientConfig {
    fn default() -> Self {
        Self {
            host: "192.168.68.102".to_string(),
            port: 8080,
            framing: Framing::Raw,
            read_buffer_bytes: 4096,
            max_frame_bytes: DEFAULT_MAX_FRAME,
            tick_interval: Duration::from_millis(16),
        }
    }
}

impl IngestClientConfig {
    /// Create config targeting `host:port` with default stream settings.
    pub fn with_address(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.connection.host.clone(),
            port: config.connection.port,
            framing: config.stream.framing,
            read_buffer_bytes: config.stream.read_buffer_bytes,
            max_frame_bytes: config.stream.max_frame_bytes,
            tick_interval: config.stream.tick_interval(),
        }
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickResult {
    /// No connection and no attempt in flight
    Idle,
    /// Connect attempt still pending
    Connecting,
    /// Connect attempt completed this tick
    Connected,
    /// Connect attempt failed this tick
    ConnectFailed(String),
    /// Connected but nothing to read
    NoData,
    /// Read completed; this many frames were dispatched
    Dispatched(usize),
    /// Connection was lost this tick
    Disconnected,
}

/// Counters for the lifetime of a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub ticks: u64,
    pub connects: u64,
    pub reads: u64,
    pub bytes_read: u64,
    pub frames_dispatched: u64,
    pub disconnects: u64,
}

impl IngestStats {
    fn record_read(&mut self, bytes: usize) {
        self.reads += 1;
        self.bytes_read += bytes as u64;
    }
}

/// Reads from the peer and dispatches frames to subscribers.
pub struct IngestClient {
    config: IngestClientConfig,
    connection: ConnectionManager,
    codec: FrameCodec,
    read_buf: Vec<u8>,
    pending: BytesMut,
    subscribers: Subscribers,
    stats: IngestStats,
}

impl IngestClient {
    pub fn new(config: IngestClientConfig) -> Self {
        let connection = ConnectionManager::new(config.host.clone(), config.port);
        let codec = FrameCodec::new(config.framing, config.max_frame_bytes);
        let read_buf = vec![0u8; config.read_buffer_bytes.max(1)];
        Self {
            config,
            connection,
            codec,
            read_buf,
            pending: BytesMut::new(),
            subscribers: Subscribers::new(),
            stats: IngestStats::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(IngestClientConfig::from_config(config))
    }

    pub fn config(&self) -> &IngestClientConfig {
        &self.config
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn framing(&self) -> Framing {
        self.codec.framing()
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    pub fn set_status_indicator(&mut self, indicator: impl StatusIndicator + 'static) {
        self.connection.set_status_indicator(indicator);
    }

    /// Register a listener for messages and disconnects.
    pub fn subscribe<L: StreamListener + 'static>(&mut self, listener: Rc<RefCell<L>>) -> ListenerId {
        self.subscribers.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Set the host for future connects.
    pub fn update_host(&mut self, host: impl Into<String>) {
        self.connection.update_host(host);
    }

    /// Validate and set the host for future connects.
    pub fn try_update_host(&mut self, host: &str) -> Result<()> {
        self.connection.try_update_host(host)
    }

    /// Start connecting. The result is collected by a later `tick()`.
    pub fn connect(&mut self) -> ConnectRequest {
        self.connection.connect()
    }

    /// Start connecting (if needed) and wait for the attempt to resolve.
    ///
    /// Returns Ok without counting a new connect if already connected.
    pub async fn connect_and_wait(&mut self) -> Result<()> {
        if self.connection.connect() == ConnectRequest::AlreadyConnected {
            return Ok(());
        }
        self.connection.wait_connected().await?;
        self.stats.connects += 1;
        Ok(())
    }

    /// Close the connection and notify subscribers.
    ///
    /// Returns false, with no notification, if there was no open connection.
    pub fn disconnect(&mut self) -> bool {
        if !self.connection.disconnect() {
            return false;
        }
        if !self.pending.is_empty() {
            log::debug!("Discarding {} buffered bytes", self.pending.len());
            self.pending.clear();
        }
        self.stats.disconnects += 1;
        self.subscribers.emit_disconnected();
        true
    }

    /// Run one scheduling quantum. Never blocks.
    pub fn tick(&mut self) -> TickResult {
        self.stats.ticks += 1;

        match self.connection.state() {
            ConnectionState::Disconnected => return TickResult::Idle,
            ConnectionState::Connecting => {
                return match self.connection.poll_connect() {
                    None => TickResult::Connecting,
                    Some(Ok(())) => {
                        self.stats.connects += 1;
                        TickResult::Connected
                    }
                    Some(Err(e)) => TickResult::ConnectFailed(e.to_string()),
                };
            }
            ConnectionState::Connected => {}
        }

        let read = match self.connection.stream() {
            Some(stream) => stream.try_read(&mut self.read_buf),
            None => return TickResult::Idle,
        };

        let n = match read {
            Ok(0) => {
                self.fail_stream(DetlinkError::Stream("peer closed the connection".into()));
                return TickResult::Disconnected;
            }
            Ok(n) => n,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                return TickResult::NoData;
            }
            Err(e) => {
                self.fail_stream(DetlinkError::Stream(e.to_string()));
                return TickResult::Disconnected;
            }
        };

        self.stats.record_read(n);
        self.pending.extend_from_slice(&self.read_buf[..n]);

        let mut frames = Vec::new();
        let mut framing_error = None;
        loop {
            match self.codec.decode(&mut self.pending) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                Err(e) => {
                    framing_error = Some(e);
                    break;
                }
            }
        }

        let total = frames.len();
        let mut dispatched = 0;
        for frame in frames {
            if frame.is_empty() {
                continue;
            }
            let control = self.subscribers.emit_message(&frame);
            dispatched += 1;
            self.stats.frames_dispatched += 1;

            if control.disconnect_requested() {
                log::info!("Listener requested disconnect");
                if total > dispatched {
                    log::debug!("Dropping {} undelivered frames", total - dispatched);
                }
                self.disconnect();
                return TickResult::Dispatched(dispatched);
            }
        }

        if let Some(e) = framing_error {
            self.fail_stream(DetlinkError::Stream(format!("framing error: {}", e)));
            return TickResult::Disconnected;
        }

        TickResult::Dispatched(dispatched)
    }

    /// Drive `tick()` on an interval until `shutdown` resolves, then disconnect.
    pub async fn run_until<F: Future<Output = ()>>(&mut self, shutdown: F) -> IngestStats {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }

        log::info!("Ingest loop stopping");
        self.disconnect();
        self.stats.clone()
    }

    fn fail_stream(&mut self, err: DetlinkError) {
        log::error!("{}", err);
        self.disconnect();
    }
}

impl Drop for IngestClient {
    fn drop(&mut self) {
        // Subscribers always get a closing notification
        self.disconnect();
    }
}
