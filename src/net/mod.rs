//! Network layer - connection, framing, and dispatch
//!
//! This module provides:
//! - Connection manager owning the TCP socket
//! - Framing codecs (raw, newline, length-prefixed)
//! - Subscriber registry for stream events
//! - Ingest client running the read/dispatch loop
//! - Replay peer for serving recorded detections

pub mod address;
pub mod client;
pub mod codec;
pub mod connection;
pub mod peer;
pub mod subscribers;

pub use address::{is_valid_host, validate_host};
pub use client::{IngestClient, IngestClientConfig, IngestStats, TickResult};
pub use codec::{FrameCodec, Framing, LengthPrefixedCodec, LineCodec, RawCodec};
pub use connection::{ConnectRequest, ConnectionManager, ConnectionState, LogStatus, StatusIndicator};
pub use peer::{ReplayPeer, ReplayPeerConfig, SessionEnd};
pub use subscribers::{ChannelListener, DispatchControl, ListenerId, StreamEvent, StreamListener, Subscribers};
