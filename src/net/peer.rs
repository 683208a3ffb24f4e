//! Replay peer - serves recorded detections to a client.
//!
//! Stands in for the inference server: listens on TCP, accepts one client
//! at a time, and writes one frame per `DetectionMessage` until the script
//! ends or the client goes away.

use bytes::BytesMut;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Encoder;

use crate::detection::DetectionMessage;
use crate::error::{DetlinkError, Result};
use crate::net::codec::{DEFAULT_MAX_FRAME, FrameCodec, Framing};

/// Configuration for the replay peer.
#[derive(Debug, Clone)]
pub struct ReplayPeerConfig {
    pub framing: Framing,
    /// Pause between consecutive messages.
    pub interval: Duration,
    /// Start over from the first message when the script ends.
    pub repeat: bool,
}

impl Default for ReplayPeerConfig {
    fn default() -> Self {
        Self {
            framing: Framing::Raw,
            interval: Duration::from_millis(33),
            repeat: false,
        }
    }
}

/// How a replay session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Every message was written
    Completed { sent: usize },
    /// The client closed the connection
    ClientGone { sent: usize },
}

impl SessionEnd {
    pub fn sent(&self) -> usize {
        match *self {
            SessionEnd::Completed { sent } | SessionEnd::ClientGone { sent } => sent,
        }
    }
}

/// TCP server that replays detection messages.
pub struct ReplayPeer {
    listener: TcpListener,
    config: ReplayPeerConfig,
}

impl ReplayPeer {
    pub async fn bind(addr: &str, config: ReplayPeerConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DetlinkError::Connection(format!("Failed to bind {}: {}", addr, e)))?;
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept one client and replay `messages` to it.
    pub async fn serve_one(&self, messages: &[DetectionMessage]) -> Result<SessionEnd> {
        log::info!("Waiting for a connection...");
        let (stream, addr) = self.listener.accept().await?;
        log::info!("Connection from {} has been established", addr);
        let end = self.replay(stream, messages).await?;
        log::info!("Connection closed after {} messages", end.sent());
        Ok(end)
    }

    /// Serve clients one after another, forever.
    pub async fn serve_forever(&self, messages: &[DetectionMessage]) -> Result<()> {
        loop {
            self.serve_one(messages).await?;
        }
    }

    async fn replay(&self, mut stream: TcpStream, messages: &[DetectionMessage]) -> Result<SessionEnd> {
        let mut codec = FrameCodec::new(self.config.framing, DEFAULT_MAX_FRAME);
        let mut buf = BytesMut::new();
        let mut sent = 0;

        if messages.is_empty() {
            return Ok(SessionEnd::Completed { sent });
        }

        loop {
            for message in messages {
                let json = serde_json::to_string(message)?;
                buf.clear();
                codec.encode(json.as_str(), &mut buf)?;

                if let Err(e) = stream.write_all(&buf).await {
                    log::info!("Client disconnected: {}", e);
                    return Ok(SessionEnd::ClientGone { sent });
                }
                sent += 1;

                if !self.config.interval.is_zero() {
                    tokio::time::sleep(self.config.interval).await;
                }
            }
            if !self.config.repeat {
                break;
            }
        }

        if let Err(e) = stream.shutdown().await {
            log::debug!("Shutdown after replay failed: {}", e);
        }
        Ok(SessionEnd::Completed { sent })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Detection;
    use tokio::io::AsyncReadExt;

    fn sample() -> Vec<DetectionMessage> {
        vec![
            DetectionMessage::new(vec![Detection::new("person", [1, 2, 3, 4])]),
            DetectionMessage::new(vec![]),
        ]
    }

    #[test]
    fn test_config_default() {
        let config = ReplayPeerConfig::default();
        assert_eq!(config.framing, Framing::Raw);
        assert!(!config.repeat);
    }

    #[test]
    fn test_session_end_sent() {
        assert_eq!(SessionEnd::Completed { sent: 3 }.sent(), 3);
        assert_eq!(SessionEnd::ClientGone { sent: 1 }.sent(), 1);
    }

    #[tokio::test]
    async fn test_bind_bad_address_fails() {
        let result = ReplayPeer::bind("not-an-address", ReplayPeerConfig::default()).await;
        assert!(matches!(result, Err(DetlinkError::Connection(_))));
    }

    #[tokio::test]
    async fn test_replays_line_frames() {
        let config = ReplayPeerConfig {
            framing: Framing::Line,
            interval: Duration::ZERO,
            repeat: false,
        };
        let peer = ReplayPeer::bind("127.0.0.1:0", config).await.unwrap();
        let addr = peer.local_addr().unwrap();
        let messages = sample();

        let server = async { peer.serve_one(&messages).await.unwrap() };
        let client = async {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let mut text = String::new();
            stream.read_to_string(&mut text).await.unwrap();
            text
        };
        let (end, text) = tokio::join!(server, client);

        assert_eq!(end, SessionEnd::Completed { sent: 2 });
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"detections":[{"class_name":"person","bbox":[1,2,3,4]}]}"#);
        assert_eq!(lines[1], r#"{"detections":[]}"#);
    }
}
