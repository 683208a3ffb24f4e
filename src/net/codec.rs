//! Framing codecs for the detection stream.
//!
//! The peer defines no framing of its own, so the client supports three:
//! - `raw`: whatever one read returned is one message
//! - `line`: newline-delimited text
//! - `length-prefixed`: 4-byte big-endian length, then the payload
//!
//! All decoders yield UTF-8 text frames; JSON decoding happens downstream.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Default maximum frame size (1 MB).
pub const DEFAULT_MAX_FRAME: usize = 1024 * 1024;

/// Message boundary scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// One read is one message. Matches the peer as observed, including its
    /// inability to tell coalesced or split writes apart.
    #[default]
    Raw,
    /// Messages end with `\n`.
    Line,
    /// Messages carry a 4-byte big-endian length prefix.
    LengthPrefixed,
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framing::Raw => write!(f, "raw"),
            Framing::Line => write!(f, "line"),
            Framing::LengthPrefixed => write!(f, "length-prefixed"),
        }
    }
}

fn too_large(len: usize, max: usize) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("Frame too large: {} > {}", len, max))
}

/// Passes each buffered chunk through as a single frame.
#[derive(Debug, Clone, Default)]
pub struct RawCodec;

impl Decoder for RawCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        // Take everything buffered
        let chunk = src.split();
        Ok(Some(String::from_utf8_lossy(&chunk).into_owned()))
    }
}

impl Encoder<&str> for RawCodec {
    type Error = io::Error;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // Trailing newline mirrors what the inference server writes after every batch
        dst.reserve(item.len() + 1);
        dst.put_slice(item.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

/// Newline-delimited text frames.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_FRAME)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self { max_length }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            // Find newline
            let Some(pos) = src.iter().position(|&b| b == b'\n') else {
                // Partial line; check max length
                if src.len() > self.max_length {
                    return Err(too_large(src.len(), self.max_length));
                }
                return Ok(None);
            };

            if pos > self.max_length {
                return Err(too_large(pos, self.max_length));
            }

            // Take the line, then drop the newline
            let line = src.split_to(pos);
            src.advance(1);

            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end_matches('\r');
            if text.trim().is_empty() {
                continue;
            }
            return Ok(Some(text.to_string()));
        }
    }
}

impl Encoder<&str> for LineCodec {
    type Error = io::Error;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_length {
            return Err(too_large(item.len(), self.max_length));
        }
        if item.contains('\n') {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "Line frame contains a newline"));
        }
        dst.reserve(item.len() + 1);
        dst.put_slice(item.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

/// Length-prefixed text frames.
///
/// Frames are laid out as:
/// - 4 bytes: payload length (big-endian u32)
/// - N bytes: UTF-8 payload
#[derive(Debug, Clone)]
pub struct LengthPrefixedCodec {
    max_length: usize,
}

impl LengthPrefixedCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_FRAME)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self { max_length }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for LengthPrefixedCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LengthPrefixedCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Need at least 4 bytes for the length prefix
        if src.len() < 4 {
            return Ok(None);
        }

        // Peek at the length without consuming
        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if length > self.max_length {
            return Err(too_large(length, self.max_length));
        }

        // Check if we have the full frame
        if src.len() < 4 + length {
            src.reserve(4 + length - src.len());
            return Ok(None);
        }

        // Consume the length prefix
        src.advance(4);

        // Take the payload bytes
        let data = src.split_to(length);
        Ok(Some(String::from_utf8_lossy(&data).into_owned()))
    }
}

impl Encoder<&str> for LengthPrefixedCodec {
    type Error = io::Error;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let length = item.len();
        if length > self.max_length {
            return Err(too_large(length, self.max_length));
        }
        // Write length prefix and data
        dst.reserve(4 + length);
        dst.put_u32(length as u32);
        dst.put_slice(item.as_bytes());
        Ok(())
    }
}

/// Codec selected at runtime from a [`Framing`].
#[derive(Debug, Clone)]
pub enum FrameCodec {
    Raw(RawCodec),
    Line(LineCodec),
    LengthPrefixed(LengthPrefixedCodec),
}

impl FrameCodec {
    pub fn new(framing: Framing, max_length: usize) -> Self {
        match framing {
            Framing::Raw => FrameCodec::Raw(RawCodec),
            Framing::Line => FrameCodec::Line(LineCodec::with_max_length(max_length)),
            Framing::LengthPrefixed => FrameCodec::LengthPrefixed(LengthPrefixedCodec::with_max_length(max_length)),
        }
    }

    pub fn framing(&self) -> Framing {
        match self {
            FrameCodec::Raw(_) => Framing::Raw,
            FrameCodec::Line(_) => Framing::Line,
            FrameCodec::LengthPrefixed(_) => Framing::LengthPrefixed,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self {
            FrameCodec::Raw(c) => c.decode(src),
            FrameCodec::Line(c) => c.decode(src),
            FrameCodec::LengthPrefixed(c) => c.decode(src),
        }
    }
}

impl Encoder<&str> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match self {
            FrameCodec::Raw(c) => c.encode(item, dst),
            FrameCodec::Line(c) => c.encode(item, dst),
            FrameCodec::LengthPrefixed(c) => c.encode(item, dst),
        }
    }
}
