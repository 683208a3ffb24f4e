//! detlink - streaming ingestion of object-detection results
//!
//! Connects to an inference server over TCP, frames the byte stream into
//! messages, and hands each one to registered listeners. The detection
//! module decodes messages and maps their boxes onto a destination canvas.

pub mod config;
pub mod detection;
pub mod error;
pub mod net;

pub use error::{DetlinkError, Result};
