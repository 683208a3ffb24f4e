//! Detection wire types and decoding.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{DetlinkError, Result};

/// One recognized object: class label plus pixel-space box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    /// `[x1, y1, x2, y2]`, top-left and bottom-right corners in source pixels.
    pub bbox: [i32; 4],
}

impl Detection {
    pub fn new(class_name: impl Into<String>, bbox: [i32; 4]) -> Self {
        Self {
            class_name: class_name.into(),
            bbox,
        }
    }

    /// Horizontal extent. Negative when the peer sends `x2 < x1`.
    pub fn width(&self) -> i64 {
        i64::from(self.bbox[2]) - i64::from(self.bbox[0])
    }

    pub fn height(&self) -> i64 {
        i64::from(self.bbox[3]) - i64::from(self.bbox[1])
    }
}

/// A full batch of detections for one inference frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionMessage {
    pub detections: Vec<Detection>,
}

impl DetectionMessage {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Parse one message of text into a `DetectionMessage`.
///
/// All-or-nothing: any structural problem rejects the whole message.
pub fn decode(raw: &str) -> Result<DetectionMessage> {
    if raw.trim().is_empty() {
        return Err(DetlinkError::Decode("Received an empty message".into()));
    }
    serde_json::from_str(raw).map_err(|e| DetlinkError::Decode(format!("JSON parse error: {}", e)))
}

/// Load a JSON Lines replay script. Blank lines are skipped.
pub fn load_replay<P: AsRef<Path>>(path: P) -> Result<Vec<DetectionMessage>> {
    let content = fs::read_to_string(path.as_ref())?;
    parse_replay(&content)
}

/// Parse JSON Lines text into messages.
pub fn parse_replay(content: &str) -> Result<Vec<DetectionMessage>> {
    let mut messages = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let message = decode(line).map_err(|e| DetlinkError::Decode(format!("line {}: {}", index + 1, e)))?;
        messages.push(message);
    }
    Ok(messages)
}
