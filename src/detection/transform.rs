//! Model-space to canvas-space mapping.
//!
//! Boxes arrive in the inference model's pixel space (top-left origin, y down)
//! and are placed on a canvas with a bottom-left origin (y up).

use serde::{Deserialize, Serialize};

/// Input resolution the inference model assumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelResolution {
    pub width: u32,
    pub height: u32,
}

impl ModelResolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for ModelResolution {
    fn default() -> Self {
        Self::new(1024, 1024)
    }
}

/// Size of the consumer's rendering surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: f32,
    pub height: f32,
}

impl CanvasSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// A box placed on the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Left edge on the canvas.
    pub x: f32,
    /// Top edge measured from the top of the canvas.
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Bottom edge measured from the bottom of the canvas.
    pub anchor_y: f32,
}

impl Placement {
    /// Map a source-space `[x1, y1, x2, y2]` box onto `canvas`.
    pub fn map(bbox: [i32; 4], model: ModelResolution, canvas: CanvasSize) -> Self {
        let [x1, y1, x2, y2] = bbox.map(|v| v as f32);
        let model_w = model.width as f32;
        let model_h = model.height as f32;

        let width = x2 - x1;
        let height = y2 - y1;

        let x = x1 / model_w * canvas.width;
        let y = y1 / model_h * canvas.height;
        let dest_w = width / model_w * canvas.width;
        let dest_h = height / model_h * canvas.height;

        Self {
            x,
            y,
            width: dest_w,
            height: dest_h,
            anchor_y: canvas.height - y - dest_h,
        }
    }

    /// Anchored position `(x, anchor_y)` for a bottom-left origin canvas.
    pub fn anchor(&self) -> (f32, f32) {
        (self.x, self.anchor_y)
    }

    /// Invert the mapping back to source pixel coordinates (unrounded).
    pub fn to_bbox(&self, model: ModelResolution, canvas: CanvasSize) -> [f32; 4] {
        let model_w = model.width as f32;
        let model_h = model.height as f32;

        // Recover y from the flipped anchor rather than the stored top edge
        let top = canvas.height - self.anchor_y - self.height;

        let x1 = self.x / canvas.width * model_w;
        let y1 = top / canvas.height * model_h;
        let x2 = x1 + self.width / canvas.width * model_w;
        let y2 = y1 + self.height / canvas.height * model_h;
        [x1, y1, x2, y2]
    }
}
