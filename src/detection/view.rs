//! Active detection set.
//!
//! `DetectionView` subscribes to the ingest client, decodes each frame and
//! replaces everything it previously placed. Drawing is delegated to a
//! `Renderer`; the view only tracks which elements are alive.

use crate::detection::transform::{CanvasSize, ModelResolution, Placement};
use crate::detection::types::{Detection, DetectionMessage, decode};
use crate::net::subscribers::{DispatchControl, StreamListener};

/// Creates and destroys the visual element for one detection.
pub trait Renderer {
    type Handle;

    fn spawn(&mut self, detection: &Detection, placement: &Placement) -> Self::Handle;

    fn retire(&mut self, handle: Self::Handle);
}

/// Renderer that only logs placements.
#[derive(Debug, Default)]
pub struct LogRenderer;

impl Renderer for LogRenderer {
    type Handle = String;

    fn spawn(&mut self, detection: &Detection, placement: &Placement) -> Self::Handle {
        log::debug!(
            "place {} at ({:.1}, {:.1}) size {:.1}x{:.1}",
            detection.class_name,
            placement.x,
            placement.anchor_y,
            placement.width,
            placement.height
        );
        detection.class_name.clone()
    }

    fn retire(&mut self, _handle: Self::Handle) {}
}

/// Counters for decoded and rejected messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewStats {
    pub applied: u64,
    pub rejected: u64,
    pub retired: u64,
}

/// Consumer that keeps exactly the latest decoded message on screen.
pub struct DetectionView<R: Renderer> {
    renderer: R,
    model: ModelResolution,
    canvas: CanvasSize,
    active: Vec<(Detection, Placement, R::Handle)>,
    stats: ViewStats,
}

impl<R: Renderer> DetectionView<R> {
    pub fn new(renderer: R, model: ModelResolution, canvas: CanvasSize) -> Self {
        Self {
            renderer,
            model,
            canvas,
            active: Vec::new(),
            stats: ViewStats::default(),
        }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn model(&self) -> ModelResolution {
        self.model
    }

    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    /// Change the canvas size. Applies from the next message on.
    pub fn set_canvas(&mut self, canvas: CanvasSize) {
        self.canvas = canvas;
    }

    pub fn stats(&self) -> &ViewStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Currently displayed detections with their placements.
    pub fn active(&self) -> impl Iterator<Item = (&Detection, &Placement)> {
        self.active.iter().map(|(d, p, _)| (d, p))
    }

    /// Decode `raw` and apply it. On a decode error the current set is kept.
    pub fn handle_message(&mut self, raw: &str) -> bool {
        match decode(raw) {
            Ok(message) => {
                self.apply(message);
                true
            }
            Err(e) => {
                log::error!("{}", e);
                self.stats.rejected += 1;
                false
            }
        }
    }

    /// Replace the active set with `message`.
    pub fn apply(&mut self, message: DetectionMessage) {
        self.clear();
        for detection in message.detections {
            let placement = Placement::map(detection.bbox, self.model, self.canvas);
            let handle = self.renderer.spawn(&detection, &placement);
            self.active.push((detection, placement, handle));
        }
        self.stats.applied += 1;
    }

    /// Retire every active element.
    pub fn clear(&mut self) {
        for (_, _, handle) in self.active.drain(..) {
            self.renderer.retire(handle);
            self.stats.retired += 1;
        }
    }
}

impl<R: Renderer> StreamListener for DetectionView<R> {
    fn on_message(&mut self, raw: &str, _control: &mut DispatchControl) {
        self.handle_message(raw);
    }

    fn on_disconnected(&mut self) {
        self.clear();
    }
}
