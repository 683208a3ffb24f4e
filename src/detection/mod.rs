//! Detection decoding and canvas mapping.

pub mod transform;
pub mod types;
pub mod view;

pub use transform::{CanvasSize, ModelResolution, Placement};
pub use types::{Detection, DetectionMessage, decode, load_replay, parse_replay};
pub use view::{DetectionView, LogRenderer, Renderer, ViewStats};
