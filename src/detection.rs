//! Detection post-processing.
//!
//! Turns the raw SSD tensors (per-anchor box offsets and per-class logits)
//! into a ranked, de-duplicated list of [`Detection`]s.

mod anchor;
mod builder;
mod decode;
mod postprocess;
mod quad;
mod rect;
mod score;
mod suppress;
mod types;

pub use anchor::{AnchorBook, AnchorBox, AnchorSpec, SsdAnchorParams};
pub use builder::DetectionBuilder;
pub use decode::{BoxDecoder, DecodeScales};
pub use postprocess::PostProcessor;
pub use quad::Quad;
pub use rect::Rect;
pub use score::{ClassScore, LabelMap, ScoreSigmoid, sigmoid};
pub use suppress::{SuppressionScope, Suppressor};
pub use types::{Detection, RawOutput};
