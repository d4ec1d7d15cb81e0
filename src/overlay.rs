//! On-screen markers.
//!
//! A fixed pool of slots, each owning at most one host entity, receives the
//! ranked detections of every cycle.

mod host;
mod matching;
mod placement;
mod slot;
mod slot_manager;

pub use host::{CameraPose, MarkerEntity, MarkerFactory};
pub use placement::Placement;
pub use slot::{Slot, SlotState};
pub use slot_manager::{SlotAssignment, SlotManager, SlotManagerConfig, SlotReport};
