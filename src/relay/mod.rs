//! Chat relay: message model and the coordinator that drives the room.

mod coordinator;
mod message;

pub use coordinator::{FrameOutcome, RelayCoordinator};
pub use message::{ChatMessage, Identity, MessageKind};
