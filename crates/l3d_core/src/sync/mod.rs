//! Multi-camera synchronization.
//!
//! Cameras are aligned from their reconstructed start times (creation date
//! plus embedded timecode). The result is a `SyncPlan` giving each camera's
//! start and end trim in frames so every aligned track has the same length.
//!
//! Start times assume recording began on the calendar day of the file's
//! creation time. Batches whose start times spread more than 12 hours are
//! rejected instead of being silently misaligned by a day.

mod plan;
mod strategy;
mod types;

pub use plan::SyncPlan;
pub use strategy::{SyncStrategy, Synchronizer, TimecodeSync};
pub use types::{CameraStream, SyncEntry, SyncError, SyncMethod, SyncResult};
