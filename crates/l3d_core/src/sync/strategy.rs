//! Pluggable synchronization strategies.

use std::collections::HashMap;

use super::plan::SyncPlan;
use super::types::{CameraStream, SyncError, SyncMethod, SyncResult};

/// Computes a `SyncPlan` for a batch of cameras.
pub trait SyncStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn synchronize(&self, cameras: &[CameraStream]) -> SyncResult<SyncPlan>;
}

/// Alignment by embedded timecode and creation date.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimecodeSync;

impl SyncStrategy for TimecodeSync {
    fn name(&self) -> &'static str {
        "timecode"
    }

    fn synchronize(&self, cameras: &[CameraStream]) -> SyncResult<SyncPlan> {
        SyncPlan::from_timecodes(cameras)
    }
}

/// Dispatches a `SyncMethod` to its registered strategy.
///
/// Only `Timecode` is registered by default. Audio based methods must be
/// registered by the caller.
pub struct Synchronizer {
    strategies: HashMap<SyncMethod, Box<dyn SyncStrategy>>,
}

impl Synchronizer {
    pub fn new() -> Self {
        let mut sync = Self {
            strategies: HashMap::new(),
        };
        sync.register(SyncMethod::Timecode, Box::new(TimecodeSync));
        sync
    }

    pub fn register(&mut self, method: SyncMethod, strategy: Box<dyn SyncStrategy>) {
        self.strategies.insert(method, strategy);
    }

    pub fn is_available(&self, method: SyncMethod) -> bool {
        method == SyncMethod::None || self.strategies.contains_key(&method)
    }

    /// Run the strategy for `method`. `SyncMethod::None` yields no plan.
    pub fn run(&self, method: SyncMethod, cameras: &[CameraStream]) -> SyncResult<Option<SyncPlan>> {
        if method == SyncMethod::None {
            tracing::info!("[Sync] Method is None, videos left unaligned");
            return Ok(None);
        }

        let strategy = self
            .strategies
            .get(&method)
            .ok_or(SyncError::MethodUnavailable(method))?;

        tracing::info!(
            "[Sync] Synchronizing {} cameras using {} strategy",
            cameras.len(),
            strategy.name()
        );
        strategy.synchronize(cameras).map(Some)
    }
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new()
    }
}
