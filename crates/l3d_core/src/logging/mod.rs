//! Logging for Label3D.
//!
//! Application messages go through `tracing` with a `[Component]` prefix.
//! Each calibration run also gets its own file via [`RunLogger`].
//!
//! ```no_run
//! use l3d_core::logging::{LogConfig, RunLogger};
//!
//! let log = RunLogger::create("calibration_0", "logs", LogConfig::default(), None)?;
//! log.phase("Detecting");
//! log.camera("camA");
//! log.frame_progress(10, 40);
//! log.success("reprojection error 0.41");
//! # Ok::<(), std::io::Error>(())
//! ```

mod run_logger;
mod types;

pub use run_logger::{RunLogger, RunLoggerBuilder};
pub use types::{LineKind, LogCallback, LogConfig, LogLevel};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. `RUST_LOG` overrides `level`; only the
/// first call in a process has an effect.
pub fn init_tracing(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();
}

/// Warnings only, captured by the test harness.
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_for(LogLevel::Warn))
        .with_test_writer()
        .try_init();
}

/// Our crates at `level`, everything else at `warn`.
fn filter_for(level: LogLevel) -> EnvFilter {
    EnvFilter::new(format!("warn,l3d_core={0},l3d={0}", level))
}
