//! Application configuration.
//!
//! # Example
//!
//! ```no_run
//! use l3d_core::config::{ConfigManager, ConfigSection};
//!
//! let mut config = ConfigManager::new(".config/settings.toml");
//! config.load_or_create().unwrap();
//!
//! config.settings_mut().calibration.frame_step = 20;
//! config.update_section(ConfigSection::Calibration).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{atomic_write, ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    CalibrationSettings, ConfigSection, LoggingSettings, PathSettings, Settings, SyncSettings,
};
