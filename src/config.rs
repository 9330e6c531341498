//! Poller configuration: types and JSON persistence.

pub mod persistence;
pub mod types;

pub use persistence::{load_config, save_config};
pub use types::{BridgingSettings, HostEntry, PollerConfig, PollerSettings, SessionSettings};
