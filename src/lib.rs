//! Background IPMI sensor poller.
//!
//! A [`HostRegistry`] owns one [`Host`] per remote controller. Each host keeps
//! a session open, runs a worker that drains submitted [`Job`]s and refreshes
//! every known target on a fixed interval, and caches the readings in one
//! table per (optionally bridged) target. Callers read point-in-time
//! snapshots without waiting on the worker.

pub mod app;
pub mod config;
pub mod error;
pub mod hardware;
pub mod poller;
pub mod system;

pub use config::PollerConfig;
pub use error::{PollerError, TransportError};
pub use hardware::{SensorCatalog, Session, SessionTransport};
pub use poller::{Host, HostHandle, HostRegistry, Job, SensorEntry, TableSnapshot};
pub use system::IpmitoolTransport;
