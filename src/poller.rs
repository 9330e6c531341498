//! Host polling engine: per-host sessions and workers, bridged discovery and
//! the cached sensor tables.

pub mod discovery;
pub mod host;
pub mod registry;
pub mod table;
pub mod worker;

pub use discovery::{BridgeRoute, Discovery, RefreshSummary};
pub use host::{Host, HostHandle};
pub use registry::HostRegistry;
pub use table::{SensorEntry, SensorUpdate, TableSnapshot, TargetSensorTable};
pub use worker::{Job, WorkQueue};
