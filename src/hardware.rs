//! Hardware seams (session transport, sensor catalog) and the data they yield.

pub mod catalog;
pub mod picmg;
pub mod transport;
pub mod types;

pub use catalog::{SdrIterator, SensorCatalog};
pub use transport::{Addressing, IpmiRequest, IpmiResponse, Privilege, Session, SessionParams, SessionTransport};
pub use types::{
    EntityId, FruLocatorSdr, RawThresholds, SdrRecord, SensorKey, SensorReading, SensorRecord, SensorSdr,
    SensorValue, TargetAddress, ThresholdSet, SELF_TARGET,
};
