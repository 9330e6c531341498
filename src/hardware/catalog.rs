//! Sensor catalog seam: walking the SDR repository and reading live sensor data.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::hardware::transport::Session;
use crate::hardware::types::{RawThresholds, SdrRecord, SensorSdr, SensorValue};

/// Cursor over an SDR repository walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SdrIterator {
    pub reservation: u16,
    pub next_record_id: u16,
    pub total: u16,
}

impl SdrIterator {
    /// Record id the repository uses to mark the end of the list.
    pub const END_OF_LIST: u16 = 0xffff;

    pub fn is_exhausted(&self) -> bool {
        self.next_record_id == Self::END_OF_LIST
    }
}

/// Enumerates and reads sensors over an open session, honouring whatever
/// addressing the session currently has.
#[async_trait]
pub trait SensorCatalog: Send + Sync {
    async fn start_iteration(&self, session: &mut dyn Session) -> Result<SdrIterator, TransportError>;

    /// Next decoded record, or `None` once the repository is exhausted.
    async fn next_record(&self, session: &mut dyn Session, iterator: &mut SdrIterator) -> Option<SdrRecord>;

    async fn read_sensor_value(&self, session: &mut dyn Session, sensor: &SensorSdr) -> Result<SensorValue, TransportError>;

    async fn read_thresholds(&self, session: &mut dyn Session, sensor: &SensorSdr) -> Result<RawThresholds, TransportError>;

    /// Convert a raw reading byte to engineering units using the record's
    /// linearization. Treated as exact by callers.
    fn convert_reading(&self, sensor: &SensorSdr, raw: u8) -> f64;

    async fn end_iteration(&self, session: &mut dyn Session, iterator: SdrIterator);
}
