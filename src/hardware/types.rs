//! Hardware data types: SDR records, sensor identity, thresholds and readings.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Address of a sub-target reachable through bridging. `0` is the host itself.
pub type TargetAddress = u8;

/// The local controller; no bridging.
pub const SELF_TARGET: TargetAddress = 0;

/// Event/reading type code of a threshold-based sensor.
const EVENT_READING_TYPE_THRESHOLD: u8 = 0x01;

/// Instances at or above this value are device-relative (module site + 0x60).
const DEVICE_RELATIVE_INSTANCE_BASE: u8 = 0x60;

pub const LOWER_NON_CRIT_SPECIFIED: u8 = 0x01;
pub const LOWER_CRIT_SPECIFIED: u8 = 0x02;
pub const LOWER_NON_RECOV_SPECIFIED: u8 = 0x04;
pub const UPPER_NON_CRIT_SPECIFIED: u8 = 0x08;
pub const UPPER_CRIT_SPECIFIED: u8 = 0x10;
pub const UPPER_NON_RECOV_SPECIFIED: u8 = 0x20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    pub id: u8,
    pub instance: u8,
}

impl EntityId {
    /// Module site number for device-relative instances (AMCx, RTMx, CUx, PMx).
    pub fn site_number(&self) -> Option<u8> {
        self.instance.checked_sub(DEVICE_RELATIVE_INSTANCE_BASE)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}.{:x}", self.id, self.instance)
    }
}

/// Stable identity of a sensor within one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorKey {
    pub sensor_number: u8,
    pub lun: u8,
    pub entity_id: u8,
    pub entity_instance: u8,
}

impl SensorKey {
    pub fn uid(&self) -> u32 {
        (self.sensor_number as u32) << 24
            | ((self.lun & 0x03) as u32) << 16
            | (self.entity_id as u32) << 8
            | self.entity_instance as u32
    }
}

impl fmt::Display for SensorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.uid())
    }
}

/// Common part of full and compact sensor records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSdr {
    pub record_id: u16,
    pub sensor_number: u8,
    pub lun: u8,
    pub owner_id: u8,
    pub channel: u8,
    pub entity: EntityId,
    pub sensor_type: u8,
    pub event_reading_type: u8,
    pub id_string: String,
}

impl SensorSdr {
    pub fn is_threshold(&self) -> bool {
        self.event_reading_type == EVENT_READING_TYPE_THRESHOLD
    }

    pub fn key(&self) -> SensorKey {
        SensorKey {
            sensor_number: self.sensor_number,
            lun: self.lun,
            entity_id: self.entity.id,
            entity_instance: self.entity.instance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FruLocatorSdr {
    pub record_id: u16,
    pub device_id: u8,
    pub lun: u8,
    pub entity: EntityId,
    pub id_string: String,
}

/// One decoded record of a controller's sensor data repository.
#[derive(Debug, Clone, PartialEq)]
pub enum SdrRecord {
    FullSensor(SensorSdr),
    CompactSensor(SensorSdr),
    FruLocator(FruLocatorSdr),
    /// Any other record type; observed and skipped.
    Ignored { record_id: u16, record_type: u8 },
}

/// Live value of a sensor, already converted to engineering units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorValue {
    pub value: f64,
    pub units: String,
    pub status: u8,
}

/// Raw Get Sensor Thresholds payload: availability mask plus six raw bytes
/// ordered lnc, lcr, lnr, unc, ucr, unr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawThresholds {
    pub mask: u8,
    pub values: [u8; 6],
}

impl RawThresholds {
    pub fn from_response(data: &[u8]) -> Option<Self> {
        if data.len() < 7 {
            return None;
        }
        let mut values = [0u8; 6];
        values.copy_from_slice(&data[1..7]);
        Some(Self { mask: data[0], values })
    }
}

/// Six alarm bounds. Bounds whose bit is absent from `specified` stay at zero
/// and are not real limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub available: bool,
    pub specified: u8,
    pub lower_non_recoverable: f64,
    pub lower_critical: f64,
    pub lower_non_critical: f64,
    pub upper_non_critical: f64,
    pub upper_critical: f64,
    pub upper_non_recoverable: f64,
}

impl ThresholdSet {
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Decode the bounds present in `raw.mask`, converting each raw byte with
    /// the sensor's own linearization.
    pub fn decode(raw: &RawThresholds, mut convert: impl FnMut(u8) -> f64) -> Self {
        let mut set = Self {
            available: true,
            specified: raw.mask & 0x3f,
            ..Self::default()
        };
        let mut bound = |bit: u8, index: usize| {
            if raw.mask & bit != 0 {
                convert(raw.values[index])
            } else {
                0.0
            }
        };
        set.lower_non_critical = bound(LOWER_NON_CRIT_SPECIFIED, 0);
        set.lower_critical = bound(LOWER_CRIT_SPECIFIED, 1);
        set.lower_non_recoverable = bound(LOWER_NON_RECOV_SPECIFIED, 2);
        set.upper_non_critical = bound(UPPER_NON_CRIT_SPECIFIED, 3);
        set.upper_critical = bound(UPPER_CRIT_SPECIFIED, 4);
        set.upper_non_recoverable = bound(UPPER_NON_RECOV_SPECIFIED, 5);
        set
    }

    pub fn is_specified(&self, bit: u8) -> bool {
        self.available && self.specified & bit != 0
    }
}

/// Metadata captured once, when a sensor is first discovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRecord {
    pub key: SensorKey,
    pub name: String,
    pub units: String,
    pub entity: EntityId,
    pub sensor_type: u8,
    pub thresholds: ThresholdSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub status: u8,
}
