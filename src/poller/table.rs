//! Per-target sensor tables: record metadata fixed at first sight, readings appended.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::warn;

use crate::hardware::types::{SensorKey, SensorReading, SensorRecord, TargetAddress};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorEntry {
    pub record: SensorRecord,
    /// Oldest first.
    pub readings: Vec<SensorReading>,
}

impl SensorEntry {
    pub fn latest(&self) -> Option<&SensorReading> {
        self.readings.last()
    }
}

/// Point-in-time copy of one target's table.
pub type TableSnapshot = BTreeMap<SensorKey, SensorEntry>;

/// All tables of a host. Written only by that host's worker.
pub type SensorTables = RwLock<HashMap<TargetAddress, TargetSensorTable>>;

/// Result of sampling one sensor during a walk.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorUpdate {
    New { record: SensorRecord, reading: SensorReading },
    Reading { key: SensorKey, reading: SensorReading },
}

#[derive(Debug, Clone)]
pub struct TargetSensorTable {
    target: TargetAddress,
    sensors: BTreeMap<SensorKey, SensorEntry>,
}

impl TargetSensorTable {
    pub fn new(target: TargetAddress) -> Self {
        Self { target, sensors: BTreeMap::new() }
    }

    pub fn target(&self) -> TargetAddress {
        self.target
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn contains(&self, key: &SensorKey) -> bool {
        self.sensors.contains_key(key)
    }

    pub fn get(&self, key: &SensorKey) -> Option<&SensorEntry> {
        self.sensors.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SensorKey, &SensorEntry)> {
        self.sensors.iter()
    }

    /// Apply one walk's worth of updates. A `New` for a key that already
    /// exists only contributes its reading; metadata is never replaced.
    pub fn merge(&mut self, updates: Vec<SensorUpdate>) -> usize {
        let mut applied = 0;
        for update in updates {
            match update {
                SensorUpdate::New { record, reading } => {
                    self.sensors
                        .entry(record.key)
                        .and_modify(|entry| entry.readings.push(reading.clone()))
                        .or_insert_with(|| SensorEntry { record, readings: vec![reading] });
                    applied += 1;
                }
                SensorUpdate::Reading { key, reading } => match self.sensors.get_mut(&key) {
                    Some(entry) => {
                        entry.readings.push(reading);
                        applied += 1;
                    }
                    None => warn!("target 0x{:02x}: reading for unknown sensor {}", self.target, key),
                },
            }
        }
        applied
    }

    pub fn snapshot(&self) -> TableSnapshot {
        self.sensors.clone()
    }
}
