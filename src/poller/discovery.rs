//! Bridged sensor discovery: address a target, walk its SDR repository,
//! sample threshold sensors and merge the results into that target's table.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::types::{BridgingSettings, PollerConfig};
use crate::error::{PollerError, Result};
use crate::hardware::catalog::SensorCatalog;
use crate::hardware::picmg;
use crate::hardware::transport::{Addressing, Session};
use crate::hardware::types::{
    SdrRecord, SensorKey, SensorReading, SensorRecord, SensorSdr, TargetAddress, ThresholdSet, SELF_TARGET,
};
use crate::poller::table::{SensorTables, SensorUpdate, TargetSensorTable};

/// Fixed route from the host's controller to bridged targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeRoute {
    pub local_address: u8,
    pub transit_address: u8,
    pub transit_channel: u8,
    pub target_channel: u8,
}

impl BridgeRoute {
    pub fn from_config(config: &PollerConfig) -> Self {
        let BridgingSettings { transit_address, transit_channel, target_channel, .. } = config.bridging;
        Self {
            local_address: config.session.local_address,
            transit_address,
            transit_channel,
            target_channel,
        }
    }

    pub fn local(&self) -> Addressing {
        Addressing::local(self.local_address)
    }

    pub fn addressing_for(&self, target: TargetAddress) -> Addressing {
        if target == SELF_TARGET {
            return self.local();
        }
        Addressing::bridged(
            self.local_address,
            target,
            self.target_channel,
            self.transit_address,
            self.transit_channel,
        )
    }
}

/// Counters for one walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub records: usize,
    pub sensors: usize,
    pub new_sensors: usize,
    pub discrete: usize,
    pub fru_locators: usize,
    pub ignored: usize,
    pub read_failures: usize,
}

pub struct Discovery {
    catalog: Arc<dyn SensorCatalog>,
    route: BridgeRoute,
    tables: Arc<SensorTables>,
}

impl Discovery {
    pub fn new(catalog: Arc<dyn SensorCatalog>, route: BridgeRoute, tables: Arc<SensorTables>) -> Self {
        Self { catalog, route, tables }
    }

    /// Refresh one target. The session is back on self-addressing when this
    /// returns, whatever the outcome.
    pub async fn refresh(&self, session: &mut dyn Session, target: TargetAddress) -> Result<RefreshSummary> {
        let result = match self.bridge(session, target).await {
            Ok(()) => self.walk(session, target).await,
            Err(e) => Err(e),
        };
        session.set_addressing(self.route.local());
        result
    }

    async fn bridge(&self, session: &mut dyn Session, target: TargetAddress) -> Result<()> {
        let mut addressing = self.route.addressing_for(target);
        session.set_addressing(addressing);
        if target == SELF_TARGET {
            return Ok(());
        }

        let ipmb = picmg::ipmb_address(session)
            .await
            .map_err(|e| PollerError::AddressResolution { target, detail: e.to_string() })?;
        addressing.target_ipmb_address = ipmb;
        session.set_addressing(addressing);
        debug!(
            "bridged to 0x{:02x} (ipmb 0x{:02x}) via 0x{:02x} ch {}",
            target, ipmb, addressing.transit_address, addressing.transit_channel
        );
        Ok(())
    }

    async fn walk(&self, session: &mut dyn Session, target: TargetAddress) -> Result<RefreshSummary> {
        let mut known: HashSet<SensorKey> = {
            let mut tables = self.tables.write().await;
            let table = tables.entry(target).or_insert_with(|| {
                info!("new sensor table for target 0x{:02x}", target);
                TargetSensorTable::new(target)
            });
            table.iter().map(|(key, _)| *key).collect()
        };

        let mut iterator = self
            .catalog
            .start_iteration(session)
            .await
            .map_err(|e| PollerError::CatalogIteration { target, detail: e.to_string() })?;

        let mut summary = RefreshSummary::default();
        let mut updates = Vec::new();

        while let Some(record) = self.catalog.next_record(session, &mut iterator).await {
            summary.records += 1;
            let (sensor, full) = match record {
                SdrRecord::FullSensor(sensor) => (sensor, true),
                SdrRecord::CompactSensor(sensor) => (sensor, false),
                SdrRecord::FruLocator(fru) => {
                    debug!("fru locator {} entity {} (device {})", fru.id_string, fru.entity, fru.device_id);
                    summary.fru_locators += 1;
                    continue;
                }
                SdrRecord::Ignored { record_id, record_type } => {
                    debug!("record {:#06x}: type 0x{:02x} ignored", record_id, record_type);
                    summary.ignored += 1;
                    continue;
                }
            };

            if !sensor.is_threshold() {
                debug!("{}: not a threshold sensor", sensor.id_string);
                summary.discrete += 1;
                continue;
            }

            match self.sample(session, &sensor, full, &known).await {
                Ok(update) => {
                    summary.sensors += 1;
                    if let SensorUpdate::New { record, .. } = &update {
                        summary.new_sensors += 1;
                        known.insert(record.key);
                    }
                    updates.push(update);
                }
                Err(e) => {
                    warn!("target 0x{:02x}: {}", target, e);
                    summary.read_failures += 1;
                }
            }
        }

        self.catalog.end_iteration(session, iterator).await;

        if let Some(table) = self.tables.write().await.get_mut(&target) {
            table.merge(updates);
        }

        debug!("target 0x{:02x}: {:?}", target, summary);
        Ok(summary)
    }

    async fn sample(
        &self,
        session: &mut dyn Session,
        sensor: &SensorSdr,
        full: bool,
        known: &HashSet<SensorKey>,
    ) -> Result<SensorUpdate> {
        let value = self
            .catalog
            .read_sensor_value(session, sensor)
            .await
            .map_err(|e| PollerError::SensorRead { sensor: sensor.id_string.clone(), detail: e.to_string() })?;

        let key = sensor.key();
        let reading = SensorReading { value: value.value, timestamp: Utc::now(), status: value.status };

        if known.contains(&key) {
            return Ok(SensorUpdate::Reading { key, reading });
        }

        // Compact records carry no linearization for thresholds
        let thresholds = if full {
            match self.catalog.read_thresholds(session, sensor).await {
                Ok(raw) => ThresholdSet::decode(&raw, |b| self.catalog.convert_reading(sensor, b)),
                Err(e) => {
                    debug!("{}: thresholds unavailable: {}", sensor.id_string, e);
                    ThresholdSet::unavailable()
                }
            }
        } else {
            ThresholdSet::unavailable()
        };

        debug!("{}: new sensor {} entity {} [{}]", sensor.id_string, key, sensor.entity, value.units);
        Ok(SensorUpdate::New {
            record: SensorRecord {
                key,
                name: sensor.id_string.clone(),
                units: value.units,
                entity: sensor.entity,
                sensor_type: sensor.sensor_type,
                thresholds,
            },
            reading,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_target_uses_local_addressing() {
        let route = BridgeRoute::from_config(&PollerConfig::default());
        assert_eq!(route.addressing_for(SELF_TARGET), Addressing::local(0x20));

        let bridged = route.addressing_for(0x72);
        assert_eq!(bridged.target_address, 0x72);
        assert_eq!(bridged.target_channel, 7);
        assert_eq!(bridged.transit_address, 0x82);
        assert_eq!(bridged.transit_channel, 0);
    }
}
