//! In-memory controller used by the integration tests: a transport whose
//! sessions answer the PICMG queries, and a catalog serving canned records
//! per target.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use ipmi_poller::config::PollerConfig;
use ipmi_poller::error::TransportError;
use ipmi_poller::hardware::catalog::{SdrIterator, SensorCatalog};
use ipmi_poller::hardware::transport::{
    Addressing, IpmiRequest, IpmiResponse, Session, SessionParams, SessionTransport, CMD_GET_DEVICE_ID, NETFN_APP,
    NETFN_PICMG,
};
use ipmi_poller::hardware::types::{
    EntityId, FruLocatorSdr, RawThresholds, SdrRecord, SensorSdr, SensorValue, TargetAddress,
};
use ipmi_poller::hardware::picmg::{PICMG_GET_ADDRESS_INFO_CMD, PICMG_GET_PROPERTIES_CMD};

/// Controller behaviour shared by every session the transport opens.
#[derive(Debug, Default)]
pub struct SimController {
    pub refuse_open: bool,
    /// Raw byte 1 of Get PICMG Properties (minor << 4 | major).
    pub picmg_version: u8,
    /// Targets whose Get Address Info fails.
    pub unresolvable: HashSet<TargetAddress>,
    pub failing_keep_alive: bool,
    pub opened: AtomicUsize,
    pub keep_alives: AtomicUsize,
    pub cleanups: AtomicUsize,
    pub closes: AtomicUsize,
}

pub struct SimTransport {
    pub controller: Arc<SimController>,
}

impl SimTransport {
    pub fn new(picmg_version: u8) -> Self {
        Self::with(SimController { picmg_version, ..SimController::default() })
    }

    pub fn with(controller: SimController) -> Self {
        Self { controller: Arc::new(controller) }
    }

    pub fn refusing() -> Self {
        Self::with(SimController { refuse_open: true, picmg_version: 5, ..SimController::default() })
    }
}

#[async_trait]
impl SessionTransport for SimTransport {
    async fn open(&self, hostname: &str, _params: &SessionParams) -> Result<Box<dyn Session>, TransportError> {
        if self.controller.refuse_open {
            return Err(TransportError::Open {
                hostname: hostname.to_string(),
                detail: "connection refused".into(),
            });
        }
        self.controller.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimSession {
            controller: Arc::clone(&self.controller),
            addressing: Addressing::default(),
            open: true,
        }))
    }
}

pub struct SimSession {
    controller: Arc<SimController>,
    addressing: Addressing,
    open: bool,
}

impl SimSession {
    pub fn new(controller: Arc<SimController>) -> Self {
        Self { controller, addressing: Addressing::default(), open: true }
    }
}

#[async_trait]
impl Session for SimSession {
    fn is_open(&self) -> bool {
        self.open
    }

    fn addressing(&self) -> Addressing {
        self.addressing
    }

    fn set_addressing(&mut self, addressing: Addressing) {
        self.addressing = addressing;
    }

    async fn send(&mut self, request: &IpmiRequest) -> Result<IpmiResponse, TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        let rsp = match (request.netfn, request.cmd) {
            (NETFN_APP, CMD_GET_DEVICE_ID) => IpmiResponse::ok(vec![0x20, 0x81, 0x02, 0x20]),
            (NETFN_PICMG, PICMG_GET_PROPERTIES_CMD) => IpmiResponse::ok(vec![0x00, self.controller.picmg_version]),
            (NETFN_PICMG, PICMG_GET_ADDRESS_INFO_CMD) => {
                let target = self.addressing.target_address;
                if self.controller.unresolvable.contains(&target) {
                    IpmiResponse { completion_code: 0xc1, data: Vec::new() }
                } else {
                    IpmiResponse::ok(vec![0x00, 0x00, target, 0xff])
                }
            }
            _ => IpmiResponse { completion_code: 0xc1, data: Vec::new() },
        };
        Ok(rsp)
    }

    async fn keep_alive(&mut self) -> Result<(), TransportError> {
        self.send(&IpmiRequest::new(NETFN_APP, CMD_GET_DEVICE_ID, Vec::new())).await?;
        self.controller.keep_alives.fetch_add(1, Ordering::SeqCst);
        if self.controller.failing_keep_alive {
            return Err(TransportError::Command("Get Device ID timed out".into()));
        }
        Ok(())
    }

    async fn cleanup(&mut self) {
        self.controller.cleanups.fetch_add(1, Ordering::SeqCst);
        self.addressing = Addressing::default();
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        self.open = false;
        self.controller.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Closed until the first `release_walks`.
struct WalkGate(Semaphore);

impl Default for WalkGate {
    fn default() -> Self {
        Self(Semaphore::new(0))
    }
}

/// Canned sensor repository keyed by the target the session addresses.
#[derive(Default)]
pub struct SimCatalog {
    records: HashMap<TargetAddress, Vec<SdrRecord>>,
    thresholds: HashMap<String, RawThresholds>,
    failing_reads: HashSet<String>,
    panicking_reads: HashSet<String>,
    failing_walks: HashSet<TargetAddress>,
    /// Walks beyond this count wait for `release_walks`.
    walk_limit: Option<usize>,
    gate: WalkGate,
    /// Addressing seen at every `start_iteration`, in order.
    walks: Mutex<Vec<Addressing>>,
    reads: AtomicUsize,
    ends: AtomicUsize,
}

impl SimCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(mut self, target: TargetAddress, records: Vec<SdrRecord>) -> Self {
        self.records.insert(target, records);
        self
    }

    pub fn with_thresholds(mut self, sensor: &str, raw: RawThresholds) -> Self {
        self.thresholds.insert(sensor.to_string(), raw);
        self
    }

    pub fn failing_read(mut self, sensor: &str) -> Self {
        self.failing_reads.insert(sensor.to_string());
        self
    }

    pub fn failing_walk(mut self, target: TargetAddress) -> Self {
        self.failing_walks.insert(target);
        self
    }

    pub fn panicking_read(mut self, sensor: &str) -> Self {
        self.panicking_reads.insert(sensor.to_string());
        self
    }

    /// Let `walks` walks through, then hold every later one until released.
    pub fn holding_after(mut self, walks: usize) -> Self {
        self.walk_limit = Some(walks);
        self
    }

    pub fn release_walks(&self) {
        self.gate.0.add_permits(1);
    }

    pub fn walks(&self) -> Vec<Addressing> {
        self.walks.lock().unwrap().clone()
    }

    /// Targets in the order they were walked.
    pub fn walked_targets(&self) -> Vec<TargetAddress> {
        self.walks().iter().map(target_of).collect()
    }

    pub fn ended(&self) -> usize {
        self.ends.load(Ordering::SeqCst)
    }
}

fn target_of(addressing: &Addressing) -> TargetAddress {
    if addressing.is_bridged() {
        addressing.target_address
    } else {
        0
    }
}

#[async_trait]
impl SensorCatalog for SimCatalog {
    async fn start_iteration(&self, session: &mut dyn Session) -> Result<SdrIterator, TransportError> {
        let addressing = session.addressing();
        let started = {
            let mut walks = self.walks.lock().unwrap();
            walks.push(addressing);
            walks.len()
        };
        if self.walk_limit.is_some_and(|limit| started > limit) {
            // The permit goes back on drop, so one release opens the gate for good
            let _permit = self.gate.0.acquire().await;
        }

        let target = target_of(&addressing);
        if self.failing_walks.contains(&target) {
            return Err(TransportError::Command("Reserve SDR Repository failed".into()));
        }
        let total = self.records.get(&target).map_or(0, Vec::len) as u16;
        Ok(SdrIterator { reservation: 1, next_record_id: 0, total })
    }

    async fn next_record(&self, session: &mut dyn Session, iterator: &mut SdrIterator) -> Option<SdrRecord> {
        if iterator.is_exhausted() {
            return None;
        }
        let records = self.records.get(&target_of(&session.addressing()))?;
        match records.get(iterator.next_record_id as usize) {
            Some(record) => {
                iterator.next_record_id += 1;
                Some(record.clone())
            }
            None => {
                iterator.next_record_id = SdrIterator::END_OF_LIST;
                None
            }
        }
    }

    async fn read_sensor_value(&self, _session: &mut dyn Session, sensor: &SensorSdr) -> Result<SensorValue, TransportError> {
        if self.panicking_reads.contains(&sensor.id_string) {
            panic!("sensor driver crashed reading {}", sensor.id_string);
        }
        if self.failing_reads.contains(&sensor.id_string) {
            return Err(TransportError::Command(format!("Get Sensor Reading for {} failed", sensor.id_string)));
        }
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(SensorValue {
            value: 40.0 + n as f64,
            units: "degrees C".into(),
            status: 0xc0,
        })
    }

    async fn read_thresholds(&self, _session: &mut dyn Session, sensor: &SensorSdr) -> Result<RawThresholds, TransportError> {
        self.thresholds
            .get(&sensor.id_string)
            .copied()
            .ok_or_else(|| TransportError::Command("Get Sensor Thresholds not supported".into()))
    }

    fn convert_reading(&self, _sensor: &SensorSdr, raw: u8) -> f64 {
        raw as f64 * 0.5
    }

    async fn end_iteration(&self, _session: &mut dyn Session, _iterator: SdrIterator) {
        self.ends.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn sensor(number: u8, name: &str) -> SensorSdr {
    SensorSdr {
        record_id: number as u16,
        sensor_number: number,
        lun: 0,
        owner_id: 0x20,
        channel: 0,
        entity: EntityId { id: 0xc1, instance: 0x62 },
        sensor_type: 0x01,
        event_reading_type: 0x01,
        id_string: name.to_string(),
    }
}

pub fn full(number: u8, name: &str) -> SdrRecord {
    SdrRecord::FullSensor(sensor(number, name))
}

pub fn compact(number: u8, name: &str) -> SdrRecord {
    SdrRecord::CompactSensor(sensor(number, name))
}

pub fn discrete(number: u8, name: &str) -> SdrRecord {
    SdrRecord::CompactSensor(SensorSdr { sensor_type: 0xf0, event_reading_type: 0x6f, ..sensor(number, name) })
}

pub fn fru_locator(device_id: u8, name: &str) -> SdrRecord {
    SdrRecord::FruLocator(FruLocatorSdr {
        record_id: 0x100 + device_id as u16,
        device_id,
        lun: 0,
        entity: EntityId { id: 0xc1, instance: 0x61 },
        id_string: name.to_string(),
    })
}

/// Short interval keeps periodic polling observable under a paused clock.
pub fn config(poll_interval: f64) -> PollerConfig {
    let mut config = PollerConfig::default();
    config.poller.poll_interval = poll_interval;
    config
}

/// Yield to the worker (advancing paused time in small steps) until
/// `check` holds or `limit` has elapsed.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let step = Duration::from_millis(10);
    let mut waited = Duration::ZERO;
    while waited < limit {
        if check().await {
            return true;
        }
        tokio::time::sleep(step).await;
        waited += step;
    }
    check().await
}
