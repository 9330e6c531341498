//! One remote controller: session lifecycle, its polling worker and its cached tables.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::types::PollerConfig;
use crate::error::{PollerError, Result};
use crate::hardware::catalog::SensorCatalog;
use crate::hardware::picmg::{self, Capability};
use crate::hardware::transport::{Session, SessionTransport};
use crate::hardware::types::TargetAddress;
use crate::poller::discovery::{BridgeRoute, Discovery};
use crate::poller::table::{SensorTables, TableSnapshot};
use crate::poller::worker::{Job, WorkQueue, Worker};

/// State reachable from callers while the worker owns the session.
#[derive(Debug, Default)]
struct HostShared {
    queue: Arc<WorkQueue>,
    tables: Arc<SensorTables>,
    live: AtomicBool,
}

pub struct Host {
    hostname: String,
    config: Arc<PollerConfig>,
    transport: Arc<dyn SessionTransport>,
    catalog: Arc<dyn SensorCatalog>,
    shared: Arc<HostShared>,
    /// Held here only while no worker runs; the worker owns it otherwise.
    session: Option<Box<dyn Session>>,
    worker: Option<JoinHandle<Box<dyn Session>>>,
}

impl Host {
    pub fn new(
        hostname: impl Into<String>,
        config: Arc<PollerConfig>,
        transport: Arc<dyn SessionTransport>,
        catalog: Arc<dyn SensorCatalog>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            config,
            transport,
            catalog,
            shared: Arc::new(HostShared::default()),
            session: None,
            worker: None,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some() || self.worker.is_some()
    }

    pub fn is_polling(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Open the session, self-address it, check the PICMG version and start
    /// the worker. On any failure the host is left disconnected.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            warn!("{}: already connected", self.hostname);
            return Ok(());
        }

        info!("connecting to {}", self.hostname);
        let params = self.config.session.params();
        if params.uses_insecure_defaults() {
            warn!("{}: connecting with empty credentials and an all-zero Kg key", self.hostname);
        }

        let mut session = match self.transport.open(&self.hostname, &params).await {
            Ok(session) => session,
            Err(e) => {
                error!("failed to connect to {}: {}", self.hostname, e);
                return Err(PollerError::Connection(e));
            }
        };
        session.set_addressing(BridgeRoute::from_config(&self.config).local());
        self.session = Some(session);
        info!("connected to {}", self.hostname);

        if let Err(e) = self.check_version().await {
            error!("{}", e);
            if let Err(e) = self.disconnect().await {
                debug!("{}: {}", self.hostname, e);
            }
            return Err(e);
        }

        self.start_worker();
        Ok(())
    }

    async fn check_version(&mut self) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Err(PollerError::NotConnected(self.hostname.clone()));
        };

        let rejected = |detail: String| PollerError::VersionRejected { hostname: self.hostname.clone(), detail };
        match picmg::check_version(session.as_mut(), &self.config.poller.supported_picmg_versions).await {
            Ok(Capability::Accepted(version)) => {
                info!("{}: PICMG {}.{} accepted", self.hostname, version.major, version.minor);
                Ok(())
            }
            Ok(Capability::Unsupported(version)) => {
                Err(rejected(format!("unsupported PICMG {}.{}", version.major, version.minor)))
            }
            Ok(Capability::Malformed(detail)) => Err(rejected(detail)),
            Err(e) => Err(rejected(e.to_string())),
        }
    }

    fn start_worker(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        self.shared.queue.reset();
        let discovery = Discovery::new(
            Arc::clone(&self.catalog),
            BridgeRoute::from_config(&self.config),
            Arc::clone(&self.shared.tables),
        );
        let worker = Worker::new(
            self.hostname.clone(),
            session,
            discovery,
            Arc::clone(&self.shared.queue),
            Arc::clone(&self.shared.tables),
            self.config.targets_for(&self.hostname),
            self.config.poll_interval(),
        );

        self.worker = Some(tokio::spawn(worker.run()));
        self.shared.live.store(true, Ordering::SeqCst);
    }

    /// Join the worker and reclaim its session. A worker that panicked took
    /// the session down with it; that is reported as `SessionLost`.
    async fn stop_worker(&mut self) -> Result<bool> {
        let Some(handle) = self.worker.take() else {
            return Ok(false);
        };

        self.shared.queue.request_termination();
        match handle.await {
            Ok(session) => {
                self.session = Some(session);
                Ok(true)
            }
            Err(e) => Err(PollerError::SessionLost {
                hostname: self.hostname.clone(),
                detail: e.to_string(),
            }),
        }
    }

    /// Stop and join the worker, reclaiming the session. `false` if no
    /// worker was running or the session could not be reclaimed.
    pub async fn request_termination(&mut self) -> bool {
        match self.stop_worker().await {
            Ok(stopped) => stopped,
            Err(e) => {
                error!("{}", e);
                false
            }
        }
    }

    /// Stop the worker, then release and close the session. A second call
    /// reports `AlreadyDisconnected`.
    pub async fn disconnect(&mut self) -> Result<()> {
        if !self.is_connected() {
            error!("{}: ipmi session not connected", self.hostname);
            return Err(PollerError::AlreadyDisconnected(self.hostname.clone()));
        }

        let stopped = self.stop_worker().await;
        self.shared.live.store(false, Ordering::SeqCst);
        if let Err(e) = stopped {
            error!("{}", e);
            return Err(e);
        }

        if let Some(mut session) = self.session.take() {
            session.cleanup().await;
            if session.is_open() {
                match session.close().await {
                    Ok(()) => info!("disconnected from host {}", self.hostname),
                    Err(e) => warn!("{}: close failed: {}", self.hostname, e),
                }
            }
        }
        Ok(())
    }

    /// Ask the worker for an immediate keep-alive.
    pub fn keep_alive(&self) {
        if !self.is_connected() {
            error!("{}: ipmi session not connected", self.hostname);
            return;
        }
        self.request_work(Job::KeepAlive);
    }

    /// Queue a job for the worker. Never blocks on job execution.
    pub fn request_work(&self, job: Job) {
        self.shared.queue.push(job);
    }

    pub fn pending_jobs(&self) -> usize {
        self.shared.queue.pending()
    }

    pub async fn read_table(&self, target: TargetAddress) -> Option<TableSnapshot> {
        self.shared.tables.read().await.get(&target).map(|t| t.snapshot())
    }

    /// Targets that have a sensor table.
    pub async fn known_targets(&self) -> Vec<TargetAddress> {
        let mut targets: Vec<TargetAddress> = self.shared.tables.read().await.keys().copied().collect();
        targets.sort_unstable();
        targets
    }

    pub fn handle(&self) -> HostHandle {
        HostHandle {
            hostname: self.hostname.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

/// A host dropped without `disconnect` still gets its session closed: a
/// running worker closes it on exit, an idle session is closed on a
/// background task.
impl Drop for Host {
    fn drop(&mut self) {
        self.shared.live.store(false, Ordering::SeqCst);

        if self.worker.take().is_some() {
            debug!("{}: dropped while polling, worker will close the session", self.hostname);
            self.shared.queue.abandon();
            return;
        }

        let Some(mut session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let hostname = self.hostname.clone();
                runtime.spawn(async move {
                    session.cleanup().await;
                    if session.is_open() {
                        if let Err(e) = session.close().await {
                            warn!("{}: close failed: {}", hostname, e);
                        }
                    }
                });
            }
            Err(_) => warn!("{}: dropped outside a runtime, session not closed", self.hostname),
        }
    }
}

/// Cheap caller-side handle to a registered host.
#[derive(Debug, Clone)]
pub struct HostHandle {
    hostname: String,
    shared: Arc<HostShared>,
}

impl HostHandle {
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn is_live(&self) -> bool {
        self.shared.live.load(Ordering::SeqCst)
    }

    pub fn request_work(&self, job: Job) -> Result<()> {
        if !self.is_live() {
            return Err(PollerError::UnknownHost(self.hostname.clone()));
        }
        self.shared.queue.push(job);
        Ok(())
    }

    pub async fn read_table(&self, target: TargetAddress) -> Result<Option<TableSnapshot>> {
        if !self.is_live() {
            return Err(PollerError::UnknownHost(self.hostname.clone()));
        }
        Ok(self.shared.tables.read().await.get(&target).map(|t| t.snapshot()))
    }
}
