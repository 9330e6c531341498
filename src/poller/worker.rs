//! Per-host polling worker: drains submitted jobs, keeps the session alive and
//! periodically refreshes every known target.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::hardware::transport::Session;
use crate::hardware::types::TargetAddress;
use crate::poller::discovery::Discovery;
use crate::poller::table::SensorTables;

/// On-demand work for a host's worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Refresh the target, then log every cached sensor.
    ListSensors { target: TargetAddress },
    Refresh { target: TargetAddress },
    KeepAlive,
}

impl Job {
    fn target(&self) -> Option<TargetAddress> {
        match self {
            Job::ListSensors { target } | Job::Refresh { target } => Some(*target),
            Job::KeepAlive => None,
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    jobs: Vec<Job>,
    terminate: bool,
    /// Nobody will join the worker; it must release the session itself.
    close_on_exit: bool,
}

/// Job queue shared between callers (producers) and the worker (consumer).
/// Unbounded: producers are never refused.
#[derive(Debug, Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    wakeup: Notify,
}

impl WorkQueue {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, job: Job) {
        let mut state = self.lock();
        state.jobs.push(job);
        self.wakeup.notify_one();
    }

    pub fn request_termination(&self) {
        let mut state = self.lock();
        state.terminate = true;
        self.wakeup.notify_one();
    }

    /// Stop the worker and have it clean up and close the session on its way
    /// out. Used when the owning host goes away without being disconnected.
    pub(crate) fn abandon(&self) {
        let mut state = self.lock();
        state.terminate = true;
        state.close_on_exit = true;
        self.wakeup.notify_one();
    }

    /// Take every pending job, leaving an empty queue behind.
    fn take(&self) -> Vec<Job> {
        std::mem::take(&mut self.lock().jobs)
    }

    fn termination_requested(&self) -> bool {
        self.lock().terminate
    }

    fn close_on_exit(&self) -> bool {
        self.lock().close_on_exit
    }

    /// Clear stale termination flags before a new worker starts.
    pub(crate) fn reset(&self) {
        let mut state = self.lock();
        state.terminate = false;
        state.close_on_exit = false;
    }

    pub fn pending(&self) -> usize {
        self.lock().jobs.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Work,
    Terminate,
    Timeout,
}

pub(crate) struct Worker {
    hostname: String,
    session: Box<dyn Session>,
    discovery: Discovery,
    queue: Arc<WorkQueue>,
    tables: Arc<SensorTables>,
    known_targets: BTreeSet<TargetAddress>,
    poll_interval: Duration,
    next_poll: Instant,
}

impl Worker {
    pub(crate) fn new(
        hostname: String,
        session: Box<dyn Session>,
        discovery: Discovery,
        queue: Arc<WorkQueue>,
        tables: Arc<SensorTables>,
        known_targets: impl IntoIterator<Item = TargetAddress>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            hostname,
            session,
            discovery,
            queue,
            tables,
            known_targets: known_targets.into_iter().collect(),
            poll_interval,
            next_poll: Instant::now() + poll_interval,
        }
    }

    /// Run until termination is requested; hands the session back.
    pub(crate) async fn run(mut self) -> Box<dyn Session> {
        info!("{}: poller started, targets {:?}", self.hostname, self.known_targets);

        loop {
            let jobs = self.queue.take();
            for job in jobs {
                self.execute(job).await;
            }

            if self.queue.termination_requested() {
                break;
            }

            // Every wait is preceded by keep-alive and a poll of all known targets
            loop {
                self.periodic_poll().await;

                match self.wait(self.next_poll).await {
                    Wake::Timeout => continue,
                    Wake::Work | Wake::Terminate => break,
                }
            }
        }

        if self.queue.close_on_exit() {
            self.release_session().await;
        }
        info!("{}: poller stopped", self.hostname);
        self.session
    }

    async fn release_session(&mut self) {
        self.session.cleanup().await;
        if self.session.is_open() {
            match self.session.close().await {
                Ok(()) => info!("{}: session closed by exiting poller", self.hostname),
                Err(e) => warn!("{}: close failed: {}", self.hostname, e),
            }
        }
    }

    async fn wait(&self, deadline: Instant) -> Wake {
        let wake = tokio::select! {
            _ = self.queue.wakeup.notified() => {
                if self.queue.termination_requested() { Wake::Terminate } else { Wake::Work }
            }
            _ = tokio::time::sleep_until(deadline) => Wake::Timeout,
        };
        debug!("{}: woken ({:?})", self.hostname, wake);
        wake
    }

    async fn execute(&mut self, job: Job) {
        debug!("{}: handling {:?}", self.hostname, job);
        if let Some(target) = job.target() {
            self.known_targets.insert(target);
        }

        match job {
            Job::Refresh { target } => {
                self.refresh(target).await;
            }
            Job::ListSensors { target } => {
                self.refresh(target).await;
                self.dump(target).await;
            }
            Job::KeepAlive => self.keep_alive().await,
        }
    }

    async fn keep_alive(&mut self) {
        if let Err(e) = self.session.keep_alive().await {
            warn!("{}: keep-alive failed: {}", self.hostname, e);
        }
    }

    /// Keep-alive plus a refresh of every known target, then re-arm the deadline.
    async fn periodic_poll(&mut self) {
        self.keep_alive().await;
        let targets: Vec<TargetAddress> = self.known_targets.iter().copied().collect();
        for target in targets {
            self.refresh(target).await;
        }
        self.next_poll = Instant::now() + self.poll_interval;
    }

    async fn refresh(&mut self, target: TargetAddress) -> bool {
        match self.discovery.refresh(self.session.as_mut(), target).await {
            Ok(summary) => {
                debug!(
                    "{}: target 0x{:02x} refreshed, {} sensors ({} new, {} failed)",
                    self.hostname, target, summary.sensors, summary.new_sensors, summary.read_failures
                );
                true
            }
            Err(e) => {
                warn!("{}: refresh failed: {}", self.hostname, e);
                false
            }
        }
    }

    async fn dump(&self, target: TargetAddress) {
        let tables = self.tables.read().await;
        let Some(table) = tables.get(&target) else {
            error!("{}: no sensor table for target 0x{:02x}", self.hostname, target);
            return;
        };

        info!("{}: target 0x{:02x} has {} sensors", self.hostname, target, table.len());
        for (key, entry) in table.iter() {
            let site = entry
                .record
                .entity
                .site_number()
                .map(|s| format!(" site {}", s))
                .unwrap_or_default();
            match entry.latest() {
                Some(r) => info!(
                    "SENSOR {} {}: {} entity {}{} = {} {} @ {} status 0x{:02x}",
                    key,
                    entry.record.name,
                    self.hostname,
                    entry.record.entity,
                    site,
                    r.value,
                    entry.record.units,
                    r.timestamp.to_rfc3339(),
                    r.status
                ),
                None => info!("SENSOR {} {}: no readings", key, entry.record.name),
            }
        }
    }
}
