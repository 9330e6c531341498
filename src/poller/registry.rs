//! Registry of live hosts keyed by hostname.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::types::PollerConfig;
use crate::error::{PollerError, Result};
use crate::hardware::catalog::SensorCatalog;
use crate::hardware::transport::SessionTransport;
use crate::hardware::types::TargetAddress;
use crate::poller::host::{Host, HostHandle};
use crate::poller::table::TableSnapshot;
use crate::poller::worker::Job;

pub struct HostRegistry {
    config: Arc<PollerConfig>,
    transport: Arc<dyn SessionTransport>,
    catalog: Arc<dyn SensorCatalog>,
    hosts: RwLock<HashMap<String, Host>>,
    /// Serialises add/remove; reads only take `hosts` briefly.
    mutation: Mutex<()>,
}

impl HostRegistry {
    pub fn new(config: PollerConfig, transport: Arc<dyn SessionTransport>, catalog: Arc<dyn SensorCatalog>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            catalog,
            hosts: RwLock::new(HashMap::new()),
            mutation: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Create, connect and register a host. Nothing is registered if the
    /// connection or capability check fails.
    pub async fn add_host(&self, hostname: &str) -> Result<HostHandle> {
        let _guard = self.mutation.lock().await;

        if self.hosts.read().await.contains_key(hostname) {
            error!("host object for hostname {} already exists", hostname);
            return Err(PollerError::DuplicateHost(hostname.to_string()));
        }

        let mut host = Host::new(
            hostname,
            Arc::clone(&self.config),
            Arc::clone(&self.transport),
            Arc::clone(&self.catalog),
        );
        if let Err(e) = host.connect().await {
            return Err(PollerError::ConnectFailed {
                hostname: hostname.to_string(),
                source: Box::new(e),
            });
        }

        let handle = host.handle();
        self.hosts.write().await.insert(hostname.to_string(), host);
        info!("added host {}", hostname);
        self.log_hosts().await;
        Ok(handle)
    }

    /// Connect every host listed in the configuration; failures are logged
    /// and skipped. Returns the hosts that came up.
    pub async fn add_configured_hosts(&self) -> Vec<HostHandle> {
        let mut handles = Vec::new();
        for entry in &self.config.hosts {
            match self.add_host(&entry.hostname).await {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!("{}", e),
            }
        }
        handles
    }

    /// Tear down and forget a host. Returns `false` if it was not registered.
    pub async fn remove_host(&self, hostname: &str) -> bool {
        let _guard = self.mutation.lock().await;

        let Some(mut host) = self.hosts.write().await.remove(hostname) else {
            debug!("remove_host: {} not registered", hostname);
            return false;
        };

        debug!("removing {} from the registry", hostname);
        if let Err(e) = host.disconnect().await {
            warn!("{}", e);
        }
        self.log_hosts().await;
        true
    }

    /// Sorted snapshot of registered hostnames.
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.hosts.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn contains(&self, hostname: &str) -> bool {
        self.hosts.read().await.contains_key(hostname)
    }

    pub async fn handle(&self, hostname: &str) -> Result<HostHandle> {
        self.hosts
            .read()
            .await
            .get(hostname)
            .map(Host::handle)
            .ok_or_else(|| PollerError::UnknownHost(hostname.to_string()))
    }

    pub async fn request_work(&self, hostname: &str, job: Job) -> Result<()> {
        let hosts = self.hosts.read().await;
        let host = hosts
            .get(hostname)
            .ok_or_else(|| PollerError::UnknownHost(hostname.to_string()))?;
        host.request_work(job);
        Ok(())
    }

    pub async fn read_table(&self, hostname: &str, target: TargetAddress) -> Result<Option<TableSnapshot>> {
        let hosts = self.hosts.read().await;
        let host = hosts
            .get(hostname)
            .ok_or_else(|| PollerError::UnknownHost(hostname.to_string()))?;
        Ok(host.read_table(target).await)
    }

    pub async fn known_targets(&self, hostname: &str) -> Result<Vec<TargetAddress>> {
        let hosts = self.hosts.read().await;
        let host = hosts
            .get(hostname)
            .ok_or_else(|| PollerError::UnknownHost(hostname.to_string()))?;
        Ok(host.known_targets().await)
    }

    /// Stop every worker and close every session, leaving the registry empty.
    pub async fn shutdown(&self) {
        let _guard = self.mutation.lock().await;

        let hosts: Vec<(String, Host)> = self.hosts.write().await.drain().collect();
        for (hostname, mut host) in hosts {
            if let Err(e) = host.disconnect().await {
                warn!("{}: {}", hostname, e);
            }
        }
        info!("host registry shut down");
    }

    async fn log_hosts(&self) {
        for hostname in self.list().await {
            debug!("host {}", hostname);
        }
    }
}
