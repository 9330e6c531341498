//! Error taxonomy for transports, discovery, hosts and the registry.

use thiserror::Error;

/// Failures of the session transport itself (open, close, send, keep-alive).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open session to {hostname}: {detail}")]
    Open { hostname: String, detail: String },

    #[error("session is not open")]
    Closed,

    #[error("command failed: {0}")]
    Command(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PollerError {
    #[error("connection error: {0}")]
    Connection(#[from] TransportError),

    #[error("{hostname}: PICMG capability check rejected ({detail})")]
    VersionRejected { hostname: String, detail: String },

    #[error("target 0x{target:02x}: SDR iteration failed: {detail}")]
    CatalogIteration { target: u8, detail: String },

    #[error("sensor {sensor}: read failed: {detail}")]
    SensorRead { sensor: String, detail: String },

    #[error("target 0x{target:02x}: cannot resolve IPMB address: {detail}")]
    AddressResolution { target: u8, detail: String },

    #[error("host {0} already exists")]
    DuplicateHost(String),

    #[error("unknown host {0}")]
    UnknownHost(String),

    #[error("failed to connect to {hostname}: {source}")]
    ConnectFailed {
        hostname: String,
        #[source]
        source: Box<PollerError>,
    },

    #[error("{hostname}: poller ended abnormally, session lost: {detail}")]
    SessionLost { hostname: String, detail: String },

    #[error("host {0} is already disconnected")]
    AlreadyDisconnected(String),

    #[error("host {0} is not connected")]
    NotConnected(String),
}

pub type Result<T, E = PollerError> = std::result::Result<T, E>;
