//! PICMG queries: capability (version) check and IPMB address resolution.

use tracing::debug;

use crate::error::TransportError;
use crate::hardware::transport::{IpmiRequest, Session, NETFN_PICMG};

pub const PICMG_GET_PROPERTIES_CMD: u8 = 0x00;
pub const PICMG_GET_ADDRESS_INFO_CMD: u8 = 0x01;

/// Group extension identifier echoed in byte 0 of every PICMG response.
pub const PICMG_IDENTIFIER: u8 = 0x00;

pub const PICMG_ATCA_MAJOR_VERSION: u8 = 2;
pub const PICMG_AMC_MAJOR_VERSION: u8 = 4;
pub const PICMG_UTCA_MAJOR_VERSION: u8 = 5;

pub const SUPPORTED_MAJOR_VERSIONS: [u8; 3] = [
    PICMG_ATCA_MAJOR_VERSION,
    PICMG_AMC_MAJOR_VERSION,
    PICMG_UTCA_MAJOR_VERSION,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PicmgVersion {
    pub major: u8,
    pub minor: u8,
}

/// Outcome of the capability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Accepted(PicmgVersion),
    Unsupported(PicmgVersion),
    /// Error completion code, wrong identifier or short payload.
    Malformed(String),
}

/// Ask the controller for its PICMG properties and match the major version
/// against `supported`.
pub async fn check_version(session: &mut dyn Session, supported: &[u8]) -> Result<Capability, TransportError> {
    let request = IpmiRequest::new(NETFN_PICMG, PICMG_GET_PROPERTIES_CMD, vec![PICMG_IDENTIFIER]);
    let rsp = session.send(&request).await?;

    if !rsp.is_ok() {
        return Ok(Capability::Malformed(format!("completion code 0x{:02x}", rsp.completion_code)));
    }
    if rsp.data.len() < 2 {
        return Ok(Capability::Malformed(format!("{} byte response", rsp.data.len())));
    }
    if rsp.data[0] != PICMG_IDENTIFIER {
        return Ok(Capability::Malformed(format!("identifier 0x{:02x}", rsp.data[0])));
    }

    let version = PicmgVersion {
        major: rsp.data[1] & 0x0f,
        minor: (rsp.data[1] & 0xf0) >> 4,
    };
    debug!("PICMG {}.{} detected", version.major, version.minor);

    if supported.contains(&version.major) {
        Ok(Capability::Accepted(version))
    } else {
        Ok(Capability::Unsupported(version))
    }
}

/// Resolve the IPMB-0 address of whatever the session currently targets.
pub async fn ipmb_address(session: &mut dyn Session) -> Result<u8, TransportError> {
    let request = IpmiRequest::new(NETFN_PICMG, PICMG_GET_ADDRESS_INFO_CMD, vec![PICMG_IDENTIFIER]);
    let rsp = session.send(&request).await?;

    if !rsp.is_ok() {
        return Err(TransportError::Malformed(format!(
            "Get Address Info completion code 0x{:02x}",
            rsp.completion_code
        )));
    }
    match rsp.data.get(2) {
        Some(addr) if *addr != 0 => Ok(*addr),
        _ => Err(TransportError::Malformed(format!(
            "Get Address Info returned {} bytes without an IPMB address",
            rsp.data.len()
        ))),
    }
}
