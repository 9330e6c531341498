//! Session transport seam: opening sessions and exchanging raw requests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::hardware::types::TargetAddress;

pub const NETFN_APP: u8 = 0x06;
pub const NETFN_PICMG: u8 = 0x2c;

/// Get Device ID, used as the keep-alive no-op.
pub const CMD_GET_DEVICE_ID: u8 = 0x01;

/// Slave address of a BMC on IPMB.
pub const BMC_SLAVE_ADDR: u8 = 0x20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    Callback,
    User,
    Operator,
    Administrator,
}

impl Privilege {
    pub fn as_ipmitool_arg(&self) -> &'static str {
        match self {
            Privilege::Callback => "CALLBACK",
            Privilege::User => "USER",
            Privilege::Operator => "OPERATOR",
            Privilege::Administrator => "ADMINISTRATOR",
        }
    }
}

/// Parameters applied to a session before it is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    pub username: String,
    pub password: String,
    pub privilege: Privilege,
    pub lookup_bit: u8,
    pub kg_key: [u8; 20],
}

impl SessionParams {
    /// Empty credentials with an all-zero Kg key.
    pub fn uses_insecure_defaults(&self) -> bool {
        self.password.is_empty() && self.kg_key.iter().all(|b| *b == 0)
    }
}

/// Where requests go. With `target_address == 0` there is no bridging and
/// the session talks to the local controller at `local_address`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Addressing {
    pub local_address: u8,
    pub target_address: u8,
    pub target_channel: u8,
    pub target_ipmb_address: u8,
    pub transit_address: u8,
    pub transit_channel: u8,
}

impl Addressing {
    /// Self-addressing: the local address is both source and target.
    pub fn local(local_address: u8) -> Self {
        Self {
            local_address,
            target_address: local_address,
            ..Self::default()
        }
    }

    /// Double-bridged route to `target` through the transit controller.
    pub fn bridged(
        local_address: u8,
        target: TargetAddress,
        target_channel: u8,
        transit_address: u8,
        transit_channel: u8,
    ) -> Self {
        Self {
            local_address,
            target_address: target,
            target_channel,
            target_ipmb_address: 0,
            transit_address,
            transit_channel,
        }
    }

    pub fn is_bridged(&self) -> bool {
        self.target_address != 0 && self.target_address != self.local_address
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpmiRequest {
    pub netfn: u8,
    pub cmd: u8,
    pub data: Vec<u8>,
}

impl IpmiRequest {
    pub fn new(netfn: u8, cmd: u8, data: impl Into<Vec<u8>>) -> Self {
        Self { netfn, cmd, data: data.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpmiResponse {
    pub completion_code: u8,
    pub data: Vec<u8>,
}

impl IpmiResponse {
    pub fn ok(data: impl Into<Vec<u8>>) -> Self {
        Self { completion_code: 0, data: data.into() }
    }

    pub fn is_ok(&self) -> bool {
        self.completion_code == 0
    }
}

/// An open conversation with one remote management controller.
#[async_trait]
pub trait Session: Send + Sync {
    fn is_open(&self) -> bool;

    fn addressing(&self) -> Addressing;

    /// Re-address subsequent requests (and catalog walks).
    fn set_addressing(&mut self, addressing: Addressing);

    async fn send(&mut self, request: &IpmiRequest) -> Result<IpmiResponse, TransportError>;

    async fn keep_alive(&mut self) -> Result<(), TransportError>;

    /// Release protocol-level session resources. The session still reports
    /// whether the underlying link is open afterwards.
    async fn cleanup(&mut self);

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens sessions to hosts.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn open(&self, hostname: &str, params: &SessionParams) -> Result<Box<dyn Session>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_addressing_is_not_bridged() {
        let local = Addressing::local(BMC_SLAVE_ADDR);
        assert_eq!(local.target_address, BMC_SLAVE_ADDR);
        assert!(!local.is_bridged());
        assert!(Addressing::bridged(BMC_SLAVE_ADDR, 0x72, 7, 0x82, 0).is_bridged());
    }

    #[test]
    fn insecure_defaults_detected() {
        let mut params = SessionParams {
            username: String::new(),
            password: String::new(),
            privilege: Privilege::Administrator,
            lookup_bit: 0x10,
            kg_key: [0; 20],
        };
        assert!(params.uses_insecure_defaults());
        params.password = "secret".into();
        assert!(!params.uses_insecure_defaults());
    }
}
