//! ipmitool subprocess transport.
//! Each request spawns `ipmitool ... raw`; the "session" is the set of
//! connection and bridging arguments carried between calls.
//!
//! ipmitool has no command-line option for the RAKP lookup bit, so
//! `SessionParams::lookup_bit` is not forwarded; ipmitool negotiates it
//! itself. A non-default value is logged when the session opens.

use async_trait::async_trait;
use tracing::{debug, info, trace, warn};

use crate::error::TransportError;
use crate::hardware::transport::{
    Addressing, IpmiRequest, IpmiResponse, Session, SessionParams, SessionTransport, BMC_SLAVE_ADDR,
    CMD_GET_DEVICE_ID, NETFN_APP,
};
use crate::system::parser::{format_hex, parse_completion_code, parse_raw_bytes};

const DEFAULT_BINARY: &str = "ipmitool";
const DEFAULT_PORT: u16 = 623;
const DEFAULT_LOOKUP_BIT: u8 = 0x10;

/// Opens LAN sessions by shelling out to ipmitool.
#[derive(Debug, Clone)]
pub struct IpmitoolTransport {
    binary: String,
    interface: String,
    port: u16,
}

impl Default for IpmitoolTransport {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            interface: "lan".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl IpmitoolTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// `lan` (IPMI 1.5) or `lanplus` (IPMI 2.0 / RMCP+).
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = interface.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }
}

#[async_trait]
impl SessionTransport for IpmitoolTransport {
    async fn open(&self, hostname: &str, params: &SessionParams) -> Result<Box<dyn Session>, TransportError> {
        let mut session = IpmitoolSession {
            binary: self.binary.clone(),
            interface: self.interface.clone(),
            port: self.port,
            hostname: hostname.to_string(),
            params: params.clone(),
            addressing: Addressing::local(BMC_SLAVE_ADDR),
            open: true,
        };

        // ipmitool has no persistent session; prove the controller answers.
        if let Err(e) = session.keep_alive().await {
            session.open = false;
            return Err(TransportError::Open {
                hostname: hostname.to_string(),
                detail: e.to_string(),
            });
        }

        if params.lookup_bit != DEFAULT_LOOKUP_BIT {
            warn!(
                "{}: lookup bit 0x{:02x} requested, ipmitool picks its own",
                hostname, params.lookup_bit
            );
        }
        info!("ipmitool session to {} via {}:{}", hostname, self.interface, self.port);
        Ok(Box::new(session))
    }
}

pub struct IpmitoolSession {
    binary: String,
    interface: String,
    port: u16,
    hostname: String,
    params: SessionParams,
    addressing: Addressing,
    open: bool,
}

impl IpmitoolSession {
    /// Connection, credential and bridging arguments shared by every call.
    pub(crate) fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "-I".to_string(),
            self.interface.clone(),
            "-H".to_string(),
            self.hostname.clone(),
            "-p".to_string(),
            self.port.to_string(),
            "-U".to_string(),
            self.params.username.clone(),
            "-L".to_string(),
            self.params.privilege.as_ipmitool_arg().to_string(),
        ];

        if self.params.password.is_empty() {
            args.extend(["-P".to_string(), String::new()]);
        } else {
            // Password travels via IPMI_PASSWORD, not argv
            args.push("-E".to_string());
        }

        if self.params.kg_key.iter().any(|b| *b != 0) {
            let hex: String = self.params.kg_key.iter().map(|b| format!("{:02x}", b)).collect();
            args.extend(["-y".to_string(), hex]);
        }

        let addr = &self.addressing;
        if addr.local_address != BMC_SLAVE_ADDR {
            args.extend(["-m".to_string(), format_hex(addr.local_address)]);
        }
        if addr.is_bridged() {
            // Address resolved over IPMB wins over the configured target
            let target = match addr.target_ipmb_address {
                0 => addr.target_address,
                ipmb => ipmb,
            };
            args.extend([
                "-t".to_string(),
                format_hex(target),
                "-b".to_string(),
                addr.target_channel.to_string(),
            ]);
            if addr.transit_address != 0 {
                args.extend([
                    "-T".to_string(),
                    format_hex(addr.transit_address),
                    "-B".to_string(),
                    addr.transit_channel.to_string(),
                ]);
            }
        }

        args
    }

    pub(crate) fn raw_args(&self, request: &IpmiRequest) -> Vec<String> {
        let mut args = self.base_args();
        args.push("raw".to_string());
        args.push(format_hex(request.netfn));
        args.push(format_hex(request.cmd));
        args.extend(request.data.iter().map(|b| format_hex(*b)));
        args
    }

    async fn run_raw(&self, request: &IpmiRequest) -> Result<IpmiResponse, TransportError> {
        let mut cmd = std::process::Command::new(&self.binary);
        cmd.args(self.raw_args(request));
        if !self.params.password.is_empty() {
            cmd.env("IPMI_PASSWORD", &self.params.password);
        }

        trace!(
            "Executing: {} raw netfn=0x{:02x} cmd=0x{:02x} ({} data bytes) on {}",
            self.binary,
            request.netfn,
            request.cmd,
            request.data.len(),
            self.hostname
        );

        let output = tokio::process::Command::from(cmd).output().await?;
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            // A completion code is a protocol answer, not a transport failure
            return match parse_completion_code(&stderr) {
                Some(code) => Ok(IpmiResponse { completion_code: code, data: Vec::new() }),
                None => Err(TransportError::Command(format!("ipmitool raw failed: {}", stderr.trim()))),
            };
        }

        let data = parse_raw_bytes(&String::from_utf8_lossy(&output.stdout))?;
        Ok(IpmiResponse::ok(data))
    }
}

#[async_trait]
impl Session for IpmitoolSession {
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
        self.run_raw(request).await
    }

    async fn keep_alive(&mut self) -> Result<(), TransportError> {
        let rsp = self.send(&IpmiRequest::new(NETFN_APP, CMD_GET_DEVICE_ID, Vec::new())).await?;
        if rsp.is_ok() {
            Ok(())
        } else {
            Err(TransportError::Command(format!(
                "Get Device ID completion code 0x{:02x}",
                rsp.completion_code
            )))
        }
    }

    async fn cleanup(&mut self) {
        debug!("releasing ipmitool session state for {}", self.hostname);
        self.addressing = Addressing::local(self.addressing.local_address);
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        self.open = false;
        Ok(())
    }
}
