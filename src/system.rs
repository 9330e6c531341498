//! ipmitool-backed session transport.

pub mod executor;
pub mod parser;

pub use executor::{IpmitoolSession, IpmitoolTransport};
