//! `ipmitool raw` output parser.
//! Turns hex dumps on stdout and `rsp=0xNN` failures on stderr into bytes and
//! completion codes.

use crate::error::TransportError;

/// Parse raw response bytes.
/// Input:  " 00 22 00 00\n 01 02" (ipmitool wraps long responses)
pub fn parse_raw_bytes(stdout: &str) -> Result<Vec<u8>, TransportError> {
    stdout
        .split_whitespace()
        .map(|tok| {
            let hex = tok.trim_start_matches("0x");
            u8::from_str_radix(hex, 16)
                .map_err(|_| TransportError::Malformed(format!("unexpected token '{}' in raw output", tok)))
        })
        .collect()
}

/// Extract the completion code from a failed raw command.
/// Input: "Unable to send RAW command (channel=0x0 netfn=0x2c lun=0x0 cmd=0x0 rsp=0xc1): Invalid command"
pub fn parse_completion_code(stderr: &str) -> Option<u8> {
    let start = stderr.find("rsp=0x")? + "rsp=0x".len();
    let hex: String = stderr[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect();
    u8::from_str_radix(&hex, 16).ok()
}

/// Format bytes the way ipmitool expects them on the command line.
pub fn format_hex(byte: u8) -> String {
    format!("0x{:02x}", byte)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wrapped_hex_dump() {
        let bytes = parse_raw_bytes(" 00 22 00 00 00 00 00 00 00 00 00 00 00 00 00 00\n 41 0a\n").unwrap();
        assert_eq!(bytes.len(), 18);
        assert_eq!(bytes[1], 0x22);
        assert_eq!(bytes[17], 0x0a);
    }

    #[test]
    fn empty_output_is_empty_payload() {
        assert!(parse_raw_bytes("\n").unwrap().is_empty());
    }

    #[test]
    fn rejects_non_hex_tokens() {
        assert!(parse_raw_bytes("00 zz").is_err());
    }

    #[test]
    fn completion_code_from_stderr() {
        let stderr = "Unable to send RAW command (channel=0x7 netfn=0x2c lun=0x0 cmd=0x1 rsp=0xc1): Invalid command\n";
        assert_eq!(parse_completion_code(stderr), Some(0xc1));
        assert_eq!(parse_completion_code("Error: Unable to establish LAN session"), None);
    }
}
