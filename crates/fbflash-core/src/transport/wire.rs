//! Fastboot wire encoding.
//!
//! Host commands are short ASCII strings; the device answers with a 4-byte
//! status tag (`OKAY`, `FAIL`, `DATA`, `INFO`) followed by up to 256 bytes
//! of payload. `INFO` lines may precede the terminal reply of any command.

use super::traits::TransportError;

/// Maximum reply length the protocol allows (tag + payload).
pub const MAX_REPLY_LEN: usize = 4 + 256;

/// A parsed device reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Command succeeded; payload is the result (e.g. a variable value).
    Okay(String),
    /// Command failed; payload is the device's reason.
    Fail(String),
    /// Device is ready to receive this many payload bytes.
    Data(u32),
    /// Informational line; another reply follows.
    Info(String),
}

impl Reply {
    /// Parse a raw reply buffer.
    pub fn parse(bytes: &[u8]) -> Result<Self, TransportError> {
        if bytes.len() < 4 {
            return Err(TransportError::MalformedReply(format!(
                "reply too short: {} bytes",
                bytes.len()
            )));
        }
        let (tag, rest) = bytes.split_at(4);
        let body = String::from_utf8_lossy(rest).into_owned();
        match tag {
            b"OKAY" => Ok(Reply::Okay(body)),
            b"FAIL" => Ok(Reply::Fail(body)),
            b"INFO" => Ok(Reply::Info(body)),
            b"DATA" => {
                let hex = body.get(..8).ok_or_else(|| {
                    TransportError::MalformedReply(format!("short DATA size field: {body:?}"))
                })?;
                let size = u32::from_str_radix(hex, 16).map_err(|_| {
                    TransportError::MalformedReply(format!("bad DATA size field: {hex:?}"))
                })?;
                Ok(Reply::Data(size))
            }
            _ => Err(TransportError::MalformedReply(format!(
                "unknown status tag: {:?}",
                String::from_utf8_lossy(tag)
            ))),
        }
    }
}

/// `getvar:<name>`
pub fn getvar_command(name: &str) -> String {
    format!("getvar:{name}")
}

/// `download:<size as 8 hex digits>`
pub fn download_command(size: u32) -> String {
    format!("download:{size:08x}")
}

/// `flash:<target>`
pub fn flash_command(target: &str) -> String {
    format!("flash:{target}")
}

/// `erase:<partition>`
pub fn erase_command(partition: &str) -> String {
    format!("erase:{partition}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_okay() {
        assert_eq!(Reply::parse(b"OKAYraven").unwrap(), Reply::Okay("raven".into()));
        assert_eq!(Reply::parse(b"OKAY").unwrap(), Reply::Okay(String::new()));
    }

    #[test]
    fn test_parse_fail() {
        assert_eq!(
            Reply::parse(b"FAILunknown command").unwrap(),
            Reply::Fail("unknown command".into())
        );
    }

    #[test]
    fn test_parse_data() {
        assert_eq!(Reply::parse(b"DATA00100000").unwrap(), Reply::Data(0x0010_0000));
    }

    #[test]
    fn test_parse_info() {
        assert_eq!(
            Reply::parse(b"INFOerasing...").unwrap(),
            Reply::Info("erasing...".into())
        );
    }

    #[test]
    fn test_malformed_replies() {
        assert!(Reply::parse(b"OK").is_err());
        assert!(Reply::parse(b"WHAT?").is_err());
        assert!(Reply::parse(b"DATA123").is_err());
        assert!(Reply::parse(b"DATAzzzzzzzz").is_err());
    }

    #[test]
    fn test_command_formatting() {
        assert_eq!(getvar_command("product"), "getvar:product");
        assert_eq!(download_command(0x1000), "download:00001000");
        assert_eq!(flash_command("boot_b"), "flash:boot_b");
        assert_eq!(erase_command("userdata"), "erase:userdata");
    }
}
