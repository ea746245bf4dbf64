//! nusb-based fastboot session implementation.

use std::io::{Read, Write};

use nusb::descriptors::TransferType;
use nusb::transfer::{Bulk, Direction, In, Out};
use nusb::{Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument};

use super::traits::{FastbootSession, TransportError};
use super::wire::{
    MAX_REPLY_LEN, Reply, download_command, flash_command, getvar_command,
};
use crate::chunk::ChunkedWriter;
use crate::script::PartitionSlot;

/// Fastboot interface descriptor triple (class, subclass, protocol).
pub const FASTBOOT_CLASS: u8 = 0xFF;
pub const FASTBOOT_SUBCLASS: u8 = 0x42;
pub const FASTBOOT_PROTOCOL: u8 = 0x03;

/// Chunk size for streaming a download payload onto the wire.
const WIRE_CHUNK: usize = 1024 * 1024;

/// Fallback when the device does not report `max-download-size`.
const DEFAULT_MAX_DOWNLOAD_SIZE: u64 = 0x0800_0000;

/// nusb-backed fastboot session.
pub struct UsbSession {
    interface: Interface,
    in_endpoint: u8,
    out_endpoint: u8,
    serial: Option<String>,
    max_download_size: Option<u64>,
}

impl UsbSession {
    /// Open the first device exposing a fastboot interface.
    #[instrument(level = "info")]
    pub fn open() -> Result<Self, TransportError> {
        Self::open_matching(|_| true)
    }

    /// Open the device with the given serial number.
    #[instrument(level = "info")]
    pub fn open_with_serial(serial: &str) -> Result<Self, TransportError> {
        Self::open_matching(|info| info.serial_number() == Some(serial))
    }

    fn open_matching(
        accept: impl Fn(&nusb::DeviceInfo) -> bool,
    ) -> Result<Self, TransportError> {
        let devices = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        for device_info in devices {
            if accept(&device_info) && fastboot_interface(&device_info).is_some() {
                return Self::open_device_info(device_info);
            }
        }
        Err(TransportError::DeviceNotFound)
    }

    fn open_device_info(device_info: nusb::DeviceInfo) -> Result<Self, TransportError> {
        let serial = device_info.serial_number().map(str::to_string);
        let interface_number =
            fastboot_interface(&device_info).ok_or(TransportError::DeviceNotFound)?;

        info!(
            vendor_id = %format!("{:04X}", device_info.vendor_id()),
            product_id = %format!("{:04X}", device_info.product_id()),
            serial = serial.as_deref().unwrap_or("-"),
            "Found fastboot device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        let interface = device.claim_interface(interface_number).wait().map_err(|e| {
            TransportError::ClaimInterfaceFailed {
                interface: interface_number,
                message: e.to_string(),
            }
        })?;

        // Fastboot speaks over one bulk endpoint per direction.
        let bulk_endpoint = |direction: Direction| {
            device
                .configurations()
                .flat_map(|config| config.interfaces())
                .filter(|group| group.interface_number() == interface_number)
                .flat_map(|group| group.alt_settings().collect::<Vec<_>>())
                .flat_map(|alt| alt.endpoints())
                .find(|ep| {
                    ep.transfer_type() == TransferType::Bulk && ep.direction() == direction
                })
                .map(|ep| ep.address())
        };
        let in_endpoint =
            bulk_endpoint(Direction::In).ok_or(TransportError::EndpointNotFound {
                direction: "in".into(),
            })?;
        let out_endpoint =
            bulk_endpoint(Direction::Out).ok_or(TransportError::EndpointNotFound {
                direction: "out".into(),
            })?;

        info!(
            in_ep = %format!("0x{:02X}", in_endpoint),
            out_ep = %format!("0x{:02X}", out_endpoint),
            "Fastboot session opened"
        );

        Ok(Self {
            interface,
            in_endpoint,
            out_endpoint,
            serial,
            max_download_size: None,
        })
    }

    /// Serial number of the connected device, if it reports one.
    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    /// The device's maximum single-download size, queried once and cached.
    pub fn max_download_size(&mut self) -> Result<u64, TransportError> {
        if let Some(max) = self.max_download_size {
            return Ok(max);
        }
        let max = match self.get_var("max-download-size")? {
            Some(value) => parse_size(&value).ok_or_else(|| {
                TransportError::MalformedReply(format!("bad max-download-size: {value:?}"))
            })?,
            None => DEFAULT_MAX_DOWNLOAD_SIZE,
        };
        debug!(max_download_size = max, "Queried download limit");
        self.max_download_size = Some(max);
        Ok(max)
    }

    fn send_command(&mut self, command: &str) -> Result<(), TransportError> {
        debug!(command = %command, "Sending command");
        let ep = self
            .interface
            .endpoint::<Bulk, Out>(self.out_endpoint)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        let mut writer = ep.writer(4096);
        writer
            .write_all(command.as_bytes())
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    fn read_reply(&mut self) -> Result<Reply, TransportError> {
        let ep = self
            .interface
            .endpoint::<Bulk, In>(self.in_endpoint)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
        let mut reader = ep.reader(4096);
        let mut buf = vec![0u8; MAX_REPLY_LEN];
        let n = reader
            .read(&mut buf)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
        if n == 0 {
            return Err(TransportError::ReadFailed("empty reply".into()));
        }
        buf.truncate(n);
        let reply = Reply::parse(&buf)?;
        debug!(reply = ?reply, "Received reply");
        Ok(reply)
    }

    /// Read replies until the terminal one, surfacing INFO lines as logs.
    fn finish_command(&mut self) -> Result<Reply, TransportError> {
        loop {
            match self.read_reply()? {
                Reply::Info(line) => info!(device = %line, "Device info"),
                Reply::Fail(reason) => return Err(TransportError::RemoteFailure(reason)),
                reply => return Ok(reply),
            }
        }
    }

    fn execute(&mut self, command: &str) -> Result<Reply, TransportError> {
        self.send_command(command)?;
        self.finish_command()
    }

    /// Resolve the wire partition name for a slot.
    fn resolve_target(
        &mut self,
        partition: &str,
        slot: PartitionSlot,
    ) -> Result<String, TransportError> {
        match slot {
            // The device targets its active slot by default.
            PartitionSlot::Current => Ok(partition.to_string()),
            PartitionSlot::Other => {
                let current = self.get_var("current-slot")?.unwrap_or_default();
                let other = PartitionSlot::complement(&current).ok_or_else(|| {
                    TransportError::MalformedReply(format!(
                        "current-slot {current:?} is not a/b"
                    ))
                })?;
                Ok(format!("{partition}_{other}"))
            }
        }
    }
}

impl FastbootSession for UsbSession {
    fn get_var(&mut self, name: &str) -> Result<Option<String>, TransportError> {
        match self.execute(&getvar_command(name)) {
            Ok(Reply::Okay(value)) => Ok(Some(value)),
            Ok(reply) => Err(TransportError::MalformedReply(format!(
                "unexpected getvar reply: {reply:?}"
            ))),
            // Devices answer FAIL for variables they do not know.
            Err(TransportError::RemoteFailure(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn run(&mut self, raw: &str) -> Result<(), TransportError> {
        match self.execute(raw)? {
            Reply::Okay(_) => Ok(()),
            reply => Err(TransportError::MalformedReply(format!(
                "unexpected reply to {raw:?}: {reply:?}"
            ))),
        }
    }

    #[instrument(level = "info", skip(self, source, progress))]
    fn flash(
        &mut self,
        partition: &str,
        slot: PartitionSlot,
        source: &mut dyn Read,
        size: u64,
        progress: &mut dyn FnMut(f32),
    ) -> Result<(), TransportError> {
        let max = self.max_download_size()?;
        if size > max {
            return Err(TransportError::TooLarge { size, max });
        }
        let size32 =
            u32::try_from(size).map_err(|_| TransportError::TooLarge { size, max })?;
        let target = self.resolve_target(partition, slot)?;

        if size > 0 {
            let announced = match self.execute(&download_command(size32))? {
                Reply::Data(n) => n,
                reply => {
                    return Err(TransportError::MalformedReply(format!(
                        "unexpected reply to download: {reply:?}"
                    )));
                }
            };

            {
                let ep = self
                    .interface
                    .endpoint::<Bulk, Out>(self.out_endpoint)
                    .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
                let mut wire = ep.writer(64 * 1024);
                let chunk_size = WIRE_CHUNK.min(max as usize);
                let mut sent: u64 = 0;
                let mut chunked = ChunkedWriter::new(chunk_size, size, |chunk| {
                    wire.write_all(chunk)?;
                    sent += chunk.len() as u64;
                    progress(sent as f32 / size as f32);
                    Ok(())
                });
                chunked.init(u64::from(announced))?;

                let mut buf = vec![0u8; chunk_size];
                loop {
                    let n = source
                        .read(&mut buf)
                        .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
                    if n == 0 {
                        break;
                    }
                    chunked.write(&buf[..n])?;
                }
                let delivered = chunked.finish()?;
                if delivered != size {
                    return Err(TransportError::WriteFailed(format!(
                        "image stream ended early: {delivered} of {size} bytes"
                    )));
                }
                wire.flush()
                    .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
            }

            // Terminal OKAY for the download transaction.
            match self.finish_command()? {
                Reply::Okay(_) => {}
                reply => {
                    return Err(TransportError::MalformedReply(format!(
                        "unexpected reply after download payload: {reply:?}"
                    )));
                }
            }
        }

        self.run(&flash_command(&target))?;
        if size == 0 {
            progress(1.0);
        }
        Ok(())
    }

    fn reboot(mut self, target: &str) -> Result<(), TransportError> {
        let command = if target.is_empty() {
            "reboot".to_string()
        } else {
            format!("reboot-{target}")
        };
        self.send_command(&command)?;
        match self.finish_command() {
            Ok(_) => Ok(()),
            Err(e @ TransportError::RemoteFailure(_)) => Err(e),
            // The device often drops off the bus before replying.
            Err(e) => {
                debug!(error = %e, "No reply to reboot");
                Ok(())
            }
        }
    }
}

fn fastboot_interface(info: &nusb::DeviceInfo) -> Option<u8> {
    info.interfaces()
        .find(|i| {
            i.class() == FASTBOOT_CLASS
                && i.subclass() == FASTBOOT_SUBCLASS
                && i.protocol() == FASTBOOT_PROTOCOL
        })
        .map(|i| i.interface_number())
}

fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}
