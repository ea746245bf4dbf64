//! Fastboot session abstraction.
//!
//! Defines the `FastbootSession` trait driven by the executor, allowing
//! different implementations (nusb, mock).

use std::io::Read;

use thiserror::Error;

use crate::chunk::ChunkError;
use crate::script::PartitionSlot;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("no fastboot device found")]
    DeviceNotFound,

    #[error("failed to open device: {0}")]
    OpenFailed(String),

    #[error("failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    /// The interface lacks a bulk endpoint for `direction`. Fastboot only
    /// ever uses bulk transfers, so the endpoint kind is not parameterized.
    #[error("no bulk {direction} endpoint on the fastboot interface")]
    EndpointNotFound { direction: String },

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("device replied FAIL: {0}")]
    RemoteFailure(String),

    #[error("malformed reply: {0}")]
    MalformedReply(String),

    #[error("image of {size} bytes exceeds max-download-size {max}")]
    TooLarge { size: u64, max: u64 },

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error("device disconnected")]
    Disconnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A live fastboot session with a device in bootloader mode.
///
/// This trait enables:
/// - Production implementation using nusb
/// - Mock implementation for unit testing
///
/// `reboot` consumes the session: the handle is invalid once the device
/// leaves the bootloader, and the executor re-binds to whatever its
/// reconnect callback yields.
pub trait FastbootSession {
    /// `getvar`; `None` when the device does not report the variable.
    fn get_var(&mut self, name: &str) -> Result<Option<String>, TransportError>;

    /// Pass a raw command through verbatim and wait for `OKAY`.
    fn run(&mut self, raw: &str) -> Result<(), TransportError>;

    /// Erase a partition.
    fn erase(&mut self, partition: &str) -> Result<(), TransportError> {
        self.run(&super::wire::erase_command(partition))
    }

    /// Download `size` bytes from `source` and flash them to `partition`.
    ///
    /// `progress` receives fractions in `[0.0, 1.0]` of this one transfer.
    fn flash(
        &mut self,
        partition: &str,
        slot: PartitionSlot,
        source: &mut dyn Read,
        size: u64,
        progress: &mut dyn FnMut(f32),
    ) -> Result<(), TransportError>;

    /// Reboot into `target` (e.g. `"bootloader"`), invalidating the session.
    fn reboot(self, target: &str) -> Result<(), TransportError>
    where
        Self: Sized;
}

/// Yields a fresh session after the device rebooted and re-enumerated.
///
/// Implemented for closures, so callers can poll, present UI, or hand back
/// a prepared handle.
pub trait Reconnect<S: FastbootSession> {
    fn reconnect(&mut self) -> Result<S, TransportError>;
}

impl<S: FastbootSession, F: FnMut() -> Result<S, TransportError>> Reconnect<S> for F {
    fn reconnect(&mut self) -> Result<S, TransportError> {
        self()
    }
}
