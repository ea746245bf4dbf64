//! Fastboot transport layer.

pub mod mock;
pub mod traits;
pub mod usb;
pub mod wire;

pub use mock::{MockSession, SessionCall};
pub use traits::{FastbootSession, Reconnect, TransportError};
pub use usb::UsbSession;
pub use wire::Reply;
