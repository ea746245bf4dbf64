//! fbflash-core: fastboot factory-image flash driver.
//!
//! This crate flashes an Android "optimized factory" zip archive over the
//! fastboot protocol: it parses the archive's `script.txt` into a typed
//! command list, precomputes progress accounting, and interprets the plan
//! against a live fastboot session, streaming partition images straight out
//! of the archive onto the wire.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Archive**: factory archive access (zip blob, mock) and the streaming
//!   entry reader
//! - **Script**: the flash script language (commands, parser)
//! - **Plan**: validated command list plus aggregate flash size
//! - **Transport**: fastboot session abstraction (nusb, mock) and wire
//!   encoding
//! - **Events**: observer pattern for UI decoupling
//! - **Executor**: high-level orchestrator
//!
//! # Example
//!
//! ```no_run
//! use fbflash_core::archive::ZipBlobArchive;
//! use fbflash_core::events::TracingObserver;
//! use fbflash_core::executor::FlashExecutor;
//! use fbflash_core::plan::FlashPlan;
//! use fbflash_core::transport::UsbSession;
//!
//! let archive = ZipBlobArchive::open("raven-factory.zip").expect("open archive");
//! let plan = FlashPlan::from_archive(&archive).expect("parse script");
//!
//! let session = UsbSession::open().expect("no fastboot device");
//! let executor = FlashExecutor::new(&plan, &archive, &TracingObserver, false);
//! executor
//!     .run(session, &mut || UsbSession::open())
//!     .expect("flash failed");
//! ```

pub mod archive;
pub mod chunk;
pub mod error;
pub mod events;
pub mod executor;
pub mod plan;
pub mod requirements;
pub mod script;
pub mod transport;

// Re-exports for convenience
pub use archive::{
    ArchiveError, CompressionKind, EntryInfo, FactoryArchive, MockArchive, StreamingEntryReader,
    ZipBlobArchive,
};
pub use chunk::{ChunkError, ChunkedWriter};
pub use error::FlashError;
pub use events::{FlashEvent, FlashObserver, NullObserver, ProgressAction, TracingObserver};
pub use executor::{FlashConfig, FlashExecutor};
pub use plan::FlashPlan;
pub use script::{Command, PartitionSlot, ScriptError};
pub use transport::{
    FastbootSession, MockSession, Reconnect, SessionCall, TransportError, UsbSession,
};
