//! Crate-level error type.

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::script::ScriptError;
use crate::transport::TransportError;

/// Everything that can go wrong between opening an archive and the last
/// script command.
///
/// Each failure mode keeps its own variant so callers can match on it; the
/// executor additionally wraps failures with the index of the command that
/// hit them.
#[derive(Error, Debug)]
pub enum FlashError {
    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("missing archive entry: {file_ref}")]
    MissingEntry { file_ref: String },

    #[error("device does not satisfy requirements: {detail}")]
    RequirementsFailed { detail: String },

    #[error("variable {name} is {actual:?}, expected {expected:?}")]
    VarMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("current slot {value:?} is not one of a/b")]
    UnknownSlot { value: String },

    #[error("transport error: {source}")]
    Transport {
        #[from]
        source: TransportError,
    },

    #[error("command {index} ({keyword}) failed: {source}")]
    Command {
        index: usize,
        keyword: &'static str,
        #[source]
        source: Box<FlashError>,
    },
}
