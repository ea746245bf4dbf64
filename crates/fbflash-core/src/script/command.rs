//! Typed flash-script commands.

use std::fmt;

/// Which slot of an A/B partition a flash targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartitionSlot {
    /// The slot the device currently boots from.
    #[default]
    Current,
    /// The complement of the current slot.
    Other,
}

impl PartitionSlot {
    /// Wire complement of a slot string, `a` <-> `b`.
    pub fn complement(current: &str) -> Option<&'static str> {
        match current {
            "a" => Some("b"),
            "b" => Some("a"),
            _ => None,
        }
    }
}

impl fmt::Display for PartitionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionSlot::Current => write!(f, "current"),
            PartitionSlot::Other => write!(f, "other"),
        }
    }
}

/// One line of a flash script, parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Check the device against a requirements manifest in the archive.
    CheckRequirements { file_ref: String },
    /// Assert a fastboot variable has an exact value.
    CheckVar { name: String, expected: String },
    /// Erase a partition, subject to the wipe policy.
    Erase { partition: String },
    /// Flash an archive entry to a partition.
    Flash {
        partition: String,
        file_ref: String,
        slot: PartitionSlot,
    },
    /// Cancel a pending snapshot update if one is in flight.
    MaybeCancelSnapshotUpdate,
    /// Reboot back into the bootloader and re-bind the session.
    RebootBootloader,
    /// Pass a raw fastboot command through verbatim.
    RunCmd { raw: String },
    /// Make the inactive slot active.
    ToggleActiveSlot,
}

impl Command {
    /// The script keyword this command was parsed from.
    pub fn keyword(&self) -> &'static str {
        match self {
            Command::CheckRequirements { .. } => "check-requirements",
            Command::CheckVar { .. } => "check-var",
            Command::Erase { .. } => "erase",
            Command::Flash { .. } => "flash",
            Command::MaybeCancelSnapshotUpdate => "maybe-cancel-snapshot-update",
            Command::RebootBootloader => "reboot-bootloader",
            Command::RunCmd { .. } => "run-cmd",
            Command::ToggleActiveSlot => "toggle-active-slot",
        }
    }
}
