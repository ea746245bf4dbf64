//! Flash plan: the parsed command list plus aggregate size.

use std::io::Read;

use tracing::{info, instrument};

use crate::archive::{FactoryArchive, StreamingEntryReader};
use crate::error::FlashError;
use crate::script::{
    Command, ScriptError, entry_name_prefix, find_script_entry, parse_script,
};

/// An immutable, validated flash plan.
///
/// `total_flash_bytes` is the sum of the uncompressed sizes of every
/// `flash` target and is the denominator for overall progress. Every flash
/// target is resolved against the archive at construction time, so size
/// accounting cannot come up short later.
#[derive(Debug, Clone)]
pub struct FlashPlan {
    commands: Vec<Command>,
    total_flash_bytes: u64,
}

impl FlashPlan {
    /// Validate a command list against the archive's entry table.
    pub fn new<A: FactoryArchive + ?Sized>(
        commands: Vec<Command>,
        archive: &A,
    ) -> Result<Self, FlashError> {
        let mut total_flash_bytes = 0u64;
        for command in &commands {
            if let Command::Flash { file_ref, .. } = command {
                let entry = archive
                    .entry(file_ref)
                    .ok_or_else(|| FlashError::MissingEntry {
                        file_ref: file_ref.clone(),
                    })?;
                total_flash_bytes += entry.uncompressed_size;
            }
        }
        Ok(Self {
            commands,
            total_flash_bytes,
        })
    }

    /// Locate, read, and parse `script.txt`, then validate the result.
    #[instrument(level = "info", skip(archive))]
    pub fn from_archive<A: FactoryArchive + ?Sized>(archive: &A) -> Result<Self, FlashError> {
        let script = find_script_entry(archive)?;
        let prefix = entry_name_prefix(&script.name).to_string();

        let mut text = String::new();
        StreamingEntryReader::new(archive, script)?
            .read_to_string(&mut text)
            .map_err(|_| ScriptError::InvalidEncoding)?;

        let commands = parse_script(&prefix, &text)?;
        let plan = Self::new(commands, archive)?;
        info!(
            commands = plan.commands.len(),
            total_flash_bytes = plan.total_flash_bytes,
            "Built flash plan"
        );
        Ok(plan)
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn total_flash_bytes(&self) -> u64 {
        self.total_flash_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
