//! Flash-script parsing.
//!
//! The script is line-oriented UTF-8: empty lines and `#` comments are
//! skipped, everything else is tokenized on single ASCII spaces and matched
//! against a closed keyword set with exact arity. `run-cmd` is the one
//! exception, keeping its raw tail verbatim.

use thiserror::Error;
use tracing::debug;

use super::command::{Command, PartitionSlot};
use crate::archive::{EntryInfo, FactoryArchive};

/// File name of the flash script inside the archive.
pub const SCRIPT_NAME: &str = "script.txt";

const OTHER_SLOT_TOKEN: &str = "other-slot";

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("archive contains no {SCRIPT_NAME} entry")]
    ScriptMissing,

    #[error("{SCRIPT_NAME} is not valid UTF-8")]
    InvalidEncoding,

    #[error("malformed script line {line}: {text:?}")]
    MalformedLine { line: usize, text: String },

    #[error("unknown script command {keyword:?} at line {line}")]
    UnknownCommand { line: usize, keyword: String },
}

/// Locate the script entry in the archive.
///
/// The entry's directory prefix becomes the prefix of every file reference
/// in the script.
pub fn find_script_entry<A: FactoryArchive + ?Sized>(
    archive: &A,
) -> Result<&EntryInfo, ScriptError> {
    archive
        .entries()
        .iter()
        .find(|e| e.name == SCRIPT_NAME || e.name.ends_with("/script.txt"))
        .ok_or(ScriptError::ScriptMissing)
}

/// Directory prefix of a script entry path, trailing slash included.
pub fn entry_name_prefix(script_name: &str) -> &str {
    &script_name[..script_name.len() - SCRIPT_NAME.len()]
}

/// Parse the script text into commands, resolving file references against
/// `prefix`.
pub fn parse_script(prefix: &str, text: &str) -> Result<Vec<Command>, ScriptError> {
    let mut commands = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let number = idx + 1;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // run-cmd keeps its tail verbatim, spaces and all.
        if line == "run-cmd" {
            commands.push(Command::RunCmd { raw: String::new() });
            continue;
        }
        if let Some(raw) = line.strip_prefix("run-cmd ") {
            commands.push(Command::RunCmd {
                raw: raw.to_string(),
            });
            continue;
        }

        let tokens: Vec<&str> = line.split(' ').collect();
        if tokens.iter().any(|t| t.is_empty()) {
            // Double spaces, or a leading/trailing one.
            return Err(malformed(number, line));
        }

        let command = match (tokens[0], tokens.len()) {
            ("check-requirements", 2) => Command::CheckRequirements {
                file_ref: format!("{prefix}{}", tokens[1]),
            },
            ("check-var", 3) => Command::CheckVar {
                name: tokens[1].to_string(),
                expected: tokens[2].to_string(),
            },
            ("erase", 2) => Command::Erase {
                partition: tokens[1].to_string(),
            },
            ("flash", 3) => Command::Flash {
                partition: tokens[1].to_string(),
                file_ref: format!("{prefix}{}", tokens[2]),
                slot: PartitionSlot::Current,
            },
            ("flash", 4) if tokens[3] == OTHER_SLOT_TOKEN => Command::Flash {
                partition: tokens[1].to_string(),
                file_ref: format!("{prefix}{}", tokens[2]),
                slot: PartitionSlot::Other,
            },
            ("maybe-cancel-snapshot-update", 1) => Command::MaybeCancelSnapshotUpdate,
            ("reboot-bootloader", 1) => Command::RebootBootloader,
            ("toggle-active-slot", 1) => Command::ToggleActiveSlot,
            (
                "check-requirements" | "check-var" | "erase" | "flash"
                | "maybe-cancel-snapshot-update" | "reboot-bootloader" | "toggle-active-slot",
                _,
            ) => return Err(malformed(number, line)),
            (keyword, _) => {
                return Err(ScriptError::UnknownCommand {
                    line: number,
                    keyword: keyword.to_string(),
                });
            }
        };
        commands.push(command);
    }
    debug!(commands = commands.len(), "Parsed flash script");
    Ok(commands)
}

fn malformed(line: usize, text: &str) -> ScriptError {
    ScriptError::MalformedLine {
        line,
        text: text.to_string(),
    }
}
